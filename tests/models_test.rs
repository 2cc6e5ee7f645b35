//! Tests for data models
//!
//! These tests verify the cluster status wire shape and the topology derived
//! from it.

use futures::StreamExt;
use serde_json::json;
use tokio::sync::watch;

use cluster_repair_live::models::{
    ClusterName, ClusterSelection, ClusterStatus, ClusterStatusSnapshot, OrderedMap,
};
use cluster_repair_live::poller::PolledSnapshot;
use cluster_repair_live::topology::{aggregate, topology_stream, EndpointItem, TopologyGroup};

fn two_datacenters() -> ClusterStatusSnapshot {
    let status: ClusterStatus = serde_json::from_value(json!({
        "name": "prod",
        "nodes_status": {
            "endpointStates": [{
                "endpoints": {
                    "dc1": {"rackA": [{"endpoint": "e1"}, {"endpoint": "e2"}]},
                    "dc2": {"rackB": [{"endpoint": "e3"}]}
                }
            }]
        }
    }))
    .unwrap();
    ClusterStatusSnapshot::from(status)
}

fn group(label: &str, endpoints: &[&str]) -> TopologyGroup {
    TopologyGroup {
        label: label.to_string(),
        children: endpoints.iter().map(|e| EndpointItem::new(e)).collect(),
    }
}

#[test]
fn test_aggregate_two_datacenters() {
    let groups = aggregate(&two_datacenters(), &ClusterSelection::Cluster("prod".into()));
    assert_eq!(groups, vec![group("dc1", &["e1", "e2"]), group("dc2", &["e3"])]);

    // Same input, same output
    let again = aggregate(&two_datacenters(), &ClusterSelection::Cluster("prod".into()));
    assert_eq!(groups, again);
}

#[test]
fn test_aggregate_without_topology_is_empty() {
    let selection = ClusterSelection::Cluster("prod".into());
    assert!(aggregate(&ClusterStatusSnapshot::absent(), &selection).is_empty());
    assert!(aggregate(&ClusterStatusSnapshot::new(Vec::new()), &selection).is_empty());
}

#[test]
fn test_endpoint_item_serialization() {
    let value = serde_json::to_value(group("dc1", &["10.0.0.1"])).unwrap();
    assert_eq!(
        value,
        json!({"label": "dc1", "children": [{"value": "10.0.0.1", "label": "10.0.0.1"}]})
    );
}

#[test]
fn test_ordered_map_round_trips_key_order() {
    let map: OrderedMap<u32> = serde_json::from_str(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"z":1,"a":2,"m":3}"#);
}

#[test]
fn test_cluster_name_is_plain_string_on_the_wire() {
    let names: Vec<ClusterName> = serde_json::from_value(json!(["prod", "staging"])).unwrap();
    assert_eq!(names[1].as_str(), "staging");
    assert_eq!(serde_json::to_value(&names[0]).unwrap(), json!("prod"));
}

#[tokio::test]
async fn test_topology_stream_follows_snapshots() {
    let selection = ClusterSelection::Cluster("prod".into());
    let (tx, rx) = watch::channel(PolledSnapshot {
        seq: 0,
        selection: selection.clone(),
        snapshot: ClusterStatusSnapshot::absent(),
        backend_reachable: false,
        fetched_at: None,
    });
    let mut stream = Box::pin(topology_stream(rx));

    assert!(stream.next().await.unwrap().is_empty());

    tx.send_replace(PolledSnapshot {
        seq: 1,
        selection,
        snapshot: two_datacenters(),
        backend_reachable: true,
        fetched_at: Some(chrono::Utc::now()),
    });
    let groups = stream.next().await.unwrap();
    assert_eq!(groups.len(), 2);

    drop(tx);
    assert!(stream.next().await.is_none());
}
