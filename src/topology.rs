//! Topology aggregation
//!
//! Turns the endpoint states of a status snapshot into datacenter groups of
//! selectable endpoints. Racks are a backend grouping and are flattened away.

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::{ClusterSelection, ClusterStatusSnapshot, PerClusterEndpointState};
use crate::poller::PolledSnapshot;

/// Selectable endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointItem {
    pub value: String,
    pub label: String,
}

impl EndpointItem {
    pub fn new(endpoint: &str) -> Self {
        Self {
            value: endpoint.to_string(),
            label: endpoint.to_string(),
        }
    }
}

/// Endpoints of one datacenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyGroup {
    pub label: String,
    pub children: Vec<EndpointItem>,
}

/// Group the selected cluster's endpoints by datacenter, in received order.
///
/// A snapshot without node status, without endpoint states, or without an
/// entry for the selected cluster yields no groups.
pub fn aggregate(snapshot: &ClusterStatusSnapshot, selection: &ClusterSelection) -> Vec<TopologyGroup> {
    if !snapshot.has_topology() {
        return Vec::new();
    }

    let Some(entry) = select_entry(&snapshot.endpoint_states, selection) else {
        return Vec::new();
    };

    entry
        .endpoints
        .iter()
        .map(|(dc, racks)| TopologyGroup {
            label: dc.to_string(),
            children: racks
                .values()
                .flatten()
                .map(|state| EndpointItem::new(&state.endpoint))
                .collect(),
        })
        .collect()
}

fn select_entry<'a>(
    states: &'a [PerClusterEndpointState],
    selection: &ClusterSelection,
) -> Option<&'a PerClusterEndpointState> {
    match selection {
        ClusterSelection::All => states.first(),
        ClusterSelection::Cluster(name) => states
            .iter()
            .find(|state| state.cluster_name.as_ref() == Some(name))
            .or_else(|| states.first().filter(|state| state.cluster_name.is_none())),
    }
}

/// Endpoints currently known for the polled cluster, recomputed on every new snapshot
pub fn topology_stream(
    snapshots: watch::Receiver<PolledSnapshot>,
) -> impl Stream<Item = Vec<TopologyGroup>> {
    futures::stream::unfold((snapshots, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let groups = {
            let polled = rx.borrow_and_update();
            aggregate(&polled.snapshot, &polled.selection)
        };
        Some((groups, (rx, false)))
    })
}
