use serde::{Deserialize, Serialize};
use std::fmt;

use super::ordered::OrderedMap;
use crate::error::{DashboardError, DashboardResult};

/// Query parameter carrying the initially selected cluster
pub const CURRENT_CLUSTER_PARAM: &str = "currentCluster";

/// Sentinel accepted in place of a cluster name to mean every cluster
pub const ALL_CLUSTERS: &str = "all";

/// Name of a managed cluster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterName(String);

impl ClusterName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Currently active cluster
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClusterSelection {
    #[default]
    All,
    Cluster(ClusterName),
}

impl ClusterSelection {
    /// Interpret a raw `currentCluster` value; missing, empty and `all` select every cluster
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::All,
            Some(v) if v.eq_ignore_ascii_case(ALL_CLUSTERS) => Self::All,
            Some(v) => Self::Cluster(ClusterName::from(v)),
        }
    }

    /// Read the selection from the `currentCluster` parameter of a page URL
    pub fn from_page_url(url: &str) -> DashboardResult<Self> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| DashboardError::Config(format!("invalid page url {}: {}", url, e)))?;
        let value = url
            .query_pairs()
            .find(|(k, _)| k == CURRENT_CLUSTER_PARAM)
            .map(|(_, v)| v.into_owned());
        Ok(Self::from_param(value.as_deref()))
    }

    pub fn cluster(&self) -> Option<&ClusterName> {
        match self {
            Self::All => None,
            Self::Cluster(name) => Some(name),
        }
    }
}

impl fmt::Display for ClusterSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_CLUSTERS),
            Self::Cluster(name) => write!(f, "{}", name),
        }
    }
}

/// Gossip state of one endpoint as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointState {
    pub endpoint: String,
    #[serde(default)]
    pub host_id: Option<String>,
    #[serde(default)]
    pub dc: Option<String>,
    #[serde(default)]
    pub rack: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub severity: Option<f64>,
    #[serde(default)]
    pub release_version: Option<String>,
    #[serde(default)]
    pub load: Option<f64>,
}

impl EndpointState {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            host_id: None,
            dc: None,
            rack: None,
            status: None,
            severity: None,
            release_version: None,
            load: None,
        }
    }
}

/// Endpoints grouped by rack
pub type RackEndpoints = OrderedMap<Vec<EndpointState>>;

/// One cluster's view of its endpoints, grouped by datacenter then rack
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerClusterEndpointState {
    #[serde(default)]
    pub cluster_name: Option<ClusterName>,
    #[serde(default)]
    pub source_node: Option<String>,
    #[serde(default)]
    pub endpoints: OrderedMap<RackEndpoints>,
}

/// `nodes_status` block of the cluster status payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodesStatus {
    #[serde(rename = "endpointStates", default)]
    pub endpoint_states: Vec<PerClusterEndpointState>,
}

/// Cluster status payload returned by `GET /cluster/{name}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub name: ClusterName,
    #[serde(default)]
    pub seed_hosts: Vec<String>,
    #[serde(default)]
    pub nodes_status: Option<NodesStatus>,
}

/// Point-in-time topology of a cluster
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterStatusSnapshot {
    pub node_status_present: bool,
    pub endpoint_states: Vec<PerClusterEndpointState>,
}

impl ClusterStatusSnapshot {
    /// Snapshot carrying no topology
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn new(endpoint_states: Vec<PerClusterEndpointState>) -> Self {
        Self {
            node_status_present: true,
            endpoint_states,
        }
    }

    pub fn has_topology(&self) -> bool {
        self.node_status_present && !self.endpoint_states.is_empty()
    }
}

impl From<ClusterStatus> for ClusterStatusSnapshot {
    fn from(status: ClusterStatus) -> Self {
        match status.nodes_status {
            Some(nodes) => {
                let endpoint_states = nodes
                    .endpoint_states
                    .into_iter()
                    .map(|mut state| {
                        if state.cluster_name.is_none() {
                            state.cluster_name = Some(status.name.clone());
                        }
                        state
                    })
                    .collect();
                Self::new(endpoint_states)
            }
            None => Self::absent(),
        }
    }
}
