use serde::{Deserialize, Serialize};
use std::fmt;

use super::cluster::ClusterName;

/// Backend-assigned subscription identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What a subscription listens for and where matching events are exported
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubscriptionCriteria {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub export_sse: bool,
    #[serde(default)]
    pub export_file_logger: Option<String>,
    #[serde(default)]
    pub export_http_endpoint: Option<String>,
}

/// Standing registration of interest in diagnostic events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub cluster: ClusterName,
    #[serde(flatten)]
    pub criteria: SubscriptionCriteria,
}

/// Request body for creating a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub cluster: ClusterName,
    #[serde(flatten)]
    pub criteria: SubscriptionCriteria,
}

impl NewSubscription {
    pub fn new(cluster: impl Into<ClusterName>, criteria: SubscriptionCriteria) -> Self {
        Self {
            cluster: cluster.into(),
            criteria,
        }
    }
}
