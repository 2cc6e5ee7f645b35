use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cluster::ClusterName;
use super::subscription::SubscriptionId;

/// Diagnostic event pushed by the backend for a listened subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub cluster: ClusterName,
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
    #[serde(default)]
    pub node: Option<String>,
    pub event_class: String,
    #[serde(default)]
    pub event_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub event: Option<serde_json::Value>,
}
