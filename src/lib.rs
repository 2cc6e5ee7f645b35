//! Cluster Repair Live Library
//!
//! Reactive client core of the cluster-repair dashboard: backend access,
//! action/result channels, the cluster status poller, topology aggregation,
//! the session boundary and the subscription lifecycle.

pub mod backend;
pub mod channel;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod models;
pub mod poller;
pub mod session;
pub mod subscriptions;
pub mod topology;

pub use dashboard::Dashboard;
pub use error::{DashboardError, DashboardResult};
