//! Backend surface consumed by the dashboard channels

mod http;

pub use http::HttpBackend;

use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::DashboardResult;
use crate::models::{
    ClusterName, ClusterSelection, ClusterStatusSnapshot, DiagnosticEvent, NewSubscription,
    Subscription, SubscriptionId,
};

/// Operations the repair backend offers to the dashboard.
///
/// Futures and streams are `'static` so channels can run them on their own
/// tasks; implementations clone whatever they need out of `self`.
#[cfg_attr(test, mockall::automock)]
pub trait Backend: Send + Sync + 'static {
    /// Health ping
    fn ping(&self) -> BoxFuture<'static, DashboardResult<()>>;

    /// Names of every managed cluster
    fn cluster_names(&self) -> BoxFuture<'static, DashboardResult<Vec<ClusterName>>>;

    /// Current node/endpoint topology of one cluster
    fn cluster_status(
        &self,
        cluster: &ClusterName,
    ) -> BoxFuture<'static, DashboardResult<ClusterStatusSnapshot>>;

    fn logout(&self) -> BoxFuture<'static, DashboardResult<()>>;

    /// Subscriptions of one cluster, or of every cluster for `All`
    fn list_subscriptions(
        &self,
        selection: &ClusterSelection,
    ) -> BoxFuture<'static, DashboardResult<Vec<Subscription>>>;

    fn add_subscription(
        &self,
        request: &NewSubscription,
    ) -> BoxFuture<'static, DashboardResult<Subscription>>;

    fn delete_subscription(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>>;

    fn listen(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>>;

    fn unlisten(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>>;

    /// Events pushed for a listened subscription; ends when the backend closes it
    fn event_stream(
        &self,
        id: &SubscriptionId,
    ) -> BoxStream<'static, DashboardResult<DiagnosticEvent>>;
}
