//! Shared test backend
//!
//! In-memory `Backend` with call counters, scripted status responses,
//! injected failures and per-call delays driven by the tokio clock.

#![allow(dead_code)]

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use cluster_repair_live::backend::Backend;
use cluster_repair_live::error::{DashboardError, DashboardResult};
use cluster_repair_live::models::{
    ClusterName, ClusterSelection, ClusterStatusSnapshot, DiagnosticEvent, EndpointState,
    NewSubscription, OrderedMap, PerClusterEndpointState, Subscription, SubscriptionCriteria,
    SubscriptionId,
};

#[derive(Default)]
struct State {
    calls: HashMap<&'static str, usize>,
    status_script: VecDeque<(Duration, DashboardResult<ClusterStatusSnapshot>)>,
    statuses: HashMap<ClusterName, ClusterStatusSnapshot>,
    logout_error: Option<DashboardError>,
    subscriptions: Vec<Subscription>,
    next_id: u64,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, DashboardError>,
    event_feeds: HashMap<SubscriptionId, broadcast::Sender<DiagnosticEvent>>,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().unwrap().calls.get(operation).copied().unwrap_or(0)
    }

    /// Queue one status response, consumed in call order before the per-cluster defaults
    pub fn script_status(&self, delay: Duration, result: DashboardResult<ClusterStatusSnapshot>) {
        self.state.lock().unwrap().status_script.push_back((delay, result));
    }

    pub fn set_status(&self, cluster: &str, snapshot: ClusterStatusSnapshot) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(ClusterName::from(cluster), snapshot);
    }

    pub fn fail_logout(&self, error: DashboardError) {
        self.state.lock().unwrap().logout_error = Some(error);
    }

    /// Delay every call of `operation`, or every call keyed `operation:key`
    pub fn set_delay(&self, key: &str, delay: Duration) {
        self.state.lock().unwrap().delays.insert(key.to_string(), delay);
    }

    /// Fail every call of `operation`, or every call keyed `operation:key`
    pub fn fail(&self, key: &str, error: DashboardError) {
        self.state.lock().unwrap().failures.insert(key.to_string(), error);
    }

    pub fn seed_subscription(&self, id: &str, cluster: &str) {
        self.state.lock().unwrap().subscriptions.push(Subscription {
            id: SubscriptionId::from(id),
            cluster: ClusterName::from(cluster),
            criteria: SubscriptionCriteria::default(),
        });
    }

    /// Sender feeding the event stream of `id`
    pub fn event_feed(&self, id: &str) -> broadcast::Sender<DiagnosticEvent> {
        let mut state = self.state.lock().unwrap();
        state
            .event_feeds
            .entry(SubscriptionId::from(id))
            .or_insert_with(|| broadcast::channel(16).0)
            .clone()
    }

    fn record(&self, operation: &'static str, key: Option<&str>) -> Duration {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(operation).or_insert(0) += 1;
        let keyed = key.and_then(|k| state.delays.get(&format!("{}:{}", operation, k)).copied());
        keyed
            .or_else(|| state.delays.get(operation).copied())
            .unwrap_or_default()
    }

    fn failure(&self, operation: &str, key: &str) -> Option<DashboardError> {
        let state = self.state.lock().unwrap();
        state
            .failures
            .get(&format!("{}:{}", operation, key))
            .or_else(|| state.failures.get(operation))
            .cloned()
    }
}

async fn after<T>(delay: Duration, value: T) -> T {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    value
}

impl Backend for FakeBackend {
    fn ping(&self) -> BoxFuture<'static, DashboardResult<()>> {
        let delay = self.record("ping", None);
        after(delay, Ok(())).boxed()
    }

    fn cluster_names(&self) -> BoxFuture<'static, DashboardResult<Vec<ClusterName>>> {
        self.record("cluster_names", None);
        let mut names: Vec<ClusterName> = self.state.lock().unwrap().statuses.keys().cloned().collect();
        names.sort();
        async move { Ok(names) }.boxed()
    }

    fn cluster_status(
        &self,
        cluster: &ClusterName,
    ) -> BoxFuture<'static, DashboardResult<ClusterStatusSnapshot>> {
        let default_delay = self.record("cluster_status", Some(cluster.as_str()));
        let mut state = self.state.lock().unwrap();
        let (delay, result) = match state.status_script.pop_front() {
            Some(scripted) => scripted,
            None => (
                default_delay,
                Ok(state.statuses.get(cluster).cloned().unwrap_or_default()),
            ),
        };
        after(delay, result).boxed()
    }

    fn logout(&self) -> BoxFuture<'static, DashboardResult<()>> {
        let delay = self.record("logout", None);
        let result = match self.state.lock().unwrap().logout_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        };
        after(delay, result).boxed()
    }

    fn list_subscriptions(
        &self,
        selection: &ClusterSelection,
    ) -> BoxFuture<'static, DashboardResult<Vec<Subscription>>> {
        let delay = self.record("list_subscriptions", selection.cluster().map(|c| c.as_str()));
        let state = self.state.clone();
        let selection = selection.clone();
        async move {
            tokio::time::sleep(delay).await;
            let subscriptions = state
                .lock()
                .unwrap()
                .subscriptions
                .iter()
                .filter(|s| selection.cluster().map_or(true, |c| &s.cluster == c))
                .cloned()
                .collect();
            Ok(subscriptions)
        }
        .boxed()
    }

    fn add_subscription(
        &self,
        request: &NewSubscription,
    ) -> BoxFuture<'static, DashboardResult<Subscription>> {
        let delay = self.record("add_subscription", Some(request.cluster.as_str()));
        let failure = self.failure("add_subscription", request.cluster.as_str());
        let state = self.state.clone();
        let request = request.clone();
        async move {
            tokio::time::sleep(delay).await;
            if let Some(e) = failure {
                return Err(e);
            }
            let mut state = state.lock().unwrap();
            state.next_id += 1;
            let subscription = Subscription {
                id: SubscriptionId::new(format!("sub-{}", state.next_id)),
                cluster: request.cluster,
                criteria: request.criteria,
            };
            state.subscriptions.push(subscription.clone());
            Ok(subscription)
        }
        .boxed()
    }

    fn delete_subscription(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>> {
        let delay = self.record("delete_subscription", Some(id.as_str()));
        let failure = self.failure("delete_subscription", id.as_str());
        let state = self.state.clone();
        let id = id.clone();
        async move {
            tokio::time::sleep(delay).await;
            if let Some(e) = failure {
                return Err(e);
            }
            state.lock().unwrap().subscriptions.retain(|s| s.id != id);
            Ok(())
        }
        .boxed()
    }

    fn listen(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>> {
        let delay = self.record("listen", Some(id.as_str()));
        let result = self.failure("listen", id.as_str()).map_or(Ok(()), Err);
        after(delay, result).boxed()
    }

    fn unlisten(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>> {
        let delay = self.record("unlisten", Some(id.as_str()));
        let result = self.failure("unlisten", id.as_str()).map_or(Ok(()), Err);
        after(delay, result).boxed()
    }

    fn event_stream(
        &self,
        id: &SubscriptionId,
    ) -> BoxStream<'static, DashboardResult<DiagnosticEvent>> {
        self.record("event_stream", Some(id.as_str()));
        let rx = self.event_feed(id.as_str()).subscribe();
        stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((Ok(event), rx)),
                Err(_) => None,
            }
        })
        .boxed()
    }
}

/// Snapshot with one entry tagged `cluster`, datacenters mapped to their endpoints
pub fn snapshot(cluster: &str, dcs: Vec<(&str, Vec<&str>)>) -> ClusterStatusSnapshot {
    let endpoints = dcs
        .into_iter()
        .map(|(dc, eps)| {
            let racks: OrderedMap<Vec<EndpointState>> = std::iter::once((
                "rack1",
                eps.into_iter().map(EndpointState::new).collect::<Vec<_>>(),
            ))
            .collect();
            (dc, racks)
        })
        .collect();
    ClusterStatusSnapshot::new(vec![PerClusterEndpointState {
        cluster_name: Some(ClusterName::from(cluster)),
        source_node: None,
        endpoints,
    }])
}

pub fn event(cluster: &str, event_type: &str) -> DiagnosticEvent {
    DiagnosticEvent {
        id: None,
        cluster: ClusterName::from(cluster),
        subscription_id: None,
        node: Some("10.0.0.1".to_string()),
        event_class: "org.apache.cassandra.diag.GossiperEvent".to_string(),
        event_type: Some(event_type.to_string()),
        timestamp: chrono::Utc::now(),
        event: None,
    }
}
