//! Composition root
//!
//! Owns the single instance of every channel and hands out non-owning
//! handles. Dropping the dashboard ends every session-gated task.

use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::Config;
use crate::error::DashboardResult;
use crate::events::{DiagnosticEventFeed, DiagnosticEvents};
use crate::models::{ClusterName, ClusterSelection};
use crate::poller::ClusterStatusPoller;
use crate::session::Session;
use crate::subscriptions::SubscriptionChannels;
use crate::topology::{self, TopologyGroup};

pub struct Dashboard {
    config: Config,
    cluster_names: Arc<[ClusterName]>,
    selection: watch::Sender<ClusterSelection>,
    session: Session,
    poller: ClusterStatusPoller,
    subscriptions: SubscriptionChannels,
    events: DiagnosticEventFeed,
}

impl Dashboard {
    /// Load the cluster names and wire every channel
    pub async fn bootstrap(config: Config, backend: Arc<dyn Backend>) -> DashboardResult<Self> {
        let cluster_names = backend.cluster_names().await?;
        info!(count = cluster_names.len(), "Cluster names loaded");
        Ok(Self::new(config, backend, cluster_names))
    }

    pub fn new(config: Config, backend: Arc<dyn Backend>, cluster_names: Vec<ClusterName>) -> Self {
        let initial = config.initial_selection();
        if let Some(name) = initial.cluster() {
            if !cluster_names.contains(name) {
                warn!(cluster = %name, "Selected cluster is not among the known clusters");
            }
        }

        let (selection, _) = watch::channel(initial);
        let capacity = config.channel_capacity;

        let session = Session::new(backend.clone(), capacity);
        let poller = ClusterStatusPoller::new(
            backend.clone(),
            config.poll_interval(),
            capacity,
            selection.subscribe(),
            session.gate(),
        );
        let subscriptions =
            SubscriptionChannels::new(backend.clone(), capacity, selection.subscribe(), session.gate());
        let events = DiagnosticEventFeed::new(backend, capacity, subscriptions.listening(), session.gate());

        Self {
            config,
            cluster_names: cluster_names.into(),
            selection,
            session,
            poller,
            subscriptions,
            events,
        }
    }

    /// Begin polling and load the subscriptions of the initial selection
    pub fn start(&self) {
        info!(selection = %self.selection(), "Starting dashboard");
        self.poller.start();
        self.subscriptions.refresh();
    }

    /// Stop polling and release every channel
    pub fn shutdown(self) {
        self.poller.stop();
        info!("Dashboard shut down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cluster_names(&self) -> &[ClusterName] {
        &self.cluster_names
    }

    pub fn selection(&self) -> ClusterSelection {
        self.selection.borrow().clone()
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<ClusterSelection> {
        self.selection.subscribe()
    }

    pub fn select_cluster(&self, selection: ClusterSelection) {
        let changed = self.selection.send_if_modified(|current| {
            if *current == selection {
                return false;
            }
            *current = selection.clone();
            true
        });
        if changed {
            info!(selection = %selection, "Cluster selected");
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn poller(&self) -> &ClusterStatusPoller {
        &self.poller
    }

    /// Datacenter groups of the selected cluster, updated on every new snapshot
    pub fn topology(&self) -> impl Stream<Item = Vec<TopologyGroup>> {
        topology::topology_stream(self.poller.subscribe())
    }

    pub fn subscriptions(&self) -> &SubscriptionChannels {
        &self.subscriptions
    }

    pub fn diagnostic_events(&self) -> DiagnosticEvents {
        self.events.subscribe()
    }
}
