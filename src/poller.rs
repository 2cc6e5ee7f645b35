//! Cluster status poller
//!
//! Pushes a status request on a fixed interval (first one immediately) and
//! reconciles the completions into a single latest snapshot. Fetches may
//! overlap; a completion only replaces the displayed snapshot when its
//! request sequence is newer than the one shown.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::channel::{self, ActionChannel, Outcome, ResultChannel, ResultObserver};
use crate::error::DashboardResult;
use crate::models::{ClusterSelection, ClusterStatusSnapshot};
use crate::session::SessionGate;
use crate::topology::{self, TopologyGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PollerState {
    Idle,
    Polling,
    Stopped,
}

/// One status fetch, scoped to the selection active when it was issued
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRequest {
    pub selection: ClusterSelection,
}

/// Snapshot currently shown for the selected cluster
#[derive(Debug, Clone, PartialEq)]
pub struct PolledSnapshot {
    /// Sequence of the request that produced this snapshot, 0 before any
    pub seq: u64,
    pub selection: ClusterSelection,
    pub snapshot: ClusterStatusSnapshot,
    /// Whether the fetch that produced this snapshot reached the backend
    pub backend_reachable: bool,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl PolledSnapshot {
    fn empty(seq: u64, selection: ClusterSelection) -> Self {
        Self {
            seq,
            selection,
            snapshot: ClusterStatusSnapshot::absent(),
            backend_reachable: false,
            fetched_at: None,
        }
    }

    pub fn topology(&self) -> Vec<TopologyGroup> {
        topology::aggregate(&self.snapshot, &self.selection)
    }
}

pub type StatusResult = ResultChannel<StatusRequest, ClusterStatusSnapshot>;

pub struct ClusterStatusPoller {
    interval: Duration,
    action: ActionChannel<StatusRequest>,
    result: StatusResult,
    selection: watch::Receiver<ClusterSelection>,
    latest: Arc<watch::Sender<PolledSnapshot>>,
    state: Arc<watch::Sender<PollerState>>,
    gate: SessionGate,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterStatusPoller {
    pub fn new(
        backend: Arc<dyn Backend>,
        interval: Duration,
        capacity: usize,
        selection: watch::Receiver<ClusterSelection>,
        gate: SessionGate,
    ) -> Self {
        let (action, result) = channel::pair("cluster_status", capacity, gate.clone(), move |request| {
            fetch_status(backend.as_ref(), request)
        });

        let initial = PolledSnapshot::empty(0, selection.borrow().clone());
        let (latest, _) = watch::channel(initial);
        let (state, _) = watch::channel(PollerState::Idle);

        Self {
            interval,
            action,
            result,
            selection,
            latest: Arc::new(latest),
            state: Arc::new(state),
            gate,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    /// Enter the polling state. Calling it again has no effect.
    pub fn start(&self) {
        if self.state() != PollerState::Idle {
            return;
        }
        if !self.gate.is_active() {
            self.state.send_replace(PollerState::Stopped);
            return;
        }
        self.state.send_replace(PollerState::Polling);
        info!(interval_ms = self.interval.as_millis() as u64, "Starting cluster status poller");

        // Attach before the first tick so tick 0 is not skipped for lack of observers
        let observer = self.result.subscribe();

        let reconciler = tokio::spawn(reconcile(
            observer,
            self.latest.clone(),
            self.selection.clone(),
            self.gate.clone(),
        ));
        let ticker = tokio::spawn(tick(
            self.interval,
            self.action.clone(),
            self.selection.clone(),
            self.state.clone(),
            self.gate.clone(),
        ));

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(reconciler);
            tasks.push(ticker);
        }
    }

    /// Stop ticking and drop anything still in flight
    pub fn stop(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        if self.state() != PollerState::Stopped {
            info!("Cluster status poller stopped");
            self.state.send_replace(PollerState::Stopped);
        }
    }

    /// Request an out-of-band fetch for the current selection
    pub fn refresh(&self) {
        self.action.push(StatusRequest {
            selection: self.selection.borrow().clone(),
        });
    }

    pub fn action(&self) -> &ActionChannel<StatusRequest> {
        &self.action
    }

    /// Raw per-fetch outcomes, including failures
    pub fn result(&self) -> &StatusResult {
        &self.result
    }

    pub fn latest(&self) -> PolledSnapshot {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PolledSnapshot> {
        self.latest.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }
}

impl Drop for ClusterStatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn fetch_status(
    backend: &dyn Backend,
    request: StatusRequest,
) -> BoxFuture<'static, DashboardResult<ClusterStatusSnapshot>> {
    match &request.selection {
        ClusterSelection::Cluster(name) => backend.cluster_status(name),
        ClusterSelection::All => backend
            .ping()
            .map(|pinged| pinged.map(|()| ClusterStatusSnapshot::absent()))
            .boxed(),
    }
}

async fn tick(
    interval: Duration,
    action: ActionChannel<StatusRequest>,
    mut selection: watch::Receiver<ClusterSelection>,
    state: Arc<watch::Sender<PollerState>>,
    mut gate: SessionGate,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = gate.ended() => {
                info!("Session ended, cluster status poller stopped");
                break;
            }
            changed = selection.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = selection.borrow_and_update().clone();
                debug!(selection = %current, "Selection changed, fetching immediately");
                action.push(StatusRequest { selection: current });
            }
            _ = ticker.tick() => {
                let current = selection.borrow().clone();
                debug!(selection = %current, "Polling cluster status");
                action.push(StatusRequest { selection: current });
            }
        }
    }

    state.send_replace(PollerState::Stopped);
}

async fn reconcile(
    mut observer: ResultObserver<StatusRequest, ClusterStatusSnapshot>,
    latest: Arc<watch::Sender<PolledSnapshot>>,
    mut selection: watch::Receiver<ClusterSelection>,
    mut gate: SessionGate,
) {
    loop {
        tokio::select! {
            biased;
            _ = gate.ended() => {
                let seq = latest.borrow().seq;
                let current = selection.borrow().clone();
                latest.send_replace(PolledSnapshot::empty(seq, current));
                debug!("Session ended, displayed topology cleared");
                break;
            }
            changed = selection.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = selection.borrow_and_update().clone();
                let seq = latest.borrow().seq;
                latest.send_replace(PolledSnapshot::empty(seq, current));
            }
            outcome = observer.recv() => match outcome {
                Some(outcome) => apply(&latest, &selection, outcome),
                None => break,
            },
        }
    }
}

fn apply(
    latest: &watch::Sender<PolledSnapshot>,
    selection: &watch::Receiver<ClusterSelection>,
    outcome: Outcome<StatusRequest, ClusterStatusSnapshot>,
) {
    let current = selection.borrow().clone();
    if outcome.intent.selection != current {
        debug!(seq = outcome.seq, "Status for a previous selection discarded");
        return;
    }

    let shown = latest.borrow().seq;
    if outcome.seq <= shown {
        debug!(seq = outcome.seq, shown, "Stale status discarded");
        return;
    }

    let (snapshot, backend_reachable) = match outcome.result {
        Ok(snapshot) => {
            if !snapshot.has_topology() && current.cluster().is_some() {
                debug!(selection = %current, "No topology reported");
            }
            (snapshot, true)
        }
        Err(e) => {
            warn!(selection = %current, error = %e, "Status poll failed, no topology for this tick");
            (ClusterStatusSnapshot::absent(), false)
        }
    };

    latest.send_replace(PolledSnapshot {
        seq: outcome.seq,
        selection: current,
        snapshot,
        backend_reachable,
        fetched_at: Some(Utc::now()),
    });
}
