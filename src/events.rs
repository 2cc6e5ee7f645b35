//! Diagnostic event feed
//!
//! Keeps one backend event stream open per listened subscription and
//! multicasts the events. Streams close on Unlisten, Delete and logout.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::DashboardResult;
use crate::models::{DiagnosticEvent, SubscriptionId};
use crate::session::SessionGate;

pub struct DiagnosticEventFeed {
    tx: broadcast::Sender<DiagnosticEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DiagnosticEventFeed {
    pub fn new(
        backend: Arc<dyn Backend>,
        capacity: usize,
        listening: watch::Receiver<BTreeSet<SubscriptionId>>,
        gate: SessionGate,
    ) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let task = tokio::spawn(run(backend, listening, tx.clone(), gate));
        Self {
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn subscribe(&self) -> DiagnosticEvents {
        DiagnosticEvents {
            rx: self.tx.subscribe(),
        }
    }
}

impl Drop for DiagnosticEventFeed {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Consumer handle for diagnostic events
pub struct DiagnosticEvents {
    rx: broadcast::Receiver<DiagnosticEvent>,
}

impl DiagnosticEvents {
    pub async fn recv(&mut self) -> Option<DiagnosticEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Diagnostic event consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Open streams keyed by subscription
struct Streams {
    open: HashMap<SubscriptionId, JoinHandle<()>>,
}

impl Streams {
    fn sync(
        &mut self,
        wanted: &BTreeSet<SubscriptionId>,
        backend: &dyn Backend,
        tx: &broadcast::Sender<DiagnosticEvent>,
    ) {
        self.open.retain(|id, handle| {
            if !wanted.contains(id) {
                info!(id = %id, "Closing diagnostic event stream");
                handle.abort();
                return false;
            }
            !handle.is_finished()
        });

        for id in wanted {
            if !self.open.contains_key(id) {
                info!(id = %id, "Opening diagnostic event stream");
                let stream = backend.event_stream(id);
                let handle = tokio::spawn(forward(stream, id.clone(), tx.clone()));
                self.open.insert(id.clone(), handle);
            }
        }
    }

    fn close_all(&mut self) {
        for (_, handle) in self.open.drain() {
            handle.abort();
        }
    }
}

// Dropping a JoinHandle detaches its task, so forwarders are aborted here
// when the run loop is aborted with the feed.
impl Drop for Streams {
    fn drop(&mut self) {
        self.close_all();
    }
}

async fn run(
    backend: Arc<dyn Backend>,
    mut listening: watch::Receiver<BTreeSet<SubscriptionId>>,
    tx: broadcast::Sender<DiagnosticEvent>,
    mut gate: SessionGate,
) {
    let mut streams = Streams {
        open: HashMap::new(),
    };

    loop {
        let wanted = listening.borrow_and_update().clone();
        streams.sync(&wanted, backend.as_ref(), &tx);

        tokio::select! {
            biased;
            _ = gate.ended() => {
                debug!("Session ended, closing diagnostic event streams");
                break;
            }
            changed = listening.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn forward(
    mut stream: BoxStream<'static, DashboardResult<DiagnosticEvent>>,
    id: SubscriptionId,
    tx: broadcast::Sender<DiagnosticEvent>,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(mut event) => {
                event.subscription_id.get_or_insert_with(|| id.clone());
                // No consumers attached is not an error
                let _ = tx.send(event);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Diagnostic event stream error");
            }
        }
    }
    debug!(id = %id, "Diagnostic event stream ended");
}
