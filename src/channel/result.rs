use futures::Stream;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::{Envelope, Outcome};
use crate::error::DashboardResult;
use crate::session::SessionGate;

/// Multicast view of the outcomes produced for an action channel
pub struct ResultChannel<I, T> {
    name: &'static str,
    tx: broadcast::Sender<Outcome<I, T>>,
    latest: watch::Receiver<Option<Outcome<I, T>>>,
    issued: Arc<AtomicU64>,
}

impl<I, T> Clone for ResultChannel<I, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            latest: self.latest.clone(),
            issued: self.issued.clone(),
        }
    }
}

impl<I, T> ResultChannel<I, T>
where
    I: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn spawn<F, Fut>(
        name: &'static str,
        capacity: usize,
        rx: mpsc::UnboundedReceiver<Envelope<I>>,
        gate: SessionGate,
        op: F,
    ) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DashboardResult<T>> + Send + 'static,
    {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (latest_tx, latest) = watch::channel(None);
        let issued = Arc::new(AtomicU64::new(0));

        tokio::spawn(drive(
            name,
            rx,
            tx.clone(),
            Arc::new(latest_tx),
            gate,
            op,
            issued.clone(),
        ));

        Self {
            name,
            tx,
            latest,
            issued,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Attach an observer. Dropping it detaches.
    pub fn subscribe(&self) -> ResultObserver<I, T> {
        ResultObserver {
            name: self.name,
            rx: self.tx.subscribe(),
        }
    }

    /// Most recently published outcome, without touching the backend
    pub fn latest(&self) -> Option<Outcome<I, T>> {
        self.latest.borrow().clone()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Number of backend operations started so far
    pub fn issued_calls(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

async fn drive<I, T, F, Fut>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<Envelope<I>>,
    tx: broadcast::Sender<Outcome<I, T>>,
    latest: Arc<watch::Sender<Option<Outcome<I, T>>>>,
    mut gate: SessionGate,
    op: F,
    issued: Arc<AtomicU64>,
) where
    I: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DashboardResult<T>> + Send + 'static,
{
    loop {
        let envelope = tokio::select! {
            biased;
            _ = gate.ended() => {
                info!(channel = name, "Session ended, channel closed");
                break;
            }
            envelope = rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let Envelope { seq, intent } = envelope;

        if tx.receiver_count() == 0 {
            debug!(channel = name, seq, "No observers attached, intent skipped");
            continue;
        }

        issued.fetch_add(1, Ordering::Relaxed);
        debug!(channel = name, seq, "Dispatching intent");

        let call = op(intent.clone());
        let tx = tx.clone();
        let latest = latest.clone();
        let gate = gate.clone();

        tokio::spawn(async move {
            let result = call.await;

            if !gate.is_active() {
                debug!(channel = name, seq, "Session ended while in flight, outcome discarded");
                return;
            }

            if let Err(e) = &result {
                warn!(channel = name, seq, error = %e, "Intent failed");
            }

            let outcome = Outcome {
                seq,
                intent,
                result,
            };
            latest.send_replace(Some(outcome.clone()));
            // Observers may all have detached while the call was in flight
            let _ = tx.send(outcome);
        });
    }

    debug!(channel = name, "Channel driver stopped");
}

/// Handle held by one consumer of a result channel
pub struct ResultObserver<I, T> {
    name: &'static str,
    rx: broadcast::Receiver<Outcome<I, T>>,
}

impl<I: Clone, T: Clone> ResultObserver<I, T> {
    /// Next outcome, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<Outcome<I, T>> {
        loop {
            match self.rx.recv().await {
                Ok(outcome) => return Some(outcome),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = self.name, skipped, "Observer lagged, outcomes skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Outcome<I, T>> {
        futures::stream::unfold(self, |mut observer| async move {
            observer.recv().await.map(|outcome| (outcome, observer))
        })
    }
}
