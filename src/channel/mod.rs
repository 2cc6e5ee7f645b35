//! Action/result channel pairs
//!
//! An [`ActionChannel`] accepts intents from callers. Its paired
//! [`ResultChannel`] runs one backend operation per intent and multicasts the
//! [`Outcome`] to every attached [`ResultObserver`]:
//! - intents dequeued while no observer is attached are dropped without a call
//! - a new intent never cancels one already in flight
//! - outcomes arrive in completion order, tagged with the intent sequence
//! - once the session gate closes, no further calls start and pending
//!   outcomes are discarded

mod action;
mod result;

pub use action::ActionChannel;
pub use result::{ResultChannel, ResultObserver};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{DashboardError, DashboardResult};
use crate::session::SessionGate;

/// Monotonic intent counter, shareable between channels that must be ordered
/// against each other
#[derive(Debug, Clone, Default)]
pub struct IntentSequence(Arc<AtomicU64>);

impl IntentSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number, starting at 1
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Intent travelling from an action channel to its result channel
#[derive(Debug)]
pub(crate) struct Envelope<I> {
    pub seq: u64,
    pub intent: I,
}

/// Result of one intent
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<I, T> {
    pub seq: u64,
    pub intent: I,
    pub result: Result<T, DashboardError>,
}

impl<I, T> Outcome<I, T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&DashboardError> {
        self.result.as_ref().err()
    }
}

/// Build a channel pair with its own intent sequence
pub fn pair<I, T, F, Fut>(
    name: &'static str,
    capacity: usize,
    gate: SessionGate,
    op: F,
) -> (ActionChannel<I>, ResultChannel<I, T>)
where
    I: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DashboardResult<T>> + Send + 'static,
{
    pair_with_sequence(name, capacity, IntentSequence::new(), gate, op)
}

/// Build a channel pair drawing sequence numbers from a shared counter
pub fn pair_with_sequence<I, T, F, Fut>(
    name: &'static str,
    capacity: usize,
    sequence: IntentSequence,
    gate: SessionGate,
    op: F,
) -> (ActionChannel<I>, ResultChannel<I, T>)
where
    I: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DashboardResult<T>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let action = ActionChannel::new(name, tx, sequence);
    let result = ResultChannel::spawn(name, capacity, rx, gate, op);
    (action, result)
}
