use tokio::sync::mpsc;
use tracing::debug;

use super::{Envelope, IntentSequence};

/// Entry point for intents of one kind
#[derive(Debug)]
pub struct ActionChannel<I> {
    name: &'static str,
    tx: mpsc::UnboundedSender<Envelope<I>>,
    sequence: IntentSequence,
}

impl<I> Clone for ActionChannel<I> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            sequence: self.sequence.clone(),
        }
    }
}

impl<I> ActionChannel<I> {
    pub(crate) fn new(
        name: &'static str,
        tx: mpsc::UnboundedSender<Envelope<I>>,
        sequence: IntentSequence,
    ) -> Self {
        Self { name, tx, sequence }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Submit an intent. Never fails; outcomes surface on the result channel.
    pub fn push(&self, intent: I) {
        let seq = self.sequence.next();
        if self.tx.send(Envelope { seq, intent }).is_err() {
            debug!(channel = self.name, seq, "Result channel gone, intent dropped");
        }
    }

    /// Whether the paired result channel still accepts intents
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
