//! Subscription lifecycle channels
//!
//! Add, Delete, Listen, Unlisten and List share one intent sequence so
//! outcomes on the same subscription can be ordered against each other. The
//! local read model applies an acknowledged outcome only when its intent is
//! newer than the last one applied for that subscription.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::channel::{self, ActionChannel, IntentSequence, Outcome, ResultChannel, ResultObserver};
use crate::models::{ClusterSelection, NewSubscription, Subscription, SubscriptionId};
use crate::session::SessionGate;

pub type AddResult = ResultChannel<NewSubscription, Subscription>;
pub type DeleteResult = ResultChannel<SubscriptionId, ()>;
pub type ListenResult = ResultChannel<SubscriptionId, ()>;
pub type ListResult = ResultChannel<ClusterSelection, Vec<Subscription>>;

/// Local view of the subscriptions of the selected cluster
#[derive(Debug, Default)]
pub struct SubscriptionReadModel {
    subscriptions: Vec<Subscription>,
    listening: BTreeSet<SubscriptionId>,
    applied: HashMap<SubscriptionId, u64>,
    // seq of the last applied Add/Delete and whether the id exists after it
    membership: HashMap<SubscriptionId, (u64, bool)>,
    list_seq: u64,
}

impl SubscriptionReadModel {
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn listening(&self) -> &BTreeSet<SubscriptionId> {
        &self.listening
    }

    /// Record `seq` for `id` if it is newer than what was applied before
    fn claim(&mut self, id: &SubscriptionId, seq: u64) -> bool {
        let applied = self.applied.entry(id.clone()).or_insert(0);
        if seq <= *applied {
            debug!(id = %id, seq, applied = *applied, "Outdated subscription outcome ignored");
            return false;
        }
        *applied = seq;
        true
    }

    pub fn apply_added(&mut self, seq: u64, subscription: Subscription) -> bool {
        if !self.claim(&subscription.id, seq) {
            return false;
        }
        self.membership.insert(subscription.id.clone(), (seq, true));
        match self.subscriptions.iter_mut().find(|s| s.id == subscription.id) {
            Some(existing) => *existing = subscription,
            None => self.subscriptions.push(subscription),
        }
        true
    }

    pub fn apply_deleted(&mut self, seq: u64, id: &SubscriptionId) -> bool {
        if !self.claim(id, seq) {
            return false;
        }
        self.subscriptions.retain(|s| &s.id != id);
        self.listening.remove(id);
        self.membership.insert(id.clone(), (seq, false));
        true
    }

    pub fn apply_listening(&mut self, seq: u64, id: &SubscriptionId, listening: bool) -> bool {
        if !self.claim(id, seq) {
            return false;
        }
        if listening {
            self.listening.insert(id.clone());
        } else {
            self.listening.remove(id);
        }
        true
    }

    /// Replace the whole list with a fetched one, unless a newer list was applied.
    ///
    /// Adds and deletes acknowledged after the list was requested win over it:
    /// a newer delete keeps the id out, a newer add keeps it in.
    pub fn apply_listed(&mut self, seq: u64, subscriptions: Vec<Subscription>) -> bool {
        if seq <= self.list_seq {
            return false;
        }
        self.list_seq = seq;

        let newer = |id: &SubscriptionId| match self.membership.get(id) {
            Some(&(applied, present)) if applied > seq => Some(present),
            _ => None,
        };
        let mut merged: Vec<Subscription> = subscriptions
            .into_iter()
            .filter(|s| newer(&s.id) != Some(false))
            .collect();
        for local in &self.subscriptions {
            if newer(&local.id) == Some(true) && !merged.iter().any(|s| s.id == local.id) {
                merged.push(local.clone());
            }
        }

        self.listening.retain(|id| merged.iter().any(|s| &s.id == id));
        self.subscriptions = merged;
        true
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.listening.clear();
        self.membership.clear();
    }
}

pub struct SubscriptionChannels {
    add: ActionChannel<NewSubscription>,
    add_result: AddResult,
    delete: ActionChannel<SubscriptionId>,
    delete_result: DeleteResult,
    listen: ActionChannel<SubscriptionId>,
    listen_result: ListenResult,
    unlisten: ActionChannel<SubscriptionId>,
    unlisten_result: ListenResult,
    list: ActionChannel<ClusterSelection>,
    list_result: ListResult,
    selection: watch::Receiver<ClusterSelection>,
    event_subscriptions: Arc<watch::Sender<Vec<Subscription>>>,
    listening: Arc<watch::Sender<BTreeSet<SubscriptionId>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionChannels {
    pub fn new(
        backend: Arc<dyn Backend>,
        capacity: usize,
        selection: watch::Receiver<ClusterSelection>,
        gate: SessionGate,
    ) -> Self {
        let sequence = IntentSequence::new();

        let b = backend.clone();
        let (add, add_result) = channel::pair_with_sequence(
            "add_subscription",
            capacity,
            sequence.clone(),
            gate.clone(),
            move |request: NewSubscription| b.add_subscription(&request),
        );
        let b = backend.clone();
        let (delete, delete_result) = channel::pair_with_sequence(
            "delete_subscription",
            capacity,
            sequence.clone(),
            gate.clone(),
            move |id: SubscriptionId| b.delete_subscription(&id),
        );
        let b = backend.clone();
        let (listen, listen_result) = channel::pair_with_sequence(
            "listen_subscription",
            capacity,
            sequence.clone(),
            gate.clone(),
            move |id: SubscriptionId| b.listen(&id),
        );
        let b = backend.clone();
        let (unlisten, unlisten_result) = channel::pair_with_sequence(
            "unlisten_subscription",
            capacity,
            sequence.clone(),
            gate.clone(),
            move |id: SubscriptionId| b.unlisten(&id),
        );
        let (list, list_result) = channel::pair_with_sequence(
            "list_subscriptions",
            capacity,
            sequence,
            gate.clone(),
            move |selection: ClusterSelection| backend.list_subscriptions(&selection),
        );

        let (event_subscriptions, _) = watch::channel(Vec::new());
        let (listening, _) = watch::channel(BTreeSet::new());

        let channels = Self {
            add,
            add_result,
            delete,
            delete_result,
            listen,
            listen_result,
            unlisten,
            unlisten_result,
            list,
            list_result,
            selection,
            event_subscriptions: Arc::new(event_subscriptions),
            listening: Arc::new(listening),
            task: Mutex::new(None),
        };

        let observers = Observers {
            add: channels.add_result.subscribe(),
            delete: channels.delete_result.subscribe(),
            listen: channels.listen_result.subscribe(),
            unlisten: channels.unlisten_result.subscribe(),
            list: channels.list_result.subscribe(),
        };
        let task = tokio::spawn(reconcile(
            observers,
            channels.list.clone(),
            channels.selection.clone(),
            channels.event_subscriptions.clone(),
            channels.listening.clone(),
            gate,
        ));
        if let Ok(mut slot) = channels.task.lock() {
            *slot = Some(task);
        }

        channels
    }

    pub fn add(&self) -> &ActionChannel<NewSubscription> {
        &self.add
    }

    pub fn add_result(&self) -> &AddResult {
        &self.add_result
    }

    pub fn delete(&self) -> &ActionChannel<SubscriptionId> {
        &self.delete
    }

    pub fn delete_result(&self) -> &DeleteResult {
        &self.delete_result
    }

    pub fn listen(&self) -> &ActionChannel<SubscriptionId> {
        &self.listen
    }

    pub fn listen_result(&self) -> &ListenResult {
        &self.listen_result
    }

    pub fn unlisten(&self) -> &ActionChannel<SubscriptionId> {
        &self.unlisten
    }

    pub fn unlisten_result(&self) -> &ListenResult {
        &self.unlisten_result
    }

    pub fn list(&self) -> &ActionChannel<ClusterSelection> {
        &self.list
    }

    pub fn list_result(&self) -> &ListResult {
        &self.list_result
    }

    /// Re-fetch the subscriptions of the current selection
    pub fn refresh(&self) {
        self.list.push(self.selection.borrow().clone());
    }

    pub fn event_subscriptions(&self) -> watch::Receiver<Vec<Subscription>> {
        self.event_subscriptions.subscribe()
    }

    pub fn listening(&self) -> watch::Receiver<BTreeSet<SubscriptionId>> {
        self.listening.subscribe()
    }
}

impl Drop for SubscriptionChannels {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

struct Observers {
    add: ResultObserver<NewSubscription, Subscription>,
    delete: ResultObserver<SubscriptionId, ()>,
    listen: ResultObserver<SubscriptionId, ()>,
    unlisten: ResultObserver<SubscriptionId, ()>,
    list: ResultObserver<ClusterSelection, Vec<Subscription>>,
}

async fn reconcile(
    mut observers: Observers,
    list: ActionChannel<ClusterSelection>,
    mut selection: watch::Receiver<ClusterSelection>,
    event_subscriptions: Arc<watch::Sender<Vec<Subscription>>>,
    listening: Arc<watch::Sender<BTreeSet<SubscriptionId>>>,
    mut gate: SessionGate,
) {
    let mut model = SubscriptionReadModel::default();

    let publish = |model: &SubscriptionReadModel| {
        event_subscriptions.send_replace(model.subscriptions.clone());
        listening.send_if_modified(|current| {
            if *current != model.listening {
                *current = model.listening.clone();
                true
            } else {
                false
            }
        });
    };

    loop {
        tokio::select! {
            biased;
            _ = gate.ended() => {
                model.clear();
                publish(&model);
                debug!("Session ended, subscriptions cleared");
                break;
            }
            changed = selection.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = selection.borrow_and_update().clone();
                model.clear();
                publish(&model);
                list.push(current);
            }
            Some(Outcome { seq, result, .. }) = observers.add.recv() => {
                if let Ok(subscription) = result {
                    let id = subscription.id.clone();
                    if model.apply_added(seq, subscription) {
                        info!(id = %id, "Subscription added");
                        publish(&model);
                    }
                    list.push(selection.borrow().clone());
                }
            }
            Some(Outcome { seq, intent, result }) = observers.delete.recv() => {
                if result.is_ok() {
                    if model.apply_deleted(seq, &intent) {
                        info!(id = %intent, "Subscription deleted");
                        publish(&model);
                    }
                    list.push(selection.borrow().clone());
                }
            }
            Some(Outcome { seq, intent, result }) = observers.listen.recv() => {
                if result.is_ok() && model.apply_listening(seq, &intent, true) {
                    debug!(id = %intent, "Listening to subscription");
                    publish(&model);
                }
            }
            Some(Outcome { seq, intent, result }) = observers.unlisten.recv() => {
                if result.is_ok() && model.apply_listening(seq, &intent, false) {
                    debug!(id = %intent, "Stopped listening to subscription");
                    publish(&model);
                }
            }
            Some(Outcome { seq, intent, result }) = observers.list.recv() => {
                if intent != *selection.borrow() {
                    debug!(seq, "Subscription list for a previous selection discarded");
                } else if let Ok(subscriptions) = result {
                    if model.apply_listed(seq, subscriptions) {
                        publish(&model);
                    }
                }
            }
            else => break,
        }
    }
}
