use crate::event::Event;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

/// Unique identifier for a subscription (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of fanning a single event out to the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Mailboxes that accepted the event.
    pub delivered: usize,
    /// Mailboxes that were full and lost the event.
    pub dropped: usize,
}

/// Concurrent registry of subscriber mailboxes, keyed by subscription id.
///
/// Only the sending half of each mailbox lives here. The receiving half is owned by
/// the subscription, which removes its registration when released.
pub struct SubscriberRegistry {
    mailboxes: DashMap<SubscriptionId, Sender<Arc<Event>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            mailboxes: DashMap::new(),
        }
    }

    /// Create a bounded mailbox and register its sender - O(1)
    pub fn register(&self, capacity: usize) -> (SubscriptionId, Receiver<Arc<Event>>) {
        let subscription_id = SubscriptionId::new();
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        self.mailboxes.insert(subscription_id.clone(), sender);

        (subscription_id, receiver)
    }

    /// Remove a registration - O(1). Returns false when it was already gone.
    pub fn unregister(&self, subscription_id: &SubscriptionId) -> bool {
        self.mailboxes.remove(subscription_id).is_some()
    }

    /// Offer an event to every registered mailbox without ever waiting - O(n)
    ///
    /// Registrations are snapshotted first so no shard lock is held while sending,
    /// and mailboxes registered or removed meanwhile are unaffected.
    pub fn broadcast(&self, event: Arc<Event>) -> Delivery {
        let snapshot: Vec<Sender<Arc<Event>>> = self
            .mailboxes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut delivery = Delivery::default();
        for sender in snapshot {
            match sender.try_send(Arc::clone(&event)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => delivery.dropped += 1,
                // Receiver already closed by its subscription; nothing to deliver.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivery
    }

    /// Drop every registration. Each mailbox reports end-of-stream once drained.
    pub fn clear(&self) -> usize {
        let count = self.mailboxes.len();
        self.mailboxes.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.is_empty()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
