use crate::connection::{Delivery, SubscriberRegistry, SubscriptionId};
use crate::event::Event;
use log::*;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{error::TryRecvError, Receiver};

/// Lifecycle of the single upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamState {
    Disconnected,
    Connecting,
    Streaming,
    Failed,
}

impl UpstreamState {
    /// Whether a connection attempt is currently in flight.
    pub fn is_active(self) -> bool {
        matches!(self, UpstreamState::Connecting | UpstreamState::Streaming)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => UpstreamState::Connecting,
            2 => UpstreamState::Streaming,
            3 => UpstreamState::Failed,
            _ => UpstreamState::Disconnected,
        }
    }
}

impl std::fmt::Display for UpstreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpstreamState::Disconnected => "disconnected",
            UpstreamState::Connecting => "connecting",
            UpstreamState::Streaming => "streaming",
            UpstreamState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Atomic holder for [`UpstreamState`].
pub struct UpstreamStatus(AtomicU8);

impl UpstreamStatus {
    fn new() -> Self {
        Self(AtomicU8::new(UpstreamState::Disconnected as u8))
    }

    pub fn get(&self) -> UpstreamState {
        UpstreamState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: UpstreamState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `Connecting` unless an attempt is already in flight.
    ///
    /// Exactly one of any number of concurrent callers gets `true`.
    pub fn try_begin_connect(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if UpstreamState::from_u8(current).is_active() {
                return false;
            }
            match self.0.compare_exchange(
                current,
                UpstreamState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

/// The broadcast hub: one instance per process, shared behind an `Arc`.
///
/// Holds the subscriber registry and the upstream connection flag. Publishing
/// never waits on a subscriber; a full mailbox loses that event only.
pub struct Hub {
    registry: Arc<SubscriberRegistry>,
    mailbox_capacity: usize,
    upstream: UpstreamStatus,
    dropped_total: AtomicU64,
}

impl Hub {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            registry: Arc::new(SubscriberRegistry::new()),
            mailbox_capacity: mailbox_capacity.max(1),
            upstream: UpstreamStatus::new(),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Register a new bounded mailbox and hand back its owning subscription.
    pub fn subscribe(&self) -> Subscription {
        let (id, receiver) = self.registry.register(self.mailbox_capacity);
        debug!(
            "Registered subscription {} ({} active)",
            id,
            self.registry.len()
        );
        Subscription {
            id,
            receiver,
            registry: Arc::clone(&self.registry),
            released: false,
        }
    }

    /// Offer an event to every current subscriber.
    pub fn publish(&self, event: Event) -> Delivery {
        let delivery = self.registry.broadcast(Arc::new(event));
        if delivery.dropped > 0 {
            self.dropped_total
                .fetch_add(delivery.dropped as u64, Ordering::Relaxed);
        }
        delivery
    }

    /// Remove and close a subscription. Equivalent to dropping it.
    pub fn unsubscribe(&self, subscription: Subscription) {
        subscription.unsubscribe();
    }

    /// Drop every registration so that all sessions observe end-of-stream.
    pub fn close(&self) {
        let closed = self.registry.clear();
        info!("Closed {} subscriber mailbox(es)", closed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity
    }

    pub fn upstream(&self) -> &UpstreamStatus {
        &self.upstream
    }

    pub fn upstream_state(&self) -> UpstreamState {
        self.upstream.get()
    }

    /// Events lost to full mailboxes since the hub was created.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

/// One subscriber's mailbox, owned by its session.
///
/// The registration is released exactly once: by [`Subscription::unsubscribe`] or,
/// failing that, when the subscription is dropped.
pub struct Subscription {
    id: SubscriptionId,
    receiver: Receiver<Arc<Event>>,
    registry: Arc<SubscriberRegistry>,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Wait for the next event. `None` once the hub has closed the mailbox.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Arc<Event>, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.receiver.close();
        if self.registry.unregister(&self.id) {
            debug!(
                "Released subscription {} ({} active)",
                self.id,
                self.registry.len()
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
