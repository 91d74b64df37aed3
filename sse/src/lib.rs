//! Server-Sent Events (SSE) relay core.
//!
//! This crate keeps exactly one subscription to an upstream SSE producer and fans
//! every event it receives out to any number of connected clients, each reading at
//! its own pace.
//!
//! # Architecture
//!
//! - **Single upstream**: the `Connector` opens the upstream stream on demand.
//!   `start()` is idempotent, so concurrent client arrivals never open a second
//!   connection. Failures are logged and left for the next client to retry.
//! - **Bounded mailboxes**: every subscriber owns a bounded channel. The `Hub`
//!   offers each event with a non-blocking send; a full mailbox loses that event
//!   and nobody else notices.
//! - **Concurrent registry**: subscriptions live in a `DashMap`, snapshotted on
//!   publish, so subscribers can come and go while events are in flight.
//! - **Scoped sessions**: a `Session` owns its `Subscription`; dropping it (client
//!   disconnect, write failure, shutdown) unregisters the mailbox exactly once.
//! - **Ephemeral events**: nothing is persisted or replayed. Late joiners only see
//!   what is published after they subscribe.
//!
//! # Message Flow
//!
//! 1. A client hits `/api/process`; the handler calls `SessionManager::open_session`
//! 2. The session subscribes to the hub, then asks the connector to start
//! 3. The connector decodes upstream events and calls `Hub::publish`
//! 4. The hub `try_send`s the shared event into every registered mailbox
//! 5. Each session forwards its mailbox to the client as SSE frames
//!
//! # Modules
//!
//! - `connection`: SubscriberRegistry and type-safe SubscriptionId
//! - `error`: Error and error kind tree
//! - `event`: the relayed Event type
//! - `hub`: Hub, Subscription and the upstream state flag
//! - `session`: SessionManager and per-client Session
//! - `upstream`: Connector and the UpstreamSource seam

pub mod connection;
pub mod error;
pub mod event;
pub mod hub;
pub mod session;
pub mod upstream;

pub use event::Event;
pub use hub::{Hub, Subscription, UpstreamState};
pub use session::{Session, SessionManager};
pub use upstream::{Connector, EventSourceUpstream, UpstreamSource};
