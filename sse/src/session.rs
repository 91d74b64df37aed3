use crate::connection::SubscriptionId;
use crate::event::Event;
use crate::hub::{Hub, Subscription};
use crate::upstream::Connector;
use async_stream::stream;
use axum::response::sse::Event as SseEvent;
use futures::Stream;
use log::*;
use std::convert::Infallible;
use std::sync::Arc;

/// Accepts client sessions: subscribes them to the hub and makes sure the upstream
/// connection is running.
pub struct SessionManager {
    hub: Arc<Hub>,
    connector: Arc<Connector>,
}

impl SessionManager {
    pub fn new(hub: Arc<Hub>, connector: Arc<Connector>) -> Self {
        Self { hub, connector }
    }

    /// Subscribe a newly connected client, then start the upstream if it is idle.
    ///
    /// Subscribing first means the client sees every event of a connection that its
    /// own arrival triggered.
    pub fn open_session(&self) -> Session {
        let subscription = self.hub.subscribe();
        if self.connector.start() {
            debug!("Session {} triggered a new upstream connection", subscription.id());
        }
        info!(
            "Client session {} opened ({} active)",
            subscription.id(),
            self.hub.subscriber_count()
        );

        Session {
            subscription,
            forwarded: 0,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// Stop the upstream connection and end every open session.
    pub fn shutdown(&self) {
        self.connector.shutdown();
        self.hub.close();
    }
}

/// One client's connection lifetime.
///
/// Dropping the session (client disconnect, failed write, server shutdown) drops
/// its subscription, which unregisters the mailbox exactly once.
pub struct Session {
    subscription: Subscription,
    forwarded: u64,
}

impl Session {
    pub fn id(&self) -> &SubscriptionId {
        self.subscription.id()
    }

    /// Wait for the next relayed event. `None` once the hub closed the mailbox.
    pub async fn next_event(&mut self) -> Option<Arc<Event>> {
        let event = self.subscription.recv().await?;
        self.forwarded += 1;
        Some(event)
    }

    /// Number of events handed to the client so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    /// Turn the session into an SSE body stream.
    ///
    /// The HTTP server drops this stream when the client goes away or a write
    /// fails, which ends the session.
    pub fn into_stream(self) -> impl Stream<Item = Result<SseEvent, Infallible>> {
        let mut session = self;
        stream! {
            while let Some(event) = session.next_event().await {
                yield Ok(SseEvent::from(event.as_ref()));
            }

            debug!("Mailbox for session {} closed by the hub", session.id());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        info!(
            "Client session {} ended after {} event(s)",
            self.subscription.id(),
            self.forwarded
        );
    }
}
