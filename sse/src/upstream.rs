//! The single upstream subscription feeding the hub.

use crate::error::{upstream_error, Error, Result, UpstreamErrorKind};
use crate::event::Event;
use crate::hub::{Hub, UpstreamState};
use async_stream::stream;
use async_trait::async_trait;
use eventsource_client::{self as es, Client};
use futures::stream::{BoxStream, StreamExt};
use log::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Decoded upstream events. The stream ends when the producer completes.
pub type EventStream = BoxStream<'static, Result<Event>>;

/// A producer of server-sent events that the connector can subscribe to.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Open one streaming request to the producer.
    async fn open(&self) -> Result<EventStream>;

    /// Human readable endpoint, used in log lines.
    fn endpoint(&self) -> &str;
}

/// Upstream producer reached over HTTP and decoded with `eventsource-client`.
///
/// Reconnection is disabled: a dropped connection ends the stream with an error
/// and it is up to the next `Connector::start` to try again.
pub struct EventSourceUpstream {
    url: String,
}

impl EventSourceUpstream {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl UpstreamSource for EventSourceUpstream {
    async fn open(&self) -> Result<EventStream> {
        let client = es::ClientBuilder::for_url(&self.url)
            .map_err(|e| upstream_error(UpstreamErrorKind::InvalidEndpoint, &e.to_string()))?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let events = stream! {
            let mut sse = client.stream();
            while let Some(item) = sse.next().await {
                match item {
                    Ok(es::SSE::Event(event)) => yield Ok(Event::from(event)),
                    Ok(es::SSE::Comment(_)) => {
                        // Ignore comments (keep-alive)
                    }
                    // End of body with reconnection disabled.
                    Err(es::Error::Eof) => break,
                    Err(e) => {
                        yield Err(Error::from(e));
                        break;
                    }
                }
            }
        };

        Ok(events.boxed())
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Owns the lifecycle of the one upstream subscription and pushes every decoded
/// event into the hub.
pub struct Connector {
    hub: Arc<Hub>,
    source: Arc<dyn UpstreamSource>,
    attempts: AtomicU64,
    task: Mutex<TaskSlot>,
}

/// The running connection task and the generation it was launched under.
///
/// `shutdown` bumps the generation, so a task that is still mid-poll when it is
/// aborted can no longer write the upstream state.
#[derive(Default)]
struct TaskSlot {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl Connector {
    pub fn new(hub: Arc<Hub>, source: Arc<dyn UpstreamSource>) -> Self {
        Self {
            hub,
            source,
            attempts: AtomicU64::new(0),
            task: Mutex::new(TaskSlot::default()),
        }
    }

    /// Open the upstream stream unless an attempt is already connecting or streaming.
    ///
    /// Returns `true` only for the caller that launched a new attempt. Must be called
    /// from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.hub.upstream().try_begin_connect() {
            trace!(
                "Upstream already {}, not starting another connection",
                self.hub.upstream_state()
            );
            return false;
        }

        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "Connecting to upstream {} (attempt {})",
            self.source.endpoint(),
            attempt
        );

        let mut slot = self.slot();
        let connector = Arc::clone(self);
        let generation = slot.generation;
        slot.handle = Some(tokio::spawn(async move {
            connector.run(generation).await
        }));
        true
    }

    /// Abort the running connection, if any, and mark the upstream disconnected.
    pub fn shutdown(&self) {
        let mut slot = self.slot();
        slot.generation += 1;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
            info!("Upstream connection to {} aborted", self.source.endpoint());
        }
        self.hub.upstream().set(UpstreamState::Disconnected);
    }

    /// Number of connection attempts launched so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// The upstream URL this connector dials.
    pub fn endpoint(&self) -> &str {
        self.source.endpoint()
    }

    fn slot(&self) -> MutexGuard<'_, TaskSlot> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the upstream state on behalf of the task launched under `generation`.
    /// Returns `false` once a shutdown has superseded that task.
    fn transition(&self, generation: u64, state: UpstreamState) -> bool {
        let slot = self.slot();
        if slot.generation != generation {
            return false;
        }
        self.hub.upstream().set(state);
        true
    }

    async fn run(self: Arc<Self>, generation: u64) {
        let mut events = match self.source.open().await {
            Ok(events) => events,
            Err(e) => {
                error!(
                    "Failed to connect to upstream {}: {e}",
                    self.source.endpoint()
                );
                self.transition(generation, UpstreamState::Failed);
                return;
            }
        };

        // The HTTP client connects lazily; the first event proves the stream is live.
        let mut streaming = false;
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if !streaming {
                        if !self.transition(generation, UpstreamState::Streaming) {
                            return;
                        }
                        streaming = true;
                    }
                    debug!("Received upstream event: {}", event.data());
                    let delivery = self.hub.publish(event);
                    trace!(
                        "Relayed to {} subscriber(s), {} dropped",
                        delivery.delivered,
                        delivery.dropped
                    );
                }
                Err(e) => {
                    error!(
                        "Error consuming upstream stream {}: {e}",
                        self.source.endpoint()
                    );
                    self.transition(generation, UpstreamState::Failed);
                    return;
                }
            }
        }

        info!("Finished consuming upstream stream {}", self.source.endpoint());
        self.transition(generation, UpstreamState::Disconnected);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    /// In-memory upstream: events are fed through a channel, `open` can be held
    /// back until released.
    pub(crate) struct FakeUpstream {
        pub opens: AtomicUsize,
        pub gate: Notify,
        gated: bool,
        feed: Mutex<Option<mpsc::UnboundedReceiver<Result<Event>>>>,
        fail_open: bool,
    }

    impl FakeUpstream {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<Result<Event>>) {
            Self::build(false, false)
        }

        pub(crate) fn gated() -> (Arc<Self>, mpsc::UnboundedSender<Result<Event>>) {
            Self::build(true, false)
        }

        pub(crate) fn refusing() -> Arc<Self> {
            Self::build(false, true).0
        }

        fn build(
            gated: bool,
            fail_open: bool,
        ) -> (Arc<Self>, mpsc::UnboundedSender<Result<Event>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let fake = Arc::new(Self {
                opens: AtomicUsize::new(0),
                gate: Notify::new(),
                gated,
                feed: Mutex::new(Some(rx)),
                fail_open,
            });
            (fake, tx)
        }

        pub(crate) fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamSource for FakeUpstream {
        async fn open(&self) -> Result<EventStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.gated {
                self.gate.notified().await;
            }
            if self.fail_open {
                return Err(upstream_error(
                    UpstreamErrorKind::Transport,
                    "connection refused",
                ));
            }
            let mut rx = self
                .feed
                .lock()
                .unwrap()
                .take()
                .expect("fake upstream opened twice");
            Ok(stream! {
                while let Some(item) = rx.recv().await {
                    yield item;
                }
            }
            .boxed())
        }

        fn endpoint(&self) -> &str {
            "fake://stream"
        }
    }

    pub(crate) async fn wait_for_state(hub: &Hub, expected: UpstreamState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.upstream_state() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("upstream never reached {expected}"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_opens_exactly_one_connection() {
        let hub = Arc::new(Hub::new(8));
        let (fake, feed) = FakeUpstream::gated();
        let connector = Arc::new(Connector::new(hub.clone(), fake.clone()));

        let starts: Vec<_> = (0..16)
            .map(|_| {
                let connector = connector.clone();
                tokio::spawn(async move { connector.start() })
            })
            .collect();

        let mut winners = 0;
        for start in starts {
            if start.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(connector.attempts(), 1);
        assert_eq!(hub.upstream_state(), UpstreamState::Connecting);

        fake.gate.notify_one();
        feed.send(Ok(Event::new("e1"))).unwrap();
        wait_for_state(&hub, UpstreamState::Streaming).await;
        assert!(!connector.start());
        assert_eq!(fake.opens(), 1);
    }

    #[tokio::test]
    async fn test_events_are_published_in_order() {
        let hub = Arc::new(Hub::new(8));
        let (fake, feed) = FakeUpstream::new();
        let connector = Arc::new(Connector::new(hub.clone(), fake));
        let mut subscription = hub.subscribe();

        assert!(connector.start());
        feed.send(Ok(Event::new("e1"))).unwrap();
        feed.send(Ok(Event::new("e2"))).unwrap();

        assert_eq!(subscription.recv().await.unwrap().data(), "e1");
        assert_eq!(subscription.recv().await.unwrap().data(), "e2");
        assert_eq!(hub.upstream_state(), UpstreamState::Streaming);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_subscribers_open() {
        let hub = Arc::new(Hub::new(8));
        let (fake, feed) = FakeUpstream::new();
        let connector = Arc::new(Connector::new(hub.clone(), fake));
        let mut subscription = hub.subscribe();

        connector.start();
        feed.send(Ok(Event::new("e1"))).unwrap();
        feed.send(Err(upstream_error(UpstreamErrorKind::Transport, "reset")))
            .unwrap();

        assert_eq!(subscription.recv().await.unwrap().data(), "e1");
        wait_for_state(&hub, UpstreamState::Failed).await;

        // No cascade: the mailbox is still open, just quiet.
        assert!(matches!(
            subscription.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Empty)
        ));
        assert_eq!(hub.subscriber_count(), 1);
        let _late = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_retried_until_next_start() {
        let hub = Arc::new(Hub::new(8));
        let fake = FakeUpstream::refusing();
        let connector = Arc::new(Connector::new(hub.clone(), fake.clone()));

        assert!(connector.start());
        wait_for_state(&hub, UpstreamState::Failed).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fake.opens(), 1);

        assert!(connector.start());
        wait_for_state(&hub, UpstreamState::Failed).await;
        assert_eq!(fake.opens(), 2);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_completion_disconnects_without_closing_mailboxes() {
        let hub = Arc::new(Hub::new(8));
        let (fake, feed) = FakeUpstream::new();
        let connector = Arc::new(Connector::new(hub.clone(), fake));
        let mut subscription = hub.subscribe();

        connector.start();
        feed.send(Ok(Event::new("FINISHED"))).unwrap();
        drop(feed);

        assert_eq!(subscription.recv().await.unwrap().data(), "FINISHED");
        wait_for_state(&hub, UpstreamState::Disconnected).await;
        assert!(matches!(
            subscription.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_running_connection() {
        let hub = Arc::new(Hub::new(8));
        let (fake, feed) = FakeUpstream::new();
        let connector = Arc::new(Connector::new(hub.clone(), fake));

        connector.start();
        feed.send(Ok(Event::new("e1"))).unwrap();
        wait_for_state(&hub, UpstreamState::Streaming).await;

        connector.shutdown();
        assert_eq!(hub.upstream_state(), UpstreamState::Disconnected);
    }

    #[tokio::test]
    async fn test_streaming_is_reported_after_first_event() {
        let hub = Arc::new(Hub::new(8));
        let (fake, feed) = FakeUpstream::new();
        let connector = Arc::new(Connector::new(hub.clone(), fake.clone()));
        let mut subscription = hub.subscribe();

        connector.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fake.opens(), 1);
        assert_eq!(hub.upstream_state(), UpstreamState::Connecting);

        feed.send(Ok(Event::new("e1"))).unwrap();
        assert_eq!(subscription.recv().await.unwrap().data(), "e1");
        assert_eq!(hub.upstream_state(), UpstreamState::Streaming);
    }

    #[tokio::test]
    async fn test_task_from_before_shutdown_cannot_overwrite_state() {
        let hub = Arc::new(Hub::new(8));
        let connector = Arc::new(Connector::new(hub.clone(), FakeUpstream::refusing()));

        connector.shutdown();
        assert_eq!(hub.upstream_state(), UpstreamState::Disconnected);

        // A run launched under generation 0 finishing after the shutdown.
        connector.clone().run(0).await;
        assert_eq!(hub.upstream_state(), UpstreamState::Disconnected);

        // A fresh start is unaffected.
        assert!(connector.start());
        wait_for_state(&hub, UpstreamState::Failed).await;
    }

    mod event_source {
        use super::*;
        use axum::response::sse::{Event as SseEvent, Sse};
        use axum::routing::get;
        use axum::Router;
        use futures::Stream;
        use std::convert::Infallible;
        use tokio::net::TcpListener;

        async fn finite_stream(
        ) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
            Sse::new(futures::stream::iter([
                Ok(SseEvent::default().data("e1")),
                Ok(SseEvent::default().event("progress").data("e2")),
                Ok(SseEvent::default().data("FINISHED")),
            ]))
        }

        async fn spawn_finite_upstream() -> String {
            let app = Router::new().route("/stream", get(finite_stream));
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, app).await });
            format!("http://{addr}/stream")
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_upstream_end_of_body_is_a_normal_completion() {
            let url = spawn_finite_upstream().await;
            let hub = Arc::new(Hub::new(8));
            let upstream = Arc::new(EventSourceUpstream::new(url.clone()));
            let connector = Arc::new(Connector::new(hub.clone(), upstream));
            assert_eq!(connector.endpoint(), url);
            let mut subscription = hub.subscribe();

            assert!(connector.start());
            let mut received = Vec::new();
            for _ in 0..3 {
                let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
                    .await
                    .expect("timed out waiting for upstream event")
                    .expect("mailbox closed");
                received.push((event.event_type().map(str::to_owned), event.data().to_owned()));
            }

            assert_eq!(
                received,
                vec![
                    (None, "e1".to_owned()),
                    (Some("progress".to_owned()), "e2".to_owned()),
                    (None, "FINISHED".to_owned()),
                ]
            );

            // Completion is not an error and does not close the mailbox.
            wait_for_state(&hub, UpstreamState::Disconnected).await;
            assert!(matches!(
                subscription.try_recv(),
                Err(tokio::sync::mpsc::error::TryRecvError::Empty)
            ));
            assert_eq!(hub.subscriber_count(), 1);
            assert_eq!(connector.attempts(), 1);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_refused_upstream_fails_without_streaming() {
            // Bind and release a port so nothing is listening on it.
            let addr = TcpListener::bind("127.0.0.1:0")
                .await
                .unwrap()
                .local_addr()
                .unwrap();
            let hub = Arc::new(Hub::new(8));
            let upstream = Arc::new(EventSourceUpstream::new(format!("http://{addr}/stream")));
            let connector = Arc::new(Connector::new(hub.clone(), upstream));

            assert!(connector.start());
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let state = hub.upstream_state();
                    assert_ne!(state, UpstreamState::Streaming);
                    if state == UpstreamState::Failed {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("upstream never failed");
        }
    }
}
