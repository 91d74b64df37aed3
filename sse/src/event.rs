use axum::response::sse::Event as SseEvent;

/// Event type assumed by SSE consumers when a frame carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// A single event received from upstream and relayed to every subscriber.
///
/// Events are immutable once created. The hub shares one allocation between
/// all mailboxes (`Arc<Event>`), so fan-out never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    event_type: Option<String>,
    data: String,
}

impl Event {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: None,
            data: data.into(),
        }
    }

    /// Tag the event with an SSE event type. The default `message` type is
    /// stored as no tag at all.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        let event_type = event_type.into();
        self.event_type = if event_type.is_empty() || event_type == DEFAULT_EVENT_TYPE {
            None
        } else {
            Some(event_type)
        };
        self
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }
}

impl From<eventsource_client::Event> for Event {
    fn from(event: eventsource_client::Event) -> Self {
        Event::new(event.data).with_event_type(event.event_type)
    }
}

impl From<&Event> for SseEvent {
    fn from(event: &Event) -> Self {
        let sse_event = SseEvent::default().data(event.data());
        match event.event_type() {
            Some(event_type) => sse_event.event(event_type),
            None => sse_event,
        }
    }
}
