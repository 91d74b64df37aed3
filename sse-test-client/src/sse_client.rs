use anyhow::Result;
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Payload the demo upstream sends as its last event.
pub const FINISHED: &str = "FINISHED";

#[derive(Debug, Clone)]
pub struct Event {
    pub data: String,
}

pub struct Connection {
    pub label: String,
    event_rx: mpsc::UnboundedReceiver<Event>,
    handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub async fn establish(base_url: &str, label: String) -> Result<Self> {
        let url = format!("{}/api/process", base_url.trim_end_matches('/'));
        let (tx, rx) = mpsc::unbounded_channel();

        let client = es::ClientBuilder::for_url(&url)?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let task_label = label.clone();
        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => {
                        let sse_event = Event { data: event.data };

                        if tx.send(sse_event).is_err() {
                            debug!("SSE receiver dropped for {}", task_label);
                            break;
                        }
                    }
                    Some(Ok(es::SSE::Comment(_))) => {
                        // Ignore comments (keep-alive)
                    }
                    Some(Err(e)) => {
                        warn!("SSE error for {}: {}", task_label, e);
                        break;
                    }
                    None => {
                        debug!("SSE stream ended for {}", task_label);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            label,
            event_rx: rx,
            handle,
        })
    }

    /// Wait for the next relayed event.
    pub async fn next_event(&mut self, timeout: Duration) -> Result<Event> {
        match tokio::time::timeout(timeout, self.event_rx.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => anyhow::bail!("SSE connection closed"),
            Err(_) => anyhow::bail!("Timeout waiting for event"),
        }
    }

    /// Collect event payloads up to and including `FINISHED`.
    pub async fn collect_until_finished(&mut self, timeout: Duration) -> Result<Vec<String>> {
        let deadline = Instant::now() + timeout;
        let mut received = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                anyhow::bail!(
                    "Timeout waiting for {} after {} event(s)",
                    FINISHED,
                    received.len()
                );
            }

            let event = self.next_event(remaining).await?;
            let finished = event.data == FINISHED;
            received.push(event.data);
            if finished {
                return Ok(received);
            }
        }
    }

    /// Close the connection to the relay.
    pub fn close(self) {
        self.handle.abort();
    }
}
