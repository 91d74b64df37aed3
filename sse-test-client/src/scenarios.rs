use anyhow::Result;
use colored::*;
use futures_util::future::join_all;
use std::time::{Duration, Instant};

use crate::output::{print_event, TestResult};
use crate::sse_client::Connection;

/// One client connects and receives its first relayed event.
pub async fn test_connection(base_url: &str, timeout: Duration) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Connection ===".bright_cyan().bold());
    println!("{} Connecting client to the relay...", "→".blue());

    let mut client = Connection::establish(base_url, "Client A".to_string()).await?;

    let result = match client.next_event(timeout).await {
        Ok(event) => {
            print_event(&client.label, &event);
            println!("{} Relay is streaming events", "✓".green());
            TestResult::pass("connection", start.elapsed())
        }
        Err(e) => {
            println!("{} No event received: {}", "✗".red(), e);
            TestResult::fail("connection", e.to_string(), start.elapsed())
        }
    };

    client.close();
    Ok(result)
}

/// Several clients connect together and must all observe the same stream.
pub async fn test_fan_out(base_url: &str, clients: usize, timeout: Duration) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Fan-out ===".bright_cyan().bold());
    println!("{} Connecting {} clients...", "→".blue(), clients);

    let mut connections = Vec::with_capacity(clients);
    for i in 0..clients {
        connections.push(Connection::establish(base_url, format!("Client {}", i + 1)).await?);
    }

    println!("{} Waiting for every client to reach FINISHED...", "→".blue());
    let sequences = join_all(
        connections
            .iter_mut()
            .map(|connection| connection.collect_until_finished(timeout)),
    )
    .await;

    let mut received = Vec::with_capacity(clients);
    for (connection, sequence) in connections.iter().zip(sequences) {
        match sequence {
            Ok(events) => {
                println!(
                    "{} {} received {} event(s)",
                    "✓".green(),
                    connection.label,
                    events.len()
                );
                received.push(events);
            }
            Err(e) => {
                println!("{} {} failed: {}", "✗".red(), connection.label, e);
                return Ok(TestResult::fail(
                    "fan_out",
                    format!("{}: {}", connection.label, e),
                    start.elapsed(),
                ));
            }
        }
    }

    for connection in connections {
        connection.close();
    }

    // Clients connected a moment apart may miss a leading event, never a later one.
    let longest = received.iter().map(Vec::len).max().unwrap_or(0);
    let reference = received
        .iter()
        .find(|events| events.len() == longest)
        .cloned()
        .unwrap_or_default();
    let consistent = received
        .iter()
        .all(|events| reference.ends_with(events));

    if consistent {
        println!("{} All clients saw the same event order", "✓".green());
        Ok(TestResult::pass("fan_out", start.elapsed()))
    } else {
        println!("{} Event sequences diverged!", "✗".red());
        Ok(TestResult::fail(
            "fan_out",
            format!("Sequences diverged: {:?}", received),
            start.elapsed(),
        ))
    }
}

/// A second client joins mid-stream and must only see events published after it joined.
pub async fn test_late_join(base_url: &str, timeout: Duration) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Late join ===".bright_cyan().bold());
    println!("{} Connecting first client...", "→".blue());

    let mut early = Connection::establish(base_url, "Early client".to_string()).await?;
    let first = match early.next_event(timeout).await {
        Ok(event) => {
            print_event(&early.label, &event);
            event.data
        }
        Err(e) => {
            println!("{} First client received nothing: {}", "✗".red(), e);
            return Ok(TestResult::fail("late_join", e.to_string(), start.elapsed()));
        }
    };

    println!("{} Connecting second client mid-stream...", "→".blue());
    let mut late = Connection::establish(base_url, "Late client".to_string()).await?;

    let (early_rest, late_events) = tokio::join!(
        early.collect_until_finished(timeout),
        late.collect_until_finished(timeout)
    );
    early.close();
    late.close();

    let (early_rest, late_events) = match (early_rest, late_events) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            println!("{} Stream did not finish: {}", "✗".red(), e);
            return Ok(TestResult::fail("late_join", e.to_string(), start.elapsed()));
        }
    };

    if late_events.contains(&first) {
        println!("{} Late client was replayed an old event!", "✗".red());
        return Ok(TestResult::fail(
            "late_join",
            format!("Late client received {:?} published before it joined", first),
            start.elapsed(),
        ));
    }

    if !early_rest.ends_with(&late_events) {
        println!("{} Late client saw a different sequence!", "✗".red());
        return Ok(TestResult::fail(
            "late_join",
            format!("Early: {:?}, late: {:?}", early_rest, late_events),
            start.elapsed(),
        ));
    }

    println!(
        "{} Late client received {} new event(s) and no replay",
        "✓".green(),
        late_events.len()
    );
    Ok(TestResult::pass("late_join", start.elapsed()))
}
