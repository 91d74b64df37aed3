//! Local stand-in for the upstream producer.
//!
//! Serves `GET /stream` on port 8000 and emits six processing-step messages one second
//! apart, then `FINISHED`, to every caller. Point the relay at it with the default
//! `--upstream-base-url http://localhost:8000`.

use async_stream::stream;
use axum::response::sse::{Event, Sse};
use axum::{routing::get, Router};
use clap::Parser;
use futures::Stream;
use log::*;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use std::convert::Infallible;
use std::time::Duration;
use tokio::net::TcpListener;

const STEPS: [&str; 6] = [
    "Step 1: Data loading complete...",
    "Step 2: Preprocessing data...",
    "Step 3: Model inference started...",
    "Step 4: Calculating results...",
    "Step 5: Postprocessing results...",
    "Step 6: Analysis complete.",
];

#[derive(Parser)]
#[command(name = "demo_upstream")]
#[command(about = "Demo SSE producer for the relay")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    listen: String,

    /// Milliseconds between steps
    #[arg(long, default_value_t = 1000)]
    step_interval_ms: u64,
}

async fn stream_events(
    step_interval: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Client connected to stream.");

    Sse::new(stream! {
        for step in STEPS {
            tokio::time::sleep(step_interval).await;
            info!("Sent: {step}");
            yield Ok(Event::default().data(step));
        }

        tokio::time::sleep(step_interval).await;
        yield Ok(Event::default().data("FINISHED"));
        info!("Stream finished.");
    })
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let _ = TermLogger::init(
        LevelFilter::Info,
        ConfigBuilder::new().set_time_format_rfc3339().build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    let step_interval = Duration::from_millis(cli.step_interval_ms);
    let app = Router::new().route("/stream", get(move || stream_events(step_interval)));

    let listener = TcpListener::bind(&cli.listen).await?;
    info!("Demo upstream listening on http://{}/stream", cli.listen);
    axum::serve(listener, app).await
}
