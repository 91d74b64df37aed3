use anyhow::Result;
use clap::Parser;
use colored::*;
use std::time::Duration;

mod output;
mod scenarios;
mod sse_client;

use output::print_test_summary;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Relay Integration Testing Tool")]
struct Cli {
    /// Base URL of the relay (e.g., http://localhost:8080)
    #[arg(long)]
    base_url: String,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Number of concurrent clients for the fan-out scenario
    #[arg(long, default_value_t = 3)]
    clients: usize,

    /// Seconds to wait for the upstream stream to finish
    #[arg(long, default_value_t = 15)]
    timeout_secs: u64,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test a single client connection receiving an event
    ConnectionTest,
    /// Test several clients receiving the same stream
    FanOut,
    /// Test a client joining mid-stream gets no replay
    LateJoin,
    /// Run all tests
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== TEST PHASE ===".bright_white().bold());
    println!("{} Relay under test: {}", "→".blue(), cli.base_url);

    let timeout = Duration::from_secs(cli.timeout_secs);
    let clients = cli.clients.max(1);
    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(scenarios::test_connection(&cli.base_url, timeout).await?);
        }
        ScenarioChoice::FanOut => {
            results.push(scenarios::test_fan_out(&cli.base_url, clients, timeout).await?);
        }
        ScenarioChoice::LateJoin => {
            results.push(scenarios::test_late_join(&cli.base_url, timeout).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_connection(&cli.base_url, timeout).await?);
            results.push(scenarios::test_fan_out(&cli.base_url, clients, timeout).await?);
            results.push(scenarios::test_late_join(&cli.base_url, timeout).await?);
        }
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
