use colored::*;
use std::time::Duration;

use crate::sse_client::Event;

pub struct TestResult {
    pub scenario: String,
    pub passed: bool,
    pub message: Option<String>,
    pub duration: Duration,
}

impl TestResult {
    pub fn pass(scenario: &str, duration: Duration) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: true,
            message: None,
            duration,
        }
    }

    pub fn fail(scenario: &str, message: String, duration: Duration) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: false,
            message: Some(message),
            duration,
        }
    }
}

pub fn print_event(label: &str, event: &Event) {
    println!(
        "  {} {} received: {}",
        "←".cyan(),
        label.bright_white(),
        event.data
    );
}

pub fn print_test_summary(results: &[TestResult]) {
    for result in results {
        let status = if result.passed {
            "PASS".bright_green().bold()
        } else {
            "FAIL".bright_red().bold()
        };

        println!(
            "{} {} ({:.2}s)",
            status,
            result.scenario,
            result.duration.as_secs_f64()
        );

        if let Some(message) = &result.message {
            println!("     {}", message.yellow());
        }
    }

    let passed = results.iter().filter(|r| r.passed).count();
    println!("\n{}/{} scenarios passed", passed, results.len());
}
