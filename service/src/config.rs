use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Default base URL of the upstream SSE producer.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "http://localhost:8000";

/// Default path of the upstream SSE endpoint, appended to the base URL.
pub const DEFAULT_UPSTREAM_PATH: &str = "/stream";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Base URL of the upstream server-sent events producer.
    #[arg(short, long, env, default_value = DEFAULT_UPSTREAM_BASE_URL)]
    upstream_base_url: String,

    /// Path of the upstream SSE endpoint, relative to the base URL.
    #[arg(long, env, default_value = DEFAULT_UPSTREAM_PATH)]
    upstream_path: String,

    /// Number of events buffered per connected client before new events are dropped
    /// for that client.
    #[arg(short, long, env, default_value = "256")]
    mailbox_capacity: NonZeroUsize,

    /// Seconds between keep-alive comments sent on idle client streams.
    #[arg(long, env, default_value_t = 15)]
    pub keep_alive_secs: u64,

    /// Open the upstream connection at process start instead of waiting for the
    /// first client.
    #[arg(long, env, default_value_t = false)]
    pub connect_on_start: bool,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 8080)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Full URL of the upstream SSE endpoint, joined with exactly one `/`.
    pub fn upstream_url(&self) -> String {
        format!(
            "{}/{}",
            self.upstream_base_url.trim_end_matches('/'),
            self.upstream_path.trim_start_matches('/')
        )
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.mailbox_capacity.get()
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    /// Socket address string to bind the HTTP listener to.
    pub fn listen_address(&self) -> String {
        format!(
            "{}:{}",
            self.interface.as_deref().unwrap_or("127.0.0.1"),
            self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_local_development_setup() {
        let config = Config::parse_from(["sse-relay"]);

        assert_eq!(config.upstream_url(), "http://localhost:8000/stream");
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.mailbox_capacity(), 256);
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(15));
        assert!(!config.connect_on_start);
        assert_eq!(config.listen_address(), "127.0.0.1:8080");
        assert_eq!(config.log_level_filter, LevelFilter::Info);
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::parse_from([
            "sse-relay",
            "--upstream-base-url",
            "http://producer:9000/",
            "--upstream-path",
            "events",
            "--allowed-origins",
            "http://a.test,http://b.test",
            "--mailbox-capacity",
            "4",
            "--connect-on-start",
            "--port",
            "9090",
            "--log-level-filter",
            "DEBUG",
        ]);

        assert_eq!(config.upstream_url(), "http://producer:9000/events");
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.mailbox_capacity(), 4);
        assert!(config.connect_on_start);
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_level_filter, LevelFilter::Debug);
    }

    #[test]
    fn test_zero_mailbox_capacity_is_rejected() {
        let result = Config::try_parse_from(["sse-relay", "--mailbox-capacity", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_upstream_url_joins_with_single_slash() {
        for (base, path) in [
            ("http://localhost:8000", "stream"),
            ("http://localhost:8000/", "/stream"),
            ("http://localhost:8000", "/stream"),
        ] {
            let config = Config::parse_from([
                "sse-relay",
                "--upstream-base-url",
                base,
                "--upstream-path",
                path,
            ]);
            assert_eq!(config.upstream_url(), "http://localhost:8000/stream");
        }
    }
}
