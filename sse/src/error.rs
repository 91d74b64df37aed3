//! Error types for the `sse` crate.
//!
//! Follows the workspace pattern of a root Error struct holding an optional source
//! and a tree of error kind enums.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the relay.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Upstream(UpstreamErrorKind),
}

/// Errors raised while connecting to or reading from the upstream producer.
#[derive(Debug, PartialEq)]
pub enum UpstreamErrorKind {
    /// The configured endpoint could not be turned into a request.
    InvalidEndpoint,
    /// The connection failed to establish or dropped mid-stream.
    Transport,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Upstream(kind) => write!(f, "Upstream error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<eventsource_client::Error> for Error {
    fn from(err: eventsource_client::Error) -> Self {
        // Request building errors are mapped where the client is built, so
        // anything reaching this conversion happened on the wire.
        Error {
            source: Some(err.to_string().into()),
            error_kind: ErrorKind::Upstream(UpstreamErrorKind::Transport),
        }
    }
}

/// Helper function to create upstream errors.
pub fn upstream_error(kind: UpstreamErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Upstream(kind),
    }
}
