//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the relay endpoint.
//! The relay itself (Hub, Connector, SessionManager) lives in the `sse` crate.

pub mod handler;
