//! Error types for the tracking client.
//!
//! None of these cross the public tracking API as failures: transport
//! problems surface as `is_connected` / `error` on a tracker, query
//! problems as the "not found" reply shape. They exist for internal
//! propagation, logging, and the `error` field itself.

use std::time::Duration;

use thiserror::Error;
use tracking_protocol::ProtocolError;

#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    /// Connection could not be established or maintained.
    #[error("transport error: {0}")]
    Transport(String),

    /// No connection within the bootstrap wait.
    #[error("unable to connect to tracking service within {waited:?}")]
    ConnectTimeout { waited: Duration },

    /// A point query received no acknowledgement in time.
    #[error("{query} received no acknowledgement within {waited:?}")]
    QueryTimeout { query: &'static str, waited: Duration },

    /// Malformed inbound payload.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("not connected")]
    NotConnected,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<ProtocolError> for TrackingError {
    fn from(e: ProtocolError) -> Self {
        TrackingError::ProtocolViolation(e.to_string())
    }
}

impl From<std::io::Error> for TrackingError {
    fn from(e: std::io::Error) -> Self {
        TrackingError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(e: serde_json::Error) -> Self {
        TrackingError::ProtocolViolation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackingError>;
