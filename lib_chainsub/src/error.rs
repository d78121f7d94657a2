//! # Error Types
//!
//! A single error enum for everything the subscription client can report.
//! Nearly all of these are recoverable: the session treats write errors as
//! best-effort and read errors as a liveness signal. Only
//! [`SubscriberError::HandleClosed`] ends a read loop.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the connection handle and the session engine.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// The endpoint could not be parsed as a `ws://` or `wss://` URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint string.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A session setting is unusable, such as a zero interval.
    #[error("Invalid configuration '{field}': {reason}")]
    InvalidConfig {
        /// The offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A single dial attempt failed.
    #[error("Dial failed: {0}")]
    DialFailed(String),

    /// A single dial attempt did not complete within the dial timeout.
    #[error("Dial timed out after {0:?}")]
    DialTimeout(Duration),

    /// No frame arrived within the read timeout.
    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// A frame could not be flushed within the write timeout.
    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The operation needs a live link and there is none right now.
    #[error("Not connected")]
    NotConnected,

    /// The current link was torn down underneath the caller, either by a
    /// keepalive expiry or by `close_and_reconnect`.
    #[error("Link dropped")]
    LinkDropped,

    /// The peer sent a close frame or the stream ended.
    #[error("Connection closed by peer")]
    ClosedByPeer,

    /// The handle was closed for good; no further I/O is possible.
    #[error("Connection handle is closed")]
    HandleClosed,

    /// A WebSocket protocol or transport error.
    #[cfg(feature = "recws")]
    #[error("WebSocket protocol error: {0}")]
    Protocol(#[from] tokio_tungstenite::tungstenite::Error),

    /// A text frame was requested for a payload that is not UTF-8.
    #[error("Text payload is not valid UTF-8: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),

    /// A request could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SubscriberError {
    /// Returns `true` for the one error after which reading can never succeed
    /// again on this handle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SubscriberError::HandleClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_closed_handle_is_fatal() {
        assert!(SubscriberError::HandleClosed.is_fatal());
        assert!(!SubscriberError::ClosedByPeer.is_fatal());
        assert!(!SubscriberError::NotConnected.is_fatal());
        assert!(!SubscriberError::ReadTimeout(Duration::from_secs(10)).is_fatal());
        assert!(!SubscriberError::LinkDropped.is_fatal());
    }
}
