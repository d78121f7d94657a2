//! # Connections Module
//!
//! The contract the session engine consumes from a duplex, message-oriented
//! connection, plus the crate's reconnecting WebSocket implementation.
//!
//! A handle is shared through an `Arc` by the orchestrator and the read loop
//! and must tolerate liveness queries, one reader and writers at the same
//! time without any locking on the caller's side.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::configs::session_config::Timeouts;
use crate::error::SubscriberError;

/// Reconnecting WebSocket handle built on tokio-tungstenite.
#[cfg(feature = "recws")]
pub mod recws;

/// Lifecycle of a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not dialed yet, or between a failed attempt and the next one.
    Disconnected,
    /// First dial in progress.
    Connecting,
    /// A link is up; reads and writes may proceed.
    Connected,
    /// The previous link was torn down and a fresh one is being dialed.
    Reconnecting,
    /// Closed for good.
    Stopped,
}

/// Kind of an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// UTF-8 text; the payload must be valid UTF-8.
    Text,
    /// Opaque binary data.
    Binary,
    /// Normal-closure close frame; the payload is the close reason.
    Close,
}

/// Operations the session engine needs from a connection.
pub trait ConnectionHandle: Send + Sync + 'static {
    /// Starts connecting to `endpoint` in the background and returns at once.
    /// Failed attempts are retried internally; only an unusable endpoint is
    /// reported here.
    fn dial(&self, endpoint: &str, timeouts: Timeouts) -> Result<(), SubscriberError>;

    /// Non-blocking liveness query.
    fn is_connected(&self) -> bool;

    /// Waits for the next inbound payload. Fails instead of panicking when the
    /// link breaks, times out or the handle is closed.
    fn read_message(&self) -> impl Future<Output = Result<Bytes, SubscriberError>> + Send;

    /// Best-effort send bounded by the write timeout.
    fn write_message(
        &self,
        kind: MessageKind,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), SubscriberError>> + Send;

    /// Tears down the current link and starts a fresh connection attempt
    /// without waiting for it to succeed.
    fn close_and_reconnect(&self) -> impl Future<Output = ()> + Send;

    /// Graceful, idempotent shutdown.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Resolves once the handle reports a live link. The default polls
    /// [`ConnectionHandle::is_connected`] every `poll` interval; handles with
    /// a change notification should override it.
    fn wait_until_live(&self, poll: Duration) -> impl Future<Output = ()> + Send {
        async move {
            while !self.is_connected() {
                tokio::time::sleep(poll).await;
            }
        }
    }
}
