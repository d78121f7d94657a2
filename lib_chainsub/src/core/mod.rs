//! # Core Engine Module
//!
//! The session engine proper. Everything here is generic over the
//! [`ConnectionHandle`](crate::connections::ConnectionHandle) so it can run
//! over the real reconnecting socket or over a scripted test double.
//!
//! ## Core Components:
//!
//! - **`signal`**: capacity-one mailboxes with a non-blocking `offer`. The
//!   liveness alarm and the reconnect-complete signal are built on them.
//!
//! - **`decoder`**: the seam to the external decoder and the isolation that
//!   keeps a failing decoder from touching the connection.
//!
//! - **`subscriptions`**: writes the fixed version / new-head / finalized-head
//!   requests after every (re)connect.
//!
//! - **`heartbeat`**: the advisory `system_health` request sent on each tick
//!   while the link is live.
//!
//! - **`read_loop`**: the task that consumes inbound frames and raises the
//!   liveness alarm when a read fails.
//!
//! - **`session`**: the orchestrator that arbitrates between the read loop,
//!   the heartbeat timer and the external stop request.

/// Capacity-one signals with "already pending" checks.
pub mod signal;
/// The external decoder trait and panic isolation.
pub mod decoder;
/// The subscription controller.
pub mod subscriptions;
/// The heartbeat scheduler.
pub mod heartbeat;
/// The read loop task.
pub mod read_loop;
/// The session orchestrator.
pub mod session;

#[cfg(test)]
pub(crate) mod scripted;

// --- Public API Re-exports ---
pub use decoder::MessageDecoder;
pub use heartbeat::Heartbeat;
pub use read_loop::ReadLoop;
pub use session::{Session, SessionExit, SessionReport, SessionState, SessionStats};
pub use signal::{single_slot, SlotReceiver, SlotSender};
pub use subscriptions::SubscriptionController;
