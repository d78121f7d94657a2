//! # lib_chainsub
//!
//! A long-lived subscription client for a blockchain node's WebSocket
//! notification endpoint. A [`Session`](crate::core::Session) keeps one duplex connection
//! open, re-issues the fixed set of chain subscriptions after every reconnect
//! and hands every inbound frame, untouched, to an injected decoder.
//!
//! ## Modules:
//! - **`configs`**: `SessionConfig`, timeouts and backoff settings.
//! - **`connections`**: the `ConnectionHandle` contract and, behind the
//!   `recws` feature, the tokio-tungstenite `ReconnectingSocket`.
//! - **`core`**: single-slot signals, the decoder seam, the read loop,
//!   heartbeat, subscription controller and the session orchestrator.
//! - **`loggers`**: the structured logging collaborator injected into every
//!   component.
//! - **`rpc`**: JSON-RPC request builders and the fixed request ids.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod configs;
pub mod connections;
pub mod core;
pub mod error;
pub mod loggers;
pub mod rpc;

// --- Public API Re-exports ---
pub use configs::session_config::{Backoff, SessionConfig, Timeouts};
pub use connections::{ConnectionHandle, ConnectionState, MessageKind};
#[cfg(feature = "recws")]
pub use connections::recws::ReconnectingSocket;
pub use crate::core::decoder::MessageDecoder;
pub use crate::core::session::{Session, SessionExit, SessionReport, SessionState, SessionStats};
pub use error::SubscriberError;
pub use loggers::loggerlocal::LoggerLocal;
pub use loggers::Logger;
