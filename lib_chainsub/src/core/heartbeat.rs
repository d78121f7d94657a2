//! # Heartbeat Scheduler
//!
//! One `system_health` request per tick while the link is live. Replies are
//! not awaited or correlated; the heartbeat only keeps traffic flowing so a
//! dead link surfaces as a read failure.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;

use crate::connections::{ConnectionHandle, MessageKind};
use crate::loggers::Logger;
use crate::rpc;

/// Sends advisory health probes over a shared connection.
pub struct Heartbeat<C> {
    conn: Arc<C>,
    logger: Arc<dyn Logger>,
    sent: u64,
}

impl<C: ConnectionHandle> Heartbeat<C> {
    /// Creates a scheduler writing over `conn`.
    pub fn new(conn: Arc<C>, logger: Arc<dyn Logger>) -> Self {
        Self { conn, logger, sent: 0 }
    }

    /// Handles one tick. Returns the request id if a probe was written; a
    /// tick on a down link is skipped.
    pub async fn beat(&mut self) -> Option<u32> {
        if !self.conn.is_connected() {
            self.logger.debug("Link is down, skipping heartbeat", None);
            return None;
        }

        let request = rpc::system_health(rpc::heartbeat_id());
        let frame = match request.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.logger
                    .error("Failed to encode heartbeat", Some(json!({ "error": e.to_string() })));
                return None;
            }
        };

        match self.conn.write_message(MessageKind::Text, Bytes::from(frame)).await {
            Ok(()) => {
                self.sent += 1;
                self.logger.debug("Heartbeat sent", Some(json!({ "id": request.id })));
                Some(request.id)
            }
            Err(e) => {
                self.logger.warn(
                    "Heartbeat write failed",
                    Some(json!({ "id": request.id, "error": e.to_string() })),
                );
                None
            }
        }
    }

    /// Probes successfully written so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scripted::ScriptedConnection;
    use crate::loggers::memory::MemoryLogger;
    use crate::loggers::Level;

    #[tokio::test]
    async fn skips_ticks_while_down() {
        let conn = Arc::new(ScriptedConnection::new(false, None));
        let mut heartbeat = Heartbeat::new(conn.clone(), Arc::new(MemoryLogger::default()));

        assert_eq!(heartbeat.beat().await, None);
        assert_eq!(heartbeat.beat().await, None);
        assert!(conn.calls().is_empty());
        assert_eq!(heartbeat.sent(), 0);
    }

    #[tokio::test]
    async fn probes_system_health_while_live() {
        let conn = Arc::new(ScriptedConnection::new(true, None));
        let mut heartbeat = Heartbeat::new(conn.clone(), Arc::new(MemoryLogger::default()));

        let id = heartbeat.beat().await.expect("live link gets a probe");
        assert!(rpc::HEARTBEAT_IDS.contains(&id));
        assert_eq!(conn.methods(), vec!["system_health"]);
        assert_eq!(heartbeat.sent(), 1);
    }

    #[tokio::test]
    async fn write_failures_are_only_logged() {
        let conn = Arc::new(ScriptedConnection::new(true, None));
        conn.fail_writes(true);
        let logger = Arc::new(MemoryLogger::default());
        let mut heartbeat = Heartbeat::new(conn.clone(), logger.clone());

        assert_eq!(heartbeat.beat().await, None);
        assert_eq!(logger.count(Level::Warn, "Heartbeat write failed"), 1);
        assert_eq!(heartbeat.sent(), 0);
    }
}
