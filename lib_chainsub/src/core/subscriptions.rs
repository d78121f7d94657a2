//! # Subscription Controller
//!
//! Writes the fixed subscription plan over the current link. Every write is
//! best-effort: a failure is logged and the next request is still attempted,
//! leaving the read loop to notice a dead link.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;

use crate::connections::{ConnectionHandle, MessageKind};
use crate::loggers::Logger;
use crate::rpc;

/// Issues the version query and both head subscriptions, in that order.
pub struct SubscriptionController<C> {
    conn: Arc<C>,
    logger: Arc<dyn Logger>,
    rounds: u64,
}

impl<C: ConnectionHandle> SubscriptionController<C> {
    /// Creates a controller writing over `conn`.
    pub fn new(conn: Arc<C>, logger: Arc<dyn Logger>) -> Self {
        Self {
            conn,
            logger,
            rounds: 0,
        }
    }

    /// Writes the whole plan once. Returns how many requests were accepted
    /// by the connection.
    pub async fn issue(&mut self) -> usize {
        self.rounds += 1;
        let plan = rpc::subscription_plan();
        let mut written = 0;

        for request in &plan {
            let frame = match request.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    self.logger.error(
                        "Failed to encode subscription request",
                        Some(json!({ "id": request.id, "method": request.method, "error": e.to_string() })),
                    );
                    continue;
                }
            };

            match self.conn.write_message(MessageKind::Text, Bytes::from(frame)).await {
                Ok(()) => written += 1,
                Err(e) => self.logger.error(
                    "Subscription write failed",
                    Some(json!({ "id": request.id, "method": request.method, "error": e.to_string() })),
                ),
            }
        }

        self.logger.info(
            "Subscriptions issued",
            Some(json!({ "round": self.rounds, "written": written, "planned": plan.len() })),
        );
        written
    }

    /// How many times the plan has been issued.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }
}
