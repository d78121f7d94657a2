//! The daemon's decoder only reads the JSON-RPC envelope to say which request
//! or subscription a frame belongs to. Payload contents are left alone.

use lib_chainsub::rpc::{FINALIZED_HEAD_ID, HEARTBEAT_IDS, NEW_HEAD_ID, RUNTIME_VERSION_ID};
use lib_chainsub::{Logger, MessageDecoder};
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Reply to one of our requests.
    Response { id: u64, request: &'static str },
    /// Subscription push.
    Notification { method: String, subscription: String },
    /// Valid JSON without a recognizable envelope.
    Other,
}

fn request_name(id: u64) -> &'static str {
    match u32::try_from(id) {
        Ok(RUNTIME_VERSION_ID) => "runtime_version",
        Ok(NEW_HEAD_ID) => "new_head_subscription",
        Ok(FINALIZED_HEAD_ID) => "finalized_head_subscription",
        Ok(id) if HEARTBEAT_IDS.contains(&id) => "heartbeat",
        _ => "unknown",
    }
}

pub fn classify(payload: &[u8]) -> anyhow::Result<Envelope> {
    let value: Value = serde_json::from_slice(payload)?;

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        return Ok(Envelope::Response { id, request: request_name(id) });
    }

    if let Some(method) = value.get("method").and_then(Value::as_str) {
        let subscription = match value.pointer("/params/subscription") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        return Ok(Envelope::Notification { method: method.to_string(), subscription });
    }

    Ok(Envelope::Other)
}

/// Logs one line per inbound frame.
pub struct EnvelopeLogger {
    logger: Arc<dyn Logger>,
    frames: AtomicU64,
}

impl EnvelopeLogger {
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger, frames: AtomicU64::new(0) }
    }
}

impl MessageDecoder for EnvelopeLogger {
    fn decode(&self, payload: &[u8]) -> anyhow::Result<()> {
        let frame = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        match classify(payload)? {
            Envelope::Response { id, request } => {
                self.logger
                    .info("Response", Some(json!({ "frame": frame, "id": id, "request": request })));
            }
            Envelope::Notification { method, subscription } => {
                self.logger.debug(
                    "Notification",
                    Some(json!({ "frame": frame, "method": method, "subscription": subscription })),
                );
            }
            Envelope::Other => {
                self.logger
                    .debug("Frame without envelope", Some(json!({ "frame": frame, "len": payload.len() })));
            }
        }
        Ok(())
    }
}
