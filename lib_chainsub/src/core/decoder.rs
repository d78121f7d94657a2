//! # Decoder Seam
//!
//! The session never looks inside a payload. It hands each frame to a
//! [`MessageDecoder`] and throws the outcome away, after making sure neither
//! an error nor a panic can escape into the read loop.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Receives every inbound payload, byte for byte.
///
/// Implementations run on the read loop's task, so they should be quick;
/// anything heavy belongs behind a channel.
pub trait MessageDecoder: Send + Sync + 'static {
    /// Consumes one raw payload. The result is only logged.
    fn decode(&self, payload: &[u8]) -> anyhow::Result<()>;
}

impl<F> MessageDecoder for F
where
    F: Fn(&[u8]) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn decode(&self, payload: &[u8]) -> anyhow::Result<()> {
        self(payload)
    }
}

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The decoder accepted the payload.
    Decoded,
    /// The decoder returned an error.
    Failed(String),
    /// The decoder panicked.
    Panicked(String),
}

/// Runs `decoder` on `payload`, converting errors and panics into an outcome.
pub fn decode_isolated<D>(decoder: &D, payload: &[u8]) -> DecodeOutcome
where
    D: MessageDecoder + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| decoder.decode(payload))) {
        Ok(Ok(())) => DecodeOutcome::Decoded,
        Ok(Err(e)) => DecodeOutcome::Failed(format!("{:#}", e)),
        Err(panic) => DecodeOutcome::Panicked(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
