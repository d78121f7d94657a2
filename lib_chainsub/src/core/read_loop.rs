//! # Read Loop
//!
//! The only reader of the connection. Frames go to the decoder; a failed read
//! raises the liveness alarm at most once and then parks the loop until the
//! orchestrator reports a fresh link. The loop never reads from a link that is
//! not live and never reconnects on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::decoder::{decode_isolated, DecodeOutcome, MessageDecoder};
use super::signal::{SlotReceiver, SlotSender};
use crate::connections::ConnectionHandle;
use crate::error::SubscriberError;
use crate::loggers::Logger;

/// Counters shared between the read loop and whoever spawned it.
#[derive(Debug, Default)]
pub struct ReadLoopStats {
    /// Payloads handed to the decoder.
    pub forwarded: AtomicU64,
    /// Payloads the decoder rejected or panicked on.
    pub decode_failures: AtomicU64,
    /// Failed reads, fatal or not.
    pub read_failures: AtomicU64,
    /// Alarms that reached the orchestrator.
    pub alarms_raised: AtomicU64,
    /// Alarms dropped because one was already pending.
    pub alarms_suppressed: AtomicU64,
}

impl ReadLoopStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLoopExit {
    /// The shutdown token was cancelled.
    Shutdown,
    /// The connection handle was closed underneath the loop.
    HandleClosed,
    /// The reconnect-complete signal closed; nobody will ever wake the loop.
    OrchestratorGone,
}

/// Consumes inbound frames until shutdown.
pub struct ReadLoop<C, D: ?Sized> {
    conn: Arc<C>,
    decoder: Arc<D>,
    logger: Arc<dyn Logger>,
    alarm: SlotSender<()>,
    reconnected: SlotReceiver<()>,
    shutdown: CancellationToken,
    settle_pause: Duration,
    poll_interval: Duration,
    waiting_for_reconnect: bool,
    stats: Arc<ReadLoopStats>,
}

impl<C, D> ReadLoop<C, D>
where
    C: ConnectionHandle,
    D: MessageDecoder + ?Sized,
{
    /// Wires a loop to its signals. `shutdown` is also cancelled by the loop
    /// itself when it exits, so the orchestrator learns about a dead reader.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: Arc<C>,
        decoder: Arc<D>,
        logger: Arc<dyn Logger>,
        alarm: SlotSender<()>,
        reconnected: SlotReceiver<()>,
        shutdown: CancellationToken,
        settle_pause: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            conn,
            decoder,
            logger,
            alarm,
            reconnected,
            shutdown,
            settle_pause,
            poll_interval,
            waiting_for_reconnect: false,
            stats: Arc::new(ReadLoopStats::default()),
        }
    }

    /// Shared handle on the loop's counters.
    pub fn stats(&self) -> Arc<ReadLoopStats> {
        self.stats.clone()
    }

    /// Runs until shutdown or a fatal read error. Dropping the loop closes
    /// the alarm and reconnect signals.
    pub async fn run(mut self) -> ReadLoopExit {
        let _exit_guard = self.shutdown.clone().drop_guard();
        self.logger.info("Read loop started", None);
        let exit = self.pump().await;
        self.logger
            .info("Read loop stopped", Some(json!({ "reason": format!("{:?}", exit) })));
        exit
    }

    async fn pump(&mut self) -> ReadLoopExit {
        loop {
            if self.shutdown.is_cancelled() {
                return ReadLoopExit::Shutdown;
            }

            if !self.conn.is_connected() {
                if !self.pause(self.poll_interval).await {
                    return ReadLoopExit::Shutdown;
                }
                continue;
            }

            if self.waiting_for_reconnect {
                self.waiting_for_reconnect = false;
                let released = tokio::select! {
                    _ = self.shutdown.cancelled() => return ReadLoopExit::Shutdown,
                    released = self.reconnected.recv() => released,
                };
                if released.is_none() {
                    return ReadLoopExit::OrchestratorGone;
                }
                self.logger.debug(
                    "Reconnect complete, settling before reads resume",
                    Some(json!({ "pause_ms": self.settle_pause.as_millis() as u64 })),
                );
                if !self.pause(self.settle_pause).await {
                    return ReadLoopExit::Shutdown;
                }
                continue;
            }

            let read = tokio::select! {
                _ = self.shutdown.cancelled() => return ReadLoopExit::Shutdown,
                read = self.conn.read_message() => read,
            };

            match read {
                Ok(payload) => self.forward(&payload),
                Err(e) if e.is_fatal() => {
                    ReadLoopStats::bump(&self.stats.read_failures);
                    self.logger
                        .error("Read loop cannot continue", Some(json!({ "error": e.to_string() })));
                    return ReadLoopExit::HandleClosed;
                }
                Err(e) => {
                    if !self.on_read_failure(e).await {
                        return ReadLoopExit::Shutdown;
                    }
                }
            }
        }
    }

    fn forward(&self, payload: &Bytes) {
        ReadLoopStats::bump(&self.stats.forwarded);
        match decode_isolated(self.decoder.as_ref(), payload) {
            DecodeOutcome::Decoded => {}
            DecodeOutcome::Failed(error) => {
                ReadLoopStats::bump(&self.stats.decode_failures);
                self.logger.debug(
                    "Decoder rejected payload",
                    Some(json!({ "error": error, "len": payload.len() })),
                );
            }
            DecodeOutcome::Panicked(message) => {
                ReadLoopStats::bump(&self.stats.decode_failures);
                self.logger.warn(
                    "Decoder panicked",
                    Some(json!({ "panic": message, "len": payload.len() })),
                );
            }
        }
    }

    /// Raises the alarm, or backs off when one is already pending. Returns
    /// `false` if shutdown arrived meanwhile.
    async fn on_read_failure(&mut self, error: SubscriberError) -> bool {
        ReadLoopStats::bump(&self.stats.read_failures);
        self.logger.warn("Read failed", Some(json!({ "error": error.to_string() })));

        if self.alarm.offer(()) {
            ReadLoopStats::bump(&self.stats.alarms_raised);
            self.waiting_for_reconnect = true;
            self.logger.info("Liveness alarm raised", None);
            true
        } else {
            ReadLoopStats::bump(&self.stats.alarms_suppressed);
            self.logger.debug("Liveness alarm already pending", None);
            self.pause(self.poll_interval).await
        }
    }

    /// Sleeps for `period` unless shutdown comes first.
    async fn pause(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(period) => true,
        }
    }
}
