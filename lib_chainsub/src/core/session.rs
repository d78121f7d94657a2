//! # Session Orchestrator
//!
//! Owns the lifecycle of one subscription session: dial, wait for the first
//! link, subscribe, then arbitrate between the read loop's liveness alarm,
//! the heartbeat timer and the external stop request until one of them ends
//! the session.
//!
//! The orchestrator is the only component that reconnects. The read loop
//! reports a dead link through the single-slot alarm and parks until the
//! orchestrator has redialed and re-subscribed.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::decoder::MessageDecoder;
use super::heartbeat::Heartbeat;
use super::read_loop::{ReadLoop, ReadLoopStats};
use super::signal::{single_slot, SlotSender};
use super::subscriptions::SubscriptionController;
use crate::configs::session_config::SessionConfig;
use crate::connections::{ConnectionHandle, MessageKind};
use crate::error::SubscriberError;
use crate::loggers::Logger;

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Dialed, waiting for the first live link.
    Connecting,
    /// Subscribed; reading, beating and watching for alarms.
    Running,
    /// Handling a liveness alarm.
    Reconnecting,
    /// Stop sequence in progress.
    Stopping,
    /// Done.
    Stopped,
}

/// Why [`Session::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The external stop request was received.
    StopRequested,
    /// The read loop ended on its own, for example because the handle was
    /// closed by someone else.
    ReadLoopEnded,
}

/// Counters collected over a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Reconnect cycles started by liveness alarms.
    pub reconnect_cycles: u64,
    /// Times the subscription plan was issued.
    pub subscription_rounds: u64,
    /// Heartbeats written.
    pub heartbeats_sent: u64,
    /// Payloads handed to the decoder.
    pub messages_forwarded: u64,
    /// Payloads the decoder rejected or panicked on.
    pub decode_failures: u64,
    /// Failed reads.
    pub read_failures: u64,
    /// Alarms that reached the orchestrator.
    pub alarms_raised: u64,
    /// Alarms dropped because one was already pending.
    pub alarms_suppressed: u64,
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Why the session ended.
    pub exit: SessionExit,
    /// What happened along the way.
    pub stats: SessionStats,
}

/// A subscription session over a shared connection handle.
pub struct Session<C, D> {
    conn: Arc<C>,
    decoder: Arc<D>,
    config: SessionConfig,
    logger: Arc<dyn Logger>,
    subscriptions: SubscriptionController<C>,
    heartbeat: Heartbeat<C>,
    state: watch::Sender<SessionState>,
    reconnect_cycles: u64,
}

impl<C, D> Session<C, D>
where
    C: ConnectionHandle,
    D: MessageDecoder,
{
    /// Builds a session. Nothing touches the network until [`Session::run`].
    pub fn new(conn: Arc<C>, decoder: D, config: SessionConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            subscriptions: SubscriptionController::new(conn.clone(), logger.clone()),
            heartbeat: Heartbeat::new(conn.clone(), logger.clone()),
            conn,
            decoder: Arc::new(decoder),
            config,
            logger,
            state: watch::Sender::new(SessionState::Connecting),
            reconnect_cycles: 0,
        }
    }

    /// Observes state transitions; usable before and during `run`.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            self.logger.info(
                &format!("Session state: {:?} -> {:?}", previous, next),
                None,
            );
        }
    }

    /// Runs the session until `stop` fires (a message or a closed sender) or
    /// the read loop ends. Fails only if the configuration is unusable or the
    /// endpoint is rejected by `dial`; nothing is dialed in either case.
    pub async fn run(
        mut self,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<SessionReport, SubscriberError> {
        self.config.validate()?;
        self.conn.dial(&self.config.endpoint, self.config.timeouts)?;
        self.logger
            .info("Session started", Some(json!({ "endpoint": self.config.endpoint })));

        let shutdown = CancellationToken::new();
        let read_stats;

        let live = tokio::select! {
            _ = stop.recv() => false,
            _ = self.conn.wait_until_live(self.config.live_poll_interval) => true,
        };

        let exit = if !live {
            self.logger.info("Stop requested before the first link came up", None);
            read_stats = Arc::new(ReadLoopStats::default());
            self.stop_sequence(&shutdown).await;
            SessionExit::StopRequested
        } else {
            self.subscriptions.issue().await;

            let (alarm_tx, mut alarms) = single_slot();
            let (reconnected, reconnected_rx) = single_slot();
            let read_loop = ReadLoop::new(
                self.conn.clone(),
                self.decoder.clone(),
                self.logger.clone(),
                alarm_tx,
                reconnected_rx,
                shutdown.clone(),
                self.config.settle_pause,
                self.config.live_poll_interval,
            );
            read_stats = read_loop.stats();
            let reader = tokio::spawn(read_loop.run());

            let period = self.config.heartbeat_interval;
            let mut heartbeat = interval_at(Instant::now() + period, period);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.transition(SessionState::Running);

            let exit = loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break SessionExit::ReadLoopEnded,
                    _ = stop.recv() => break SessionExit::StopRequested,
                    alarm = alarms.recv() => match alarm {
                        Some(()) => {
                            if !self.reconnect(&mut stop, &reconnected).await {
                                break SessionExit::StopRequested;
                            }
                        }
                        None => break SessionExit::ReadLoopEnded,
                    },
                    _ = heartbeat.tick() => {
                        self.heartbeat.beat().await;
                    }
                }
            };

            match exit {
                SessionExit::StopRequested => self.stop_sequence(&shutdown).await,
                SessionExit::ReadLoopEnded => {
                    self.logger.warn("Read loop ended, closing session", None);
                    shutdown.cancel();
                    self.conn.close().await;
                    self.transition(SessionState::Stopped);
                }
            }

            if let Err(e) = reader.await {
                self.logger
                    .error("Read loop task failed", Some(json!({ "error": e.to_string() })));
            }
            exit
        };

        let stats = SessionStats {
            reconnect_cycles: self.reconnect_cycles,
            subscription_rounds: self.subscriptions.rounds(),
            heartbeats_sent: self.heartbeat.sent(),
            messages_forwarded: read_stats.forwarded.load(Ordering::Relaxed),
            decode_failures: read_stats.decode_failures.load(Ordering::Relaxed),
            read_failures: read_stats.read_failures.load(Ordering::Relaxed),
            alarms_raised: read_stats.alarms_raised.load(Ordering::Relaxed),
            alarms_suppressed: read_stats.alarms_suppressed.load(Ordering::Relaxed),
        };
        self.logger.info(
            "Session finished",
            Some(json!({ "exit": format!("{:?}", exit), "reconnects": stats.reconnect_cycles })),
        );
        Ok(SessionReport { exit, stats })
    }

    /// One reconnect cycle. Returns `false` if stop arrived while waiting for
    /// the new link.
    async fn reconnect(
        &mut self,
        stop: &mut broadcast::Receiver<()>,
        reconnected: &SlotSender<()>,
    ) -> bool {
        self.transition(SessionState::Reconnecting);
        self.reconnect_cycles += 1;
        self.logger.warn(
            "Liveness alarm received, reconnecting",
            Some(json!({ "cycle": self.reconnect_cycles })),
        );

        self.conn.close_and_reconnect().await;
        let live = tokio::select! {
            _ = stop.recv() => false,
            _ = self.conn.wait_until_live(self.config.live_poll_interval) => true,
        };
        if !live {
            return false;
        }

        self.subscriptions.issue().await;
        if !reconnected.offer(()) {
            self.logger.debug("Read loop was not waiting for the reconnect signal", None);
        }
        self.transition(SessionState::Running);
        true
    }

    /// Cancels the read loop, sends a close frame if a link is up and closes
    /// the handle. Nothing is written after this starts.
    async fn stop_sequence(&self, shutdown: &CancellationToken) {
        self.transition(SessionState::Stopping);
        shutdown.cancel();

        if self.conn.is_connected() {
            if let Err(e) = self.conn.write_message(MessageKind::Close, Bytes::new()).await {
                self.logger
                    .error("Failed to send close frame", Some(json!({ "error": e.to_string() })));
            }
        }
        self.conn.close().await;
        self.transition(SessionState::Stopped);
    }
}
