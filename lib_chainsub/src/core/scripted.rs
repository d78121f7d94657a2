//! A scripted connection for exercising the session engine without sockets.
//!
//! Inbound frames and read failures are queued by the test. Everything the
//! engine does to the handle is journaled with a timestamp from tokio's
//! clock, so tests under paused time can assert on ordering and spacing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::configs::session_config::Timeouts;
use crate::connections::{ConnectionHandle, MessageKind};
use crate::error::SubscriberError;

type Scripted = Result<Bytes, SubscriberError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Dial(String),
    Write(MessageKind, Bytes),
    CloseAndReconnect,
    Close,
}

impl Call {
    /// The JSON-RPC method of a text write, if this is one.
    pub(crate) fn method(&self) -> Option<String> {
        match self {
            Call::Write(MessageKind::Text, payload) => {
                let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
                value["method"].as_str().map(str::to_string)
            }
            _ => None,
        }
    }
}

pub(crate) struct ScriptedConnection {
    live: AtomicBool,
    revive_after: Option<Duration>,
    revive_at: Mutex<Option<Instant>>,
    fail_writes: AtomicBool,
    keep_queue: AtomicBool,
    closed: CancellationToken,
    inbound_tx: mpsc::UnboundedSender<Scripted>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Scripted>>,
    journal: Mutex<Vec<(Instant, Call)>>,
    reads: AtomicUsize,
    reads_while_down: AtomicUsize,
}

impl ScriptedConnection {
    /// `live` is the state right after `dial`; `revive_after` is how long a
    /// down link takes to come back (`None`: never).
    pub(crate) fn new(live: bool, revive_after: Option<Duration>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let revive_at = match (live, revive_after) {
            (false, Some(after)) => Some(Instant::now() + after),
            _ => None,
        };
        Self {
            live: AtomicBool::new(live),
            revive_after,
            revive_at: Mutex::new(revive_at),
            fail_writes: AtomicBool::new(false),
            keep_queue: AtomicBool::new(false),
            closed: CancellationToken::new(),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            journal: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            reads_while_down: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, item: Scripted) {
        let _ = self.inbound_tx.send(item);
    }

    pub(crate) fn push_text(&self, text: &str) {
        self.push(Ok(Bytes::copy_from_slice(text.as_bytes())));
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Queued frames and errors survive `close_and_reconnect` instead of
    /// dying with the old link.
    pub(crate) fn keep_queue_across_reconnects(&self) {
        self.keep_queue.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<(Instant, Call)> {
        self.journal.lock().unwrap().clone()
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.calls().iter().filter_map(|(_, c)| c.method()).collect()
    }

    pub(crate) fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|(_, c)| c == wanted).count()
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn reads_while_down(&self) -> usize {
        self.reads_while_down.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push((Instant::now(), call));
    }
}

impl ConnectionHandle for ScriptedConnection {
    fn dial(&self, endpoint: &str, _timeouts: Timeouts) -> Result<(), SubscriberError> {
        self.record(Call::Dial(endpoint.to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        let mut revive_at = self.revive_at.lock().unwrap();
        if let Some(at) = *revive_at {
            if Instant::now() >= at {
                *revive_at = None;
                self.live.store(true, Ordering::SeqCst);
            }
        }
        self.live.load(Ordering::SeqCst)
    }

    async fn read_message(&self) -> Result<Bytes, SubscriberError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            self.reads_while_down.fetch_add(1, Ordering::SeqCst);
        }
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(SubscriberError::HandleClosed),
            next = inbound.recv() => next.unwrap_or(Err(SubscriberError::ClosedByPeer)),
        }
    }

    async fn write_message(&self, kind: MessageKind, payload: Bytes) -> Result<(), SubscriberError> {
        self.record(Call::Write(kind, payload));
        if self.closed.is_cancelled() {
            return Err(SubscriberError::HandleClosed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SubscriberError::NotConnected);
        }
        Ok(())
    }

    async fn close_and_reconnect(&self) {
        self.record(Call::CloseAndReconnect);
        self.live.store(false, Ordering::SeqCst);
        *self.revive_at.lock().unwrap() = self.revive_after.map(|after| Instant::now() + after);
        if self.keep_queue.load(Ordering::SeqCst) {
            return;
        }
        // Frames queued for the old link die with it.
        if let Ok(mut inbound) = self.inbound_rx.try_lock() {
            while inbound.try_recv().is_ok() {}
        }
    }

    async fn close(&self) {
        self.record(Call::Close);
        self.live.store(false, Ordering::SeqCst);
        self.closed.cancel();
    }
}
