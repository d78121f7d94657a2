//! # Reconnecting WebSocket Handle
//!
//! A [`ConnectionHandle`] over tokio-tungstenite. Dialing happens in a
//! background task that retries with capped exponential backoff until a link
//! is up, so `dial` and `close_and_reconnect` never block on the network.
//!
//! The socket is split once per link: the sink and the stream sit behind
//! separate async mutexes, which lets the read loop wait on a frame while the
//! orchestrator writes. Each link owns a `CancellationToken`; cancelling it
//! wakes a blocked reader immediately.
//!
//! The handle never reconnects by itself after a failed read. Keepalive
//! expiry and peer closes surface as read errors and the session decides what
//! to do with them.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ConnectionHandle, ConnectionState, MessageKind};
use crate::configs::session_config::{Backoff, Timeouts};
use crate::error::SubscriberError;
use crate::loggers::Logger;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Where to dial and how long each operation may take. Set by `dial`.
#[derive(Debug, Clone)]
struct Target {
    url: Url,
    timeouts: Timeouts,
}

/// Shared state behind every clone of the handle and its background tasks.
struct Inner {
    backoff: Backoff,
    logger: Arc<dyn Logger>,
    target: StdMutex<Option<Target>>,
    state: watch::Sender<ConnectionState>,
    sink: Mutex<Option<WsSink>>,
    source: Mutex<Option<WsSource>>,
    /// Cancelled when the current link goes away.
    link: StdMutex<CancellationToken>,
    /// Cancelled once, by `close`.
    closed: CancellationToken,
    dialer: StdMutex<Option<JoinHandle<()>>>,
    /// Set while a read is waiting and refreshed by every inbound frame.
    waiting_since: StdMutex<Option<Instant>>,
}

/// # Reconnecting Socket
///
/// Cheap to share: wrap it in an `Arc` and hand it to a
/// [`crate::core::Session`]. Must be used from within a Tokio runtime.
pub struct ReconnectingSocket {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Accepts only `ws://` and `wss://` URLs.
fn parse_endpoint(endpoint: &str) -> Result<Url, SubscriberError> {
    let url = Url::parse(endpoint).map_err(|e| SubscriberError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(SubscriberError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Adds up to 20% random jitter so many clients do not redial in lockstep.
fn jittered(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 5) as u64;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=spread))
}

impl ReconnectingSocket {
    /// Creates an idle handle. Nothing happens on the network until `dial`.
    pub fn new(backoff: Backoff, logger: Arc<dyn Logger>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                backoff,
                logger,
                target: StdMutex::new(None),
                state,
                sink: Mutex::new(None),
                source: Mutex::new(None),
                link: StdMutex::new(CancellationToken::new()),
                closed: CancellationToken::new(),
                dialer: StdMutex::new(None),
                waiting_since: StdMutex::new(None),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }
}

impl Inner {
    fn timeouts(&self) -> Timeouts {
        lock(&self.target)
            .as_ref()
            .map(|target| target.timeouts)
            .unwrap_or_default()
    }

    fn current_link(&self) -> CancellationToken {
        lock(&self.link).clone()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            self.logger.debug(
                "Connection state changed",
                Some(json!({ "from": format!("{:?}", previous), "to": format!("{:?}", next) })),
            );
        }
    }

    fn abort_dialer(&self) {
        if let Some(task) = lock(&self.dialer).take() {
            task.abort();
        }
    }

    fn spawn_dialer(inner: &Arc<Inner>) {
        let task = tokio::spawn(Inner::connect_until_live(Arc::clone(inner)));
        if let Some(previous) = lock(&inner.dialer).replace(task) {
            previous.abort();
        }
    }

    /// Dials until a link is installed or the handle is closed.
    async fn connect_until_live(self: Arc<Self>) {
        let Some(target) = lock(&self.target).clone() else {
            return;
        };
        let mut attempt: u32 = 0;

        loop {
            if self.closed.is_cancelled() {
                return;
            }

            match timeout(target.timeouts.dial, connect_async(target.url.as_str())).await {
                Ok(Ok((stream, response))) => {
                    self.logger.info(
                        "Connected",
                        Some(json!({
                            "endpoint": target.url.as_str(),
                            "status": response.status().as_u16(),
                            "attempts": attempt + 1,
                        })),
                    );
                    self.install(stream, &target).await;
                    return;
                }
                Ok(Err(e)) => {
                    let err = SubscriberError::DialFailed(e.to_string());
                    self.logger.warn(
                        "Dial attempt failed",
                        Some(json!({ "endpoint": target.url.as_str(), "error": err.to_string() })),
                    );
                }
                Err(_) => {
                    let err = SubscriberError::DialTimeout(target.timeouts.dial);
                    self.logger.warn(
                        "Dial attempt failed",
                        Some(json!({ "endpoint": target.url.as_str(), "error": err.to_string() })),
                    );
                }
            }

            let delay = jittered(self.backoff.delay_for(attempt));
            attempt = attempt.saturating_add(1);
            tokio::select! {
                _ = self.closed.cancelled() => return,
                _ = sleep(delay) => {}
            }
        }
    }

    /// Splits a fresh stream into the shared halves and marks the handle live.
    async fn install(self: &Arc<Self>, stream: WsStream, target: &Target) {
        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);
        *self.source.lock().await = Some(source);

        let link = CancellationToken::new();
        *lock(&self.link) = link.clone();

        if self.closed.is_cancelled() {
            self.teardown().await;
            return;
        }
        self.set_state(ConnectionState::Connected);

        if let Some(period) = target.timeouts.keepalive {
            tokio::spawn(Inner::keepalive(Arc::clone(self), link, period));
        }
    }

    /// Drops the current link and releases both socket halves.
    async fn teardown(&self) {
        self.current_link().cancel();
        let write_timeout = self.timeouts().write;
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if timeout(write_timeout, sink.close()).await.is_err() {
                self.logger.debug("Sink close timed out", None);
            }
        }
        self.source.lock().await.take();
    }

    /// Pings every `period`; drops the link when a reader has been waiting
    /// longer than `period` without seeing any frame.
    async fn keepalive(self: Arc<Self>, link: CancellationToken, period: Duration) {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = link.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let silent = lock(&self.waiting_since).map(|since| since.elapsed());
            if let Some(silent) = silent.filter(|silent| *silent > period) {
                self.logger.warn(
                    "Keepalive expired, dropping link",
                    Some(json!({ "silent_ms": silent.as_millis() as u64 })),
                );
                link.cancel();
                return;
            }

            if let Err(e) = self.send(Message::Ping(Bytes::new())).await {
                self.logger
                    .debug("Keepalive ping failed", Some(json!({ "error": e.to_string() })));
            }
        }
    }

    async fn send(&self, message: Message) -> Result<(), SubscriberError> {
        if self.closed.is_cancelled() {
            return Err(SubscriberError::HandleClosed);
        }
        let write_timeout = self.timeouts().write;
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SubscriberError::NotConnected)?;
        match timeout(write_timeout, sink.send(message)).await {
            Ok(result) => result.map_err(SubscriberError::from),
            Err(_) => Err(SubscriberError::WriteTimeout(write_timeout)),
        }
    }

    fn touch(&self) {
        *lock(&self.waiting_since) = Some(Instant::now());
    }
}

/// Marks a read as in flight for the keepalive watchdog; cleared on drop so a
/// cancelled read does not count as waiting.
struct ReadWatch<'a> {
    inner: &'a Inner,
}

impl<'a> ReadWatch<'a> {
    fn start(inner: &'a Inner) -> Self {
        inner.touch();
        Self { inner }
    }
}

impl Drop for ReadWatch<'_> {
    fn drop(&mut self) {
        *lock(&self.inner.waiting_since) = None;
    }
}

impl ConnectionHandle for ReconnectingSocket {
    fn dial(&self, endpoint: &str, timeouts: Timeouts) -> Result<(), SubscriberError> {
        if self.inner.closed.is_cancelled() {
            return Err(SubscriberError::HandleClosed);
        }
        let url = parse_endpoint(endpoint)?;
        *lock(&self.inner.target) = Some(Target { url, timeouts });
        self.inner.set_state(ConnectionState::Connecting);
        Inner::spawn_dialer(&self.inner);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.inner.closed.is_cancelled() && *self.inner.state.borrow() == ConnectionState::Connected
    }

    async fn read_message(&self) -> Result<Bytes, SubscriberError> {
        let inner = &*self.inner;
        if inner.closed.is_cancelled() {
            return Err(SubscriberError::HandleClosed);
        }
        let read_timeout = inner.timeouts().read;

        let mut guard = inner.source.lock().await;
        let link = inner.current_link();
        let source = guard.as_mut().ok_or(SubscriberError::NotConnected)?;
        let _watch = ReadWatch::start(inner);

        loop {
            let next = tokio::select! {
                _ = inner.closed.cancelled() => return Err(SubscriberError::HandleClosed),
                _ = link.cancelled() => return Err(SubscriberError::LinkDropped),
                next = timeout(read_timeout, source.next()) => next,
            };

            let message = match next {
                Err(_) => return Err(SubscriberError::ReadTimeout(read_timeout)),
                Ok(None) => return Err(SubscriberError::ClosedByPeer),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(message))) => message,
            };
            inner.touch();

            match message {
                Message::Text(text) => return Ok(Bytes::copy_from_slice(text.as_str().as_bytes())),
                Message::Binary(data) => return Ok(data),
                Message::Close(_) => return Err(SubscriberError::ClosedByPeer),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn write_message(&self, kind: MessageKind, payload: Bytes) -> Result<(), SubscriberError> {
        let message = match kind {
            MessageKind::Text => Message::Text(String::from_utf8(payload.to_vec())?.into()),
            MessageKind::Binary => Message::Binary(payload),
            MessageKind::Close => Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: String::from_utf8_lossy(&payload).into_owned().into(),
            })),
        };
        self.inner.send(message).await
    }

    async fn close_and_reconnect(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        self.inner.set_state(ConnectionState::Reconnecting);
        self.inner.abort_dialer();
        self.inner.teardown().await;
        Inner::spawn_dialer(&self.inner);
    }

    async fn close(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        self.inner.closed.cancel();
        self.inner.abort_dialer();
        self.inner.teardown().await;
        self.inner.set_state(ConnectionState::Stopped);
        self.inner.logger.info("Connection closed", None);
    }

    async fn wait_until_live(&self, _poll: Duration) {
        let mut changes = self.inner.state.subscribe();
        loop {
            if *changes.borrow_and_update() == ConnectionState::Connected {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}
