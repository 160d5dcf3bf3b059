//! Connection gateway — one persistent WebSocket to the external chat-client
//! process, multiplexing commands and responses by correlation id.
//!
//! The receive loop is the only reader. Every inbound frame is either matched
//! to a pending request, dispatched to a registered event handler, or dropped
//! with a debug note. The loop returns (without erroring) when the connection
//! closes, signalling the owner to reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use courier_types::config::GatewayConfig;
use courier_types::wire::{ChatResponse, CommandFrame, EventKind, EventPayload, ResponseFrame};

use crate::supervisor::ProcessSupervisor;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Consecutive await-response timeouts before the connection is flagged as
/// possibly corrupted.
const TIMEOUT_CORRUPTION_THRESHOLD: u32 = 3;

/// Handler for one unsolicited message kind. At most one per kind; a later
/// registration replaces an earlier one. Handler errors are logged and never
/// terminate the receive loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventPayload) -> Result<()>;
}

/// Health and drop counters, for the owning control loop.
#[derive(Debug, Clone, Copy)]
pub struct ClientStats {
    pub consecutive_timeouts: u32,
    pub late_drops: u64,
    pub possibly_corrupted: bool,
}

pub struct ChatClient {
    url: String,
    request_timeout: Duration,
    connect_attempts: u32,
    connect_delay: Duration,
    restart_grace: Duration,

    writer: Mutex<Option<WsSink>>,
    reader: Mutex<Option<WsSource>>,

    // One outstanding entry per correlation id; resolved exactly once by the
    // receive loop, consumed exactly once by the sender.
    pending: StdMutex<HashMap<String, oneshot::Sender<ResponseFrame>>>,
    handlers: StdMutex<HashMap<EventKind, Arc<dyn EventHandler>>>,

    corr_counter: AtomicU64,
    consecutive_timeouts: AtomicU32,
    late_drops: AtomicU64,
    possibly_corrupted: AtomicBool,

    supervisor: Arc<dyn ProcessSupervisor>,
}

impl ChatClient {
    pub fn new(config: &GatewayConfig, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        Self {
            url: config.url.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            connect_attempts: config.connect_attempts,
            connect_delay: Duration::from_secs(config.connect_delay_secs),
            restart_grace: Duration::from_secs(config.restart_grace_secs),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            pending: StdMutex::new(HashMap::new()),
            handlers: StdMutex::new(HashMap::new()),
            corr_counter: AtomicU64::new(0),
            consecutive_timeouts: AtomicU32::new(0),
            late_drops: AtomicU64::new(0),
            possibly_corrupted: AtomicBool::new(false),
            supervisor,
        }
    }

    /// Establish the connection, retrying up to `max_attempts` times with a
    /// fixed delay. Any previous connection is closed first.
    pub async fn connect(&self, max_attempts: u32, retry_delay: Duration) -> Result<()> {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            self.disconnect().await;
            info!(attempt, attempts, url = %self.url, "connecting to chat client");
            match connect_async(&self.url).await {
                Ok((stream, _)) => {
                    let (sink, source) = stream.split();
                    *self.writer.lock().await = Some(sink);
                    *self.reader.lock().await = Some(source);
                    info!("connected to chat client");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "connection attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }
        bail!(
            "failed to connect to {} after {} attempts",
            self.url,
            attempts
        )
    }

    /// Connect with the configured attempt budget.
    pub async fn connect_with_defaults(&self) -> Result<()> {
        self.connect(self.connect_attempts, self.connect_delay).await
    }

    /// Close the connection if open. Idempotent. Outstanding waiters are
    /// released with a null result.
    pub async fn disconnect(&self) {
        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.close().await;
            info!("disconnected from chat client");
        }
        *self.reader.lock().await = None;
        let dropped = {
            let mut pending = self.pending.lock().unwrap();
            let n = pending.len();
            pending.clear();
            n
        };
        if dropped > 0 {
            debug!(count = dropped, "released pending requests on disconnect");
        }
    }

    fn next_corr_id(&self) -> String {
        let n = self.corr_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("bot_req_{}_{}", Utc::now().timestamp(), n)
    }

    /// Send one command. With `await_response` the calling task blocks (the
    /// receive loop does not) until the correlated response arrives or the
    /// request timeout elapses; a timeout yields `Ok(None)` and retires the
    /// pending entry. Send I/O failures are returned as errors and leave
    /// other pending requests untouched.
    pub async fn send_command(
        &self,
        command: &str,
        await_response: bool,
    ) -> Result<Option<ResponseFrame>> {
        let corr_id = self.next_corr_id();
        let frame = CommandFrame {
            corr_id: corr_id.clone(),
            cmd: command.to_string(),
        };
        let text = serde_json::to_string(&frame).context("failed to serialize command frame")?;

        // Register before writing so the response cannot race the insert.
        let rx = if await_response {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().insert(corr_id.clone(), tx);
            Some(rx)
        } else {
            None
        };

        let sent = {
            let mut writer = self.writer.lock().await;
            match writer.as_mut() {
                Some(sink) => sink
                    .send(Message::Text(text.into()))
                    .await
                    .map_err(anyhow::Error::from),
                None => Err(anyhow::anyhow!("not connected to chat client")),
            }
        };
        if let Err(e) = sent {
            self.pending.lock().unwrap().remove(&corr_id);
            return Err(e).with_context(|| format!("failed to send command: {command}"));
        }
        debug!(corr_id = %corr_id, command, "command sent");

        let Some(rx) = rx else {
            return Ok(None);
        };

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => {
                self.consecutive_timeouts.store(0, Ordering::Relaxed);
                Ok(Some(response))
            }
            // Sender dropped: the connection went away while we waited.
            Ok(Err(_)) => {
                warn!(corr_id = %corr_id, command, "connection dropped while awaiting response");
                Ok(None)
            }
            Err(_) => {
                self.pending.lock().unwrap().remove(&corr_id);
                let streak = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    corr_id = %corr_id,
                    command,
                    timeout_secs = self.request_timeout.as_secs(),
                    streak,
                    "no response within request timeout"
                );
                if streak >= TIMEOUT_CORRUPTION_THRESHOLD {
                    self.possibly_corrupted.store(true, Ordering::Relaxed);
                    warn!(streak, "chat client flagged as possibly corrupted");
                }
                Ok(None)
            }
        }
    }

    /// Register (or replace) the handler for an unsolicited message kind.
    pub fn register_handler(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let previous = self.handlers.lock().unwrap().insert(kind, handler);
        debug!(%kind, replaced = previous.is_some(), "registered event handler");
    }

    /// Read frames until the connection closes. Returns `Ok(())` on close so
    /// the owner can decide to reconnect; decode failures never end the loop.
    pub async fn run_receive_loop(&self) -> Result<()> {
        let mut source = self
            .reader
            .lock()
            .await
            .take()
            .context("no connection to read from")?;
        info!("receive loop started");
        while let Some(next) = source.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "receive failed, leaving loop");
                    break;
                }
            };
            match msg {
                Message::Text(text) => match serde_json::from_str::<ResponseFrame>(&text) {
                    Ok(frame) => self.dispatch_frame(frame).await,
                    Err(e) => warn!(error = %e, "dropping undecodable frame"),
                },
                Message::Close(_) => {
                    info!("chat client closed the connection");
                    break;
                }
                _ => {}
            }
        }
        info!("receive loop ended");
        Ok(())
    }

    /// Route one inbound frame: pending request first, then event handlers.
    async fn dispatch_frame(&self, frame: ResponseFrame) {
        if !frame.corr_id.is_empty() {
            let waiter = self.pending.lock().unwrap().remove(&frame.corr_id);
            match waiter {
                Some(tx) => {
                    // The waiter may have timed out between remove and send;
                    // the frame is dropped with it.
                    let _ = tx.send(frame);
                }
                None => {
                    self.late_drops.fetch_add(1, Ordering::Relaxed);
                    debug!(corr_id = %frame.corr_id, "dropping response for retired correlation id");
                }
            }
            return;
        }

        let payload = match frame.resp {
            ChatResponse::Right(payload) => payload,
            ChatResponse::Left(err) => {
                warn!(error = %err, "chat client reported an error event");
                return;
            }
        };
        let Some(kind) = EventKind::from_type(&payload.kind) else {
            debug!(kind = %payload.kind, "no known kind for event, dropping");
            return;
        };
        let handler = self.handlers.lock().unwrap().get(&kind).cloned();
        match handler {
            Some(handler) => {
                if let Err(e) = handler.handle(payload).await {
                    warn!(%kind, error = %e, "event handler failed");
                }
            }
            None => debug!(%kind, "no handler registered, dropping event"),
        }
    }

    /// Forced recovery for an unhealthy external process: disconnect, ask the
    /// supervisor to relaunch it, wait out the grace period, reconnect.
    pub async fn restart_external_process(&self) -> Result<()> {
        warn!("restarting external chat-client process");
        self.disconnect().await;
        self.supervisor
            .restart()
            .await
            .context("process supervisor failed to restart chat client")?;
        tokio::time::sleep(self.restart_grace).await;
        self.possibly_corrupted.store(false, Ordering::Relaxed);
        self.consecutive_timeouts.store(0, Ordering::Relaxed);
        self.connect_with_defaults().await
    }

    /// Raised after repeated response timeouts; the owning control loop is
    /// responsible for calling [`restart_external_process`] — restart is
    /// disruptive and must be sequenced with in-flight work.
    ///
    /// [`restart_external_process`]: ChatClient::restart_external_process
    pub fn needs_restart(&self) -> bool {
        self.possibly_corrupted.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            consecutive_timeouts: self.consecutive_timeouts.load(Ordering::Relaxed),
            late_drops: self.late_drops.load(Ordering::Relaxed),
            possibly_corrupted: self.possibly_corrupted.load(Ordering::Relaxed),
        }
    }
}
