//! Realtime connection manager.
//!
//! A single background task owns the live [`Link`], the heartbeat, the
//! pending retry and the pending manual reopen. Callers drive it through
//! [`ConnectionManager`] and observe it through a watch channel of
//! [`ConnectionState`].
//!
//! - At most one link is live; opening a new one tears down the old one first.
//! - A close schedules a retry after `policy.delay_for(attempts)` until
//!   `max_attempts` is reached, then the machine parks in `Exhausted`.
//! - A retry re-checks permission and the attempt count when it fires.
//! - After [`ConnectionManager::shutdown`] returns no handler runs again.

pub mod handlers;
pub mod state;
pub mod transport;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub use handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use state::{ConnectionOptions, ConnectionPhase, ConnectionState};
pub use transport::{Connector, Frame, Link, WsConnector};

use crate::error::ClientError;
use crate::model::{ClientFrame, ServerEvent};

enum Command {
    Connect { url: String, handlers: EventHandlers },
    ManualReconnect,
    StopReconnecting,
    Send { text: String, reply: oneshot::Sender<bool> },
    Shutdown,
}

/// Handle to the connection task. Dropping it tears the connection down.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ConnectionManager {
    /// Spawn an idle manager. Must be called inside a tokio runtime.
    pub fn new(connector: Arc<dyn Connector>, options: ConnectionOptions) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::default());
        let actor = Actor {
            connector,
            options,
            handlers: EventHandlers::default(),
            url: None,
            link: None,
            opening: None,
            retry_at: None,
            reopen_at: None,
            next_ping: None,
            state: ConnectionState::default(),
            state_tx,
        };
        let task = tokio::spawn(actor.run(command_rx));
        Self {
            commands,
            state,
            task: Some(task),
        }
    }

    /// Open a connection to `url`, replacing any existing one, with a fresh retry budget.
    pub fn connect(&self, url: impl Into<String>, handlers: EventHandlers) {
        self.command(Command::Connect {
            url: url.into(),
            handlers,
        });
    }

    /// Reset the attempt counter, re-enable auto-reconnect, and reopen shortly.
    pub fn manual_reconnect(&self) {
        self.command(Command::ManualReconnect);
    }

    /// Disable auto-reconnect and cancel a pending retry. An open link stays open.
    pub fn stop_reconnecting(&self) {
        self.command(Command::StopReconnecting);
    }

    /// Send a text frame. False if no link is open.
    pub async fn send(&self, text: impl Into<String>) -> bool {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            text: text.into(),
            reply,
        });
        rx.await.unwrap_or(false)
    }

    pub async fn send_frame(&self, frame: ClientFrame) -> bool {
        self.send(frame.to_text()).await
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Close the link, cancel every timer and detach handlers; waits for the task.
    pub async fn shutdown(&mut self) {
        self.command(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("connection task already stopped");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Actor {
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    handlers: EventHandlers,
    url: Option<String>,
    link: Option<Link>,
    opening: Option<BoxFuture<'static, Result<Link, ClientError>>>,
    retry_at: Option<Instant>,
    reopen_at: Option<Instant>,
    next_ping: Option<Instant>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_frame(link: &mut Option<Link>) -> Frame {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn opened(opening: &mut Option<BoxFuture<'static, Result<Link, ClientError>>>) -> Result<Link, ClientError> {
    match opening {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },

                result = opened(&mut self.opening) => {
                    self.opening = None;
                    match result {
                        Ok(link) => self.on_open(link),
                        Err(err) => self.on_open_failed(err),
                    }
                }

                frame = next_frame(&mut self.link) => self.on_frame(frame),

                _ = wait_until(self.next_ping) => self.heartbeat(),

                _ = wait_until(self.retry_at) => {
                    self.retry_at = None;
                    self.fire_retry();
                }

                _ = wait_until(self.reopen_at) => {
                    self.reopen_at = None;
                    self.begin_open();
                }
            }
        }

        self.teardown().await;
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { url, handlers } => {
                self.close_link("replaced by a new connection").await;
                self.cancel_timers();
                self.url = Some(url);
                self.handlers = handlers;
                self.state.reconnect_attempts = 0;
                self.state.last_error = None;
                self.state.should_reconnect = true;
                self.begin_open();
            }
            Command::ManualReconnect => {
                if self.url.is_none() {
                    tracing::warn!("manual reconnect requested before any connect");
                    return;
                }
                tracing::info!("manual reconnect requested");
                self.cancel_timers();
                self.close_link("manual reconnect").await;
                self.state.reconnect_attempts = 0;
                self.state.last_error = None;
                self.state.should_reconnect = true;
                self.state.phase = ConnectionPhase::Closed;
                self.reopen_at = Some(Instant::now() + self.options.manual_reconnect_delay);
                self.publish();
            }
            Command::StopReconnecting => {
                self.state.should_reconnect = false;
                if self.retry_at.take().is_some() {
                    tracing::info!("pending reconnect cancelled");
                }
                if matches!(self.state.phase, ConnectionPhase::Closed) && self.reopen_at.is_none() {
                    self.state.phase = ConnectionPhase::Stopped;
                }
                self.publish();
            }
            Command::Send { text, reply } => {
                let sent = self.link.as_ref().map(|link| link.send(text)).unwrap_or(false);
                if !sent {
                    tracing::warn!("dropping outbound frame: connection is not open");
                }
                let _ = reply.send(sent);
            }
            Command::Shutdown => {}
        }
    }

    fn cancel_timers(&mut self) {
        self.opening = None;
        self.retry_at = None;
        self.reopen_at = None;
        self.next_ping = None;
    }

    /// Close the live link, if any, reporting the disconnect.
    async fn close_link(&mut self, reason: &str) {
        self.next_ping = None;
        if let Some(link) = self.link.take() {
            link.close().await;
            self.state.is_connected = false;
            self.handlers.emit_disconnect(DisconnectReason::new(reason));
        }
    }

    fn begin_open(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        tracing::info!(%url, attempt = self.state.reconnect_attempts, "connecting");
        let connector = self.connector.clone();
        self.opening = Some(Box::pin(async move { connector.connect(&url).await }));
        self.state.phase = ConnectionPhase::Connecting;
        self.publish();
    }

    fn on_open(&mut self, link: Link) {
        tracing::info!("realtime connection open");
        self.link = Some(link);
        self.next_ping = Some(Instant::now() + self.options.heartbeat_interval);
        self.state.is_connected = true;
        self.state.reconnect_attempts = 0;
        self.state.last_error = None;
        self.state.phase = ConnectionPhase::Open;
        self.publish();
        self.handlers.emit_connect();
    }

    fn on_open_failed(&mut self, err: ClientError) {
        tracing::warn!(error = %err, "connection attempt failed");
        let error = ConnectionError::new(err.to_string(), true);
        self.state.last_error = Some(error.clone());
        self.handlers.emit_error(error);
        self.after_close();
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Text(text) => match ServerEvent::parse(&text) {
                Ok(event) if event.is_heartbeat() => {
                    tracing::debug!(kind = event.kind(), "heartbeat");
                }
                Ok(event) => {
                    tracing::debug!(kind = event.kind(), "event received");
                    self.handlers.emit_event(event);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "dropping undecodable frame");
                    self.handlers.emit_error(ConnectionError::new(err.to_string(), true));
                }
            },
            Frame::Closed(reason) => {
                let reason = reason.unwrap_or_else(|| "connection closed".to_string());
                tracing::info!(%reason, "realtime connection closed");
                self.link = None;
                self.next_ping = None;
                self.state.is_connected = false;
                self.handlers.emit_disconnect(DisconnectReason::new(reason.clone()));
                self.state.last_error = Some(ConnectionError::new(reason, true));
                self.after_close();
            }
        }
    }

    fn heartbeat(&mut self) {
        let alive = self
            .link
            .as_ref()
            .map(|link| link.send(ClientFrame::Ping.to_text()))
            .unwrap_or(false);
        if alive {
            tracing::debug!("ping sent");
            self.next_ping = Some(Instant::now() + self.options.heartbeat_interval);
        } else {
            self.next_ping = None;
        }
    }

    /// Decide what follows a close or a failed open.
    fn after_close(&mut self) {
        let policy = &self.options.reconnect;
        if !self.state.should_reconnect {
            self.state.phase = ConnectionPhase::Stopped;
        } else if self.state.reconnect_attempts < policy.max_attempts {
            let delay = policy.delay_for(self.state.reconnect_attempts);
            self.state.reconnect_attempts += 1;
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.state.reconnect_attempts,
                max = policy.max_attempts,
                "scheduling reconnect"
            );
            self.retry_at = Some(Instant::now() + delay);
            self.state.phase = ConnectionPhase::Closed;
        } else {
            let err = ClientError::ReconnectExhausted {
                attempts: self.state.reconnect_attempts,
            };
            tracing::error!(error = %err, "giving up on automatic reconnect");
            let error = ConnectionError::new(err.to_string(), false);
            self.state.should_reconnect = false;
            self.state.last_error = Some(error.clone());
            self.state.phase = ConnectionPhase::Exhausted;
            self.handlers.emit_error(error);
        }
        self.publish();
    }

    fn fire_retry(&mut self) {
        if self.state.should_reconnect && self.state.reconnect_attempts <= self.options.reconnect.max_attempts {
            self.begin_open();
        } else {
            tracing::debug!("scheduled reconnect skipped");
        }
    }

    async fn teardown(&mut self) {
        self.handlers = EventHandlers::default();
        self.cancel_timers();
        self.close_link("shutdown").await;
        self.state.should_reconnect = false;
        self.state.is_connected = false;
        self.state.phase = ConnectionPhase::Stopped;
        self.publish();
        tracing::debug!("connection task stopped");
    }
}
