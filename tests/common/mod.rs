#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use roundtable::connection::{ConnectionState, Frame, Link};
use roundtable::{ClientError, Connector, EventHandlers};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

pub fn reserve_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

pub async fn wait_for_state<F>(rx: &mut watch::Receiver<ConnectionState>, pred: F) -> ConnectionState
where
    F: Fn(&ConnectionState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(300), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for connection state")
        .expect("connection task gone")
        .clone()
}

// Scripted transport

/// Server side of a scripted link.
pub struct Remote {
    pub to_client: mpsc::UnboundedSender<Frame>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl Remote {
    pub fn push(&self, text: &str) {
        let _ = self.to_client.send(Frame::Text(text.to_string()));
    }
}

/// Connector that refuses unless told to accept, recording when it was asked.
pub struct ScriptedConnector {
    accept: Mutex<VecDeque<bool>>,
    attempts: Mutex<Vec<Instant>>,
    delay: Mutex<Duration>,
    remotes: mpsc::UnboundedSender<Remote>,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Remote>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accept: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            remotes,
        });
        (connector, rx)
    }

    /// Queue the outcome of the next attempt. Unscripted attempts are refused.
    pub fn script(&self, accept: bool) {
        self.accept.lock().push_back(accept);
    }

    /// Make every later attempt take `delay` before it resolves.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Link, ClientError> {
        self.attempts.lock().push(Instant::now());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.accept.lock().pop_front().unwrap_or(false) {
            return Err(ClientError::Transport("connection refused".into()));
        }
        let (out_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, in_rx) = mpsc::unbounded_channel();
        let _ = self.remotes.send(Remote { to_client, from_client });
        Ok(Link::new(out_tx, in_rx, None))
    }
}

/// Handlers that append a line per callback.
pub fn recording_handlers() -> (EventHandlers, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (a, b, c, d) = (log.clone(), log.clone(), log.clone(), log.clone());
    let handlers = EventHandlers::new()
        .on_connect(move || a.lock().push("connect".to_string()))
        .on_disconnect(move |reason| b.lock().push(format!("disconnect: {}", reason.message)))
        .on_error(move |err| c.lock().push(format!("error({}): {}", err.recoverable, err.message)))
        .on_event(move |event| d.lock().push(format!("event: {}", event.kind())));
    (handlers, log)
}

// Fake backend

#[derive(Default)]
struct BackendInner {
    requests: Vec<(Method, String, Value)>,
    responses: HashMap<String, (StatusCode, Value)>,
    delays: HashMap<String, Duration>,
    pings: usize,
}

/// In-process HTTP + WebSocket backend.
#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<Mutex<BackendInner>>,
    events: broadcast::Sender<String>,
    pub addr: SocketAddr,
}

impl FakeBackend {
    pub async fn start() -> std::io::Result<Self> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let (events, _) = broadcast::channel(64);
        let backend = Self {
            inner: Arc::new(Mutex::new(BackendInner::default())),
            events,
            addr,
        };

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .fallback(api_handler)
            .with_state(backend.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(backend)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Answer `path` with `body` from now on.
    pub fn respond(&self, path: &str, body: Value) {
        self.respond_with(path, StatusCode::OK, body);
    }

    pub fn respond_with(&self, path: &str, status: StatusCode, body: Value) {
        self.inner.lock().responses.insert(path.to_string(), (status, body));
    }

    /// Hold every answer on `path` for `delay`. The request is recorded on arrival.
    pub fn delay(&self, path: &str, delay: Duration) {
        self.inner.lock().delays.insert(path.to_string(), delay);
    }

    /// Push an event to every connected client.
    pub fn broadcast(&self, event: Value) {
        let _ = self.events.send(event.to_string());
    }

    pub fn requests(&self) -> Vec<(Method, String, Value)> {
        self.inner.lock().requests.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|(_, path, _)| path).collect()
    }

    pub fn body_of(&self, path: &str) -> Option<Value> {
        self.requests()
            .into_iter()
            .find(|(_, p, _)| p == path)
            .map(|(_, _, body)| body)
    }

    pub fn pings(&self) -> usize {
        self.inner.lock().pings
    }
}

async fn api_handler(State(backend): State<FakeBackend>, method: Method, uri: Uri, body: String) -> Response {
    let path = uri.path().to_string();
    let parsed = serde_json::from_str(&body).unwrap_or(Value::Null);
    let delay = {
        let mut inner = backend.inner.lock();
        inner.requests.push((method, path.clone(), parsed));
        inner.delays.get(&path).copied()
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let inner = backend.inner.lock();
    if let Some((status, body)) = inner.responses.get(&path) {
        return (*status, Json(body.clone())).into_response();
    }
    let body = match path.as_str() {
        "/api/status" => json!({
            "discussion_started": true,
            "current_room_id": null,
            "websocket_connected": true,
            "connection_count": 1
        }),
        _ => json!({ "success": true }),
    };
    Json(body).into_response()
}

async fn ws_handler(State(backend): State<FakeBackend>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(backend, socket))
}

async fn serve_socket(backend: FakeBackend, mut socket: WebSocket) {
    let mut events = backend.events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(text) => {
                    if socket.send(WsMessage::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
                    if frame["type"] == "ping" {
                        backend.inner.lock().pings += 1;
                        let pong = json!({ "type": "pong" }).to_string();
                        if socket.send(WsMessage::Text(pong.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
