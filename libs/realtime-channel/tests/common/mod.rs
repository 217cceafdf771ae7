//! Common test utilities for realtime channel integration tests
//!
//! `MockConnector` stands in for the network with scripted open outcomes and
//! per-connection handles; `MockWsServer` is a real loopback WebSocket server.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use realtime_channel::{
    ChannelError, ChannelEvent, Connection, ConnectionManager, Connector, Envelope, Result,
    Scope, TransportEvent, TransportWriter, WsMessage,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Notify;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// How the next `open` call behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Accept,
    AcceptAfter(Duration),
    Refuse,
    /// Never completes; only the open timeout ends it
    Hang,
}

/// Server side of one accepted mock connection
#[derive(Clone)]
pub struct MockLink {
    written: Arc<Mutex<Vec<WsMessage>>>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
    inbound: UnboundedSender<TransportEvent>,
    fail_writes: Arc<AtomicBool>,
}

impl MockLink {
    /// Types of every envelope the client wrote, in order
    pub fn written_types(&self) -> Vec<String> {
        self.written
            .lock()
            .iter()
            .filter_map(|m| Envelope::decode(m).ok())
            .map(|e| e.event_type().to_string())
            .collect()
    }

    /// Written envelope types excluding heartbeat traffic
    pub fn written_app_types(&self) -> Vec<String> {
        self.written_types()
            .into_iter()
            .filter(|t| t != "ping" && t != "pong")
            .collect()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().clone()
    }

    /// Deliver an envelope as if the server sent it
    pub fn push(&self, event_type: &str, payload: Value) {
        let frame = Envelope::new(event_type, Scope::Global, payload)
            .encode()
            .unwrap();
        let _ = self.inbound.send(TransportEvent::Message(frame));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self
            .inbound
            .send(TransportEvent::Message(WsMessage::Text(text.to_string())));
    }

    /// Simulate the server closing the connection
    pub fn server_close(&self, code: u16) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code,
            reason: "server went away".to_string(),
        });
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

struct MockWriter {
    link: MockLink,
    auto_pong: bool,
}

impl TransportWriter for MockWriter {
    fn write(&mut self, message: WsMessage) -> Result<()> {
        if self.link.fail_writes.load(Ordering::SeqCst) {
            return Err(ChannelError::TransportClosed);
        }
        if self.auto_pong {
            if let Ok(envelope) = Envelope::decode(&message) {
                if envelope.event_type() == "ping" {
                    self.link.push("pong", Value::Null);
                }
            }
        }
        self.link.written.lock().push(message);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.link.closes.lock().push((code, reason.to_string()));
    }
}

struct MockState {
    script: Mutex<VecDeque<OpenOutcome>>,
    fallback: Mutex<OpenOutcome>,
    opens: AtomicUsize,
    links: Mutex<Vec<MockLink>>,
    auto_pong: AtomicBool,
}

/// Scripted connector; clones share state
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Every open uses `fallback` once the script is exhausted
    pub fn new(fallback: OpenOutcome) -> Self {
        Self {
            state: Arc::new(MockState {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(fallback),
                opens: AtomicUsize::new(0),
                links: Mutex::new(Vec::new()),
                auto_pong: AtomicBool::new(false),
            }),
        }
    }

    pub fn accepting() -> Self {
        Self::new(OpenOutcome::Accept)
    }

    pub fn refusing() -> Self {
        Self::new(OpenOutcome::Refuse)
    }

    pub fn script(self, outcomes: impl IntoIterator<Item = OpenOutcome>) -> Self {
        self.state.script.lock().extend(outcomes);
        self
    }

    /// Answer every ping the client writes with a pong
    pub fn auto_pong(self) -> Self {
        self.state.auto_pong.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_fallback(&self, outcome: OpenOutcome) {
        *self.state.fallback.lock() = outcome;
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn link(&self, index: usize) -> MockLink {
        self.state.links.lock()[index].clone()
    }

    pub fn last_link(&self) -> MockLink {
        self.state.links.lock().last().cloned().unwrap()
    }

    pub fn link_count(&self) -> usize {
        self.state.links.lock().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _url: &str) -> Result<Connection> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .state
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| *self.state.fallback.lock());

        match outcome {
            OpenOutcome::Accept => {}
            OpenOutcome::AcceptAfter(delay) => tokio::time::sleep(delay).await,
            OpenOutcome::Refuse => {
                return Err(ChannelError::WebSocket("connection refused".to_string()))
            }
            OpenOutcome::Hang => std::future::pending::<()>().await,
        }

        let (inbound, events) = unbounded_channel();
        let link = MockLink {
            written: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(Mutex::new(Vec::new())),
            inbound,
            fail_writes: Arc::new(AtomicBool::new(false)),
        };
        self.state.links.lock().push(link.clone());

        let writer = MockWriter {
            link,
            auto_pong: self.state.auto_pong.load(Ordering::SeqCst),
        };
        Ok(Connection::new(writer, events))
    }
}

/// Let spawned tasks run without moving the clock
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Everything currently buffered on the event channel
pub fn drain_events(manager: &ConnectionManager) -> Vec<ChannelEvent> {
    std::iter::from_fn(|| manager.try_recv_event()).collect()
}

/// A loopback WebSocket server speaking the envelope protocol
///
/// Answers `ping` envelopes with `pong`, echoes every other frame and records
/// the `X-User-Id` handshake header.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    user_ids: Arc<Mutex<Vec<String>>>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();
        let user_ids = Arc::new(Mutex::new(Vec::new()));
        let user_ids_clone = user_ids.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                let user_ids = user_ids_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown, user_ids).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            user_ids,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        shutdown: Arc<Notify>,
        user_ids: Arc<Mutex<Vec<String>>>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_hdr_async;
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
        use tokio_tungstenite::tungstenite::Message;

        let record = |request: &Request,
                      response: Response|
         -> std::result::Result<Response, ErrorResponse> {
            if let Some(value) = request
                .headers()
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
            {
                user_ids.lock().push(value.to_string());
            }
            Ok(response)
        };

        let ws_stream = match accept_hdr_async(stream, record).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let is_ping = serde_json::from_str::<Value>(&text)
                                .map(|v| v["type"] == "ping")
                                .unwrap_or(false);
                            let reply = if is_ping {
                                r#"{"type":"pong","payload":null}"#.to_string()
                            } else {
                                text
                            };
                            if write.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// `X-User-Id` values seen during handshakes
    pub fn user_ids(&self) -> Vec<String> {
        self.user_ids.lock().clone()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
