//! WebSocket transport over tokio-tungstenite
//!
//! ```text
//!               ┌──────────────┐  unbounded mpsc  ┌──────────────┐
//!  WsWriter ───>│ writer task  │ ───────────────> │ sink (split) │ ──> server
//!               └──────────────┘                  └──────────────┘
//!               ┌──────────────┐  unbounded mpsc
//!  server ────> │ reader task  │ ───────────────> Connection::events
//!               └──────────────┘
//! ```
//!
//! `WsWriter::write` only pushes into a channel, so it never suspends. Both
//! tasks end when the socket closes or when their channel peer is dropped.

use crate::traits::*;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Commands for the writer task
#[derive(Debug)]
enum Outgoing {
    Frame(WsMessage),
    Close { code: u16, reason: String },
}

/// Opens WebSocket connections with a fixed set of handshake headers
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    headers: HashMap<String, String>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header sent with every handshake
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Connection> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChannelError::Configuration(format!("Invalid URL '{}': {}", url, e)))?;

        for (key, value) in &self.headers {
            match (
                key.parse::<http::header::HeaderName>(),
                value.parse::<http::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => warn!("Skipping invalid header '{}'", key),
            }
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| ChannelError::WebSocket(e.to_string()))?;
        debug!("WebSocket handshake complete: {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = unbounded_channel::<Outgoing>();
        let (event_tx, event_rx) = unbounded_channel::<TransportEvent>();

        tokio::spawn(async move {
            while let Some(outgoing) = out_rx.recv().await {
                match outgoing {
                    Outgoing::Frame(message) => {
                        if let Err(e) = write.send(ws_message_to_tungstenite(message)).await {
                            debug!("WebSocket write failed: {}", e);
                            break;
                        }
                    }
                    Outgoing::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        let _ = write.close().await;
                        break;
                    }
                }
            }
            debug!("WebSocket writer task exiting");
        });

        tokio::spawn(async move {
            let closing = loop {
                match read.next().await {
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => TransportEvent::Closed {
                                code: u16::from(frame.code),
                                reason: frame.reason.to_string(),
                            },
                            None => TransportEvent::Closed {
                                code: CLOSE_NORMAL,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(msg)) => {
                        if let Some(message) = tungstenite_to_ws_message(msg) {
                            if event_tx.send(TransportEvent::Message(message)).is_err() {
                                // connection abandoned by its owner
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                    None => {
                        break TransportEvent::Closed {
                            code: 1006,
                            reason: "stream ended".to_string(),
                        }
                    }
                }
            };
            let _ = event_tx.send(closing);
            debug!("WebSocket reader task exiting");
        });

        Ok(Connection::new(WsWriter { tx: out_tx }, event_rx))
    }
}

/// Write half handed to the manager
pub struct WsWriter {
    tx: UnboundedSender<Outgoing>,
}

impl TransportWriter for WsWriter {
    fn write(&mut self, message: WsMessage) -> Result<()> {
        self.tx
            .send(Outgoing::Frame(message))
            .map_err(|_| ChannelError::TransportClosed)
    }

    fn close(&mut self, code: u16, reason: &str) {
        let _ = self.tx.send(Outgoing::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

/// Convert WsMessage to tungstenite Message
fn ws_message_to_tungstenite(msg: WsMessage) -> Message {
    match msg {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}

/// Convert tungstenite Message to WsMessage
///
/// Protocol-level ping/pong frames are answered by tungstenite itself.
fn tungstenite_to_ws_message(msg: Message) -> Option<WsMessage> {
    match msg {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}
