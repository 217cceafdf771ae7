//! Transport seam
//!
//! A [`Connector`] opens one physical connection per call. The returned
//! [`Connection`] splits it into a non-suspending writer and a stream of
//! inbound [`TransportEvent`]s. The manager never shares a writer and drops
//! both halves as soon as the connection is abandoned.

use crate::traits::WsMessage;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

/// Close code sent on intentional shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when the heartbeat monitor gives up on a connection
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;

/// Event emitted by an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A data frame arrived
    Message(WsMessage),
    /// The connection closed (remote close frame or end of stream)
    Closed { code: u16, reason: String },
    /// The connection failed
    Error(String),
}

/// Write half of an open transport
pub trait TransportWriter: Send + 'static {
    /// Queue a frame for transmission without suspending
    ///
    /// Fails with [`ChannelError::TransportClosed`](crate::ChannelError::TransportClosed)
    /// once the underlying connection is gone.
    fn write(&mut self, message: WsMessage) -> Result<()>;

    /// Close the connection with the given code and reason
    fn close(&mut self, code: u16, reason: &str);
}

/// One opened physical connection
pub struct Connection {
    pub writer: Box<dyn TransportWriter>,
    pub events: UnboundedReceiver<TransportEvent>,
}

impl Connection {
    pub fn new(
        writer: impl TransportWriter,
        events: UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            writer: Box::new(writer),
            events,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Factory for transports
///
/// Called once per connection attempt; a fresh transport is created every
/// time.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<Connection>;
}
