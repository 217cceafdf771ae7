//! # Realtime Channel Traits
//!
//! Seams and shared types used throughout the channel client:
//!
//! - **Connector / TransportWriter**: open and drive one physical connection
//! - **EventHandler**: react to inbound envelopes
//! - **ReconnectPolicy**: attempt budget and exponential backoff
//! - **ChannelError**: the crate-wide error type

pub mod error;
pub mod parser;
pub mod reconnect;
pub mod router;
pub mod transport;

// Re-export commonly used types
pub use error::{ChannelError, Result};
pub use parser::WsMessage;
pub use reconnect::{ExponentialBackoff, ReconnectPolicy, ReconnectState};
pub use router::{EventHandler, HandlerId};
pub use transport::{
    Connection, Connector, TransportEvent, TransportWriter, CLOSE_HEARTBEAT_TIMEOUT, CLOSE_NORMAL,
};
