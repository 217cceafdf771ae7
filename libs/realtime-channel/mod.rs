//! # Realtime Channel
//!
//! Resilient client for a collaboration server's realtime channel.
//!
//! ## Features
//!
//! - **Connection state machine**: `Disconnected`, `Connecting`, `Connected`, `Degraded`
//! - **Bounded reconnection**: exponential backoff with an attempt budget
//! - **Heartbeat**: ping every interval, forced close after two silent intervals
//! - **Offline queue**: bounded FIFO of outbound envelopes, drained on reconnect
//! - **Event routing**: handlers per envelope type, isolated from each other
//! - **Presence**: online set maintained from server notifications
//! - **Type-state builder**: URL and identity required at compile time

pub mod traits;
pub mod core;
pub mod manager;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use crate::core::{
    builder, config, connection_state, envelope,
    builder::{states, ConnectionManagerBuilder},
    config::ChannelConfig,
    connection_state::{ConnectionState, Metrics},
    diagnostics::Diagnostic,
    envelope::{Envelope, Scope},
    presence::PresenceEntry,
    ws_transport::WsConnector,
};

// Re-export manager
pub use manager::{ChannelEvent, ChannelStatus, ConnectionManager, Identity};

/// Type alias for Result with ChannelError
pub type Result<T> = std::result::Result<T, traits::ChannelError>;
