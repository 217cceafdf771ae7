//! # Channel Core
//!
//! Building blocks of the connection manager: the envelope codec, the
//! outbound queue, the event router, presence tracking, the heartbeat
//! monitor and the WebSocket transport.
//!
//! ## Example
//!
//! ```rust,ignore
//! use realtime_channel::{builder, ChannelConfig, Identity, Scope};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> realtime_channel::Result<()> {
//!     let channel = builder()
//!         .url("wss://collab.example.com/realtime")
//!         .identity(Identity::new("u-42").with_token("..."))
//!         .config(ChannelConfig::default().with_reconnect_attempts(10))
//!         .build()?;
//!
//!     channel.on("file_updated", |envelope: &realtime_channel::Envelope| {
//!         println!("{:?}", envelope.payload());
//!         Ok(())
//!     });
//!
//!     channel.connect().await;
//!     channel.send("cursor_moved", Scope::file_collaborators("f-1"), json!({ "line": 3 }));
//!
//!     while let Ok(event) = channel.recv_event() {
//!         println!("Event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection_state;
pub mod diagnostics;
pub mod envelope;
pub mod event_router;
pub mod heartbeat;
pub mod outbound_queue;
pub mod pong_tracker;
pub mod presence;
pub mod ws_transport;

// Re-export main types
pub use builder::{states, ConnectionManagerBuilder};
pub use config::ChannelConfig;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use diagnostics::{Diagnostic, DiagnosticSink};
pub use envelope::{Envelope, Scope};
pub use event_router::EventRouter;
pub use heartbeat::{HeartbeatMonitor, HeartbeatTarget};
pub use outbound_queue::{DrainOutcome, OutboundQueue};
pub use pong_tracker::PongTracker;
pub use presence::{PresenceEntry, PresenceTracker};
pub use ws_transport::WsConnector;

/// Create a new connection manager builder
///
/// This is a convenience function for starting the builder pattern.
///
/// # Example
/// ```ignore
/// let channel = realtime_channel::builder()
///     .url("wss://collab.example.com/realtime")
///     .identity(Identity::new("u-42"))
///     .build()?;
/// ```
pub fn builder() -> ConnectionManagerBuilder<states::NoUrl, states::NoIdentity> {
    ConnectionManagerBuilder::new()
}
