//! # Connection Manager
//!
//! Session-level orchestrator: owns the transport, drives reconnection,
//! feeds the router and presence tracker, and publishes lifecycle events.

pub mod events;
pub mod manager;

pub use events::{ChannelEvent, ChannelStatus, Identity};
pub use manager::ConnectionManager;
