use crate::core::connection_state::{AtomicMetrics, ConnectionState, Metrics};
use crate::core::diagnostics::Diagnostic;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle notifications published on the manager's event channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Transport opened; queued envelopes have been drained
    Connected,
    /// The active transport was lost or closed
    Disconnected { reason: String },
    /// A reconnection attempt is scheduled
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnect budget exhausted; the manager is now `Degraded`
    ConnectionFailed { attempts: u32 },
    /// The heartbeat monitor gave up on the connection
    HeartbeatTimeout,
    /// A non-fatal problem (handler failure, malformed frame, overflow)
    Diagnostic(Diagnostic),
}

/// Bounded lifecycle event channel shared by every manager handle
///
/// When full, the oldest pending event is discarded to make room and counted
/// in `Metrics::events_dropped`.
pub(crate) struct EventBuffer {
    tx: Sender<ChannelEvent>,
    rx: Receiver<ChannelEvent>,
    metrics: Arc<AtomicMetrics>,
}

impl EventBuffer {
    pub(crate) fn new(capacity: usize, metrics: Arc<AtomicMetrics>) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx, metrics }
    }

    pub(crate) fn publish(&self, event: ChannelEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.rx.try_recv().is_ok() {
                        self.metrics.increment_events_dropped();
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<ChannelEvent> {
        &self.rx
    }
}

/// Pre-established identity of the local session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Read-only snapshot for observability and offline-mode decisions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub state: ConnectionState,
    pub reconnect_attempts_remaining: u32,
    pub queued_count: usize,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub identity: String,
    pub metrics: Metrics,
}

impl ChannelStatus {
    /// Realtime features should be offered to the user
    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
