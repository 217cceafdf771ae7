//! Non-fatal problems reported to the caller instead of being raised

use crate::traits::HandlerId;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A handler returned an error
    HandlerFailed {
        event_type: String,
        handler_id: HandlerId,
        error: String,
    },
    /// A handler panicked
    HandlerPanicked {
        event_type: String,
        handler_id: HandlerId,
        message: String,
    },
    /// An inbound frame could not be parsed
    MalformedFrame { error: String, length: usize },
    /// The outbound queue was full and its oldest entry was dropped
    QueueOverflow { dropped_type: String, total_dropped: u64 },
    /// A write on an open transport failed; the envelope was queued instead
    WriteFailed { event_type: String, error: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::HandlerFailed {
                event_type,
                handler_id,
                error,
            } => write!(f, "{} for '{}' failed: {}", handler_id, event_type, error),
            Diagnostic::HandlerPanicked {
                event_type,
                handler_id,
                message,
            } => write!(f, "{} for '{}' panicked: {}", handler_id, event_type, message),
            Diagnostic::MalformedFrame { error, length } => {
                write!(f, "malformed frame ({} bytes): {}", length, error)
            }
            Diagnostic::QueueOverflow {
                dropped_type,
                total_dropped,
            } => write!(
                f,
                "outbound queue full, dropped '{}' ({} total)",
                dropped_type, total_dropped
            ),
            Diagnostic::WriteFailed { event_type, error } => {
                write!(f, "write of '{}' failed: {}", event_type, error)
            }
        }
    }
}

/// Callback receiving diagnostics
pub type DiagnosticSink = Arc<dyn Fn(Diagnostic) + Send + Sync>;

/// Sink that discards everything
pub fn discard() -> DiagnosticSink {
    Arc::new(|_| {})
}
