//! Inbound event handlers
//!
//! Handlers are registered per envelope type on the
//! [`EventRouter`](crate::core::event_router::EventRouter) and invoked
//! synchronously, in registration order, from the connection's inbound task.
//!
//! ```text
//! Transport → Envelope decode → ping/pong? → Presence? → EventRouter
//!                                                            ↓
//!                                              "comment_added" → [h1, h2, h3]
//!                                              "user_online"   → [h4]
//!                                              <unrouted>      → fallback?
//! ```
//!
//! Any closure `Fn(&Envelope) -> Result<()>` is a handler.

use crate::core::envelope::Envelope;
use crate::Result;
use std::fmt;

/// Identifier returned when a handler is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Handler invoked for each inbound envelope of the type it is registered for
///
/// **Important**: handlers run inline on the inbound task. They may call back
/// into the manager (`send`, `on`, `off`, `close`, `status`) but should not
/// block for long, since the next frame waits for them.
///
/// # Errors
/// A returned error (or a panic) is reported as a diagnostic and does not
/// stop the remaining handlers for the same envelope.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, envelope: &Envelope) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Envelope) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, envelope: &Envelope) -> Result<()> {
        self(envelope)
    }
}
