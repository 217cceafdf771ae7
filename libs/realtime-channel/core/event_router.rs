//! Per-type handler registry with failure isolation
//!
//! # Ordering Guarantees
//!
//! - **Registration order**: handlers for one type run in the order they
//!   were added
//! - **Arrival order**: `dispatch` is called once per inbound envelope, in the
//!   order frames arrive on the connection
//! - **Isolation**: an error or panic in one handler is reported through the
//!   diagnostic sink and the next handler still runs
//!
//! `dispatch` clones the handler list before invoking anything, so handlers
//! may register or remove handlers (including themselves) while running.

use crate::core::diagnostics::{Diagnostic, DiagnosticSink};
use crate::core::envelope::Envelope;
use crate::traits::{EventHandler, HandlerId};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

type SharedHandler = Arc<dyn EventHandler>;

/// Handler id used for the catch-all
const FALLBACK_ID: HandlerId = HandlerId(0);

pub struct EventRouter {
    routes: RwLock<HashMap<String, Vec<(HandlerId, SharedHandler)>>>,
    fallback: RwLock<Option<SharedHandler>>,
    next_id: AtomicU64,
    diagnostics: DiagnosticSink,
}

impl EventRouter {
    pub fn new(diagnostics: DiagnosticSink) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            fallback: RwLock::new(None),
            next_id: AtomicU64::new(1),
            diagnostics,
        }
    }

    /// Register a handler for `event_type`
    pub fn on(&self, event_type: impl Into<String>, handler: impl EventHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let event_type = event_type.into();
        debug!(%id, event_type = %event_type, "Registering handler");

        let handler: SharedHandler = Arc::new(handler);
        self.routes
            .write()
            .entry(event_type)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a handler; returns whether it was registered for that type
    pub fn off(&self, event_type: &str, id: HandlerId) -> bool {
        let mut routes = self.routes.write();
        let Some(handlers) = routes.get_mut(event_type) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;

        if handlers.is_empty() {
            routes.remove(event_type);
        }
        removed
    }

    /// Install the catch-all for types with no registered handler
    pub fn set_fallback(&self, handler: impl EventHandler) {
        let handler: SharedHandler = Arc::new(handler);
        *self.fallback.write() = Some(handler);
    }

    pub fn clear_fallback(&self) {
        *self.fallback.write() = None;
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.routes
            .read()
            .get(event_type)
            .map_or(0, |handlers| handlers.len())
    }

    /// Invoke every handler registered for the envelope's type
    ///
    /// Returns the number of handlers that completed without error.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let event_type = envelope.event_type();

        let handlers: Vec<(HandlerId, SharedHandler)> = match self.routes.read().get(event_type) {
            Some(handlers) => handlers.clone(),
            None => Vec::new(),
        };

        if handlers.is_empty() {
            let fallback = self.fallback.read().clone();
            return match fallback {
                Some(handler) => usize::from(self.invoke(FALLBACK_ID, &handler, envelope)),
                None => {
                    debug!(event_type, "No handler registered, ignoring");
                    0
                }
            };
        }

        let mut succeeded = 0;
        for (id, handler) in &handlers {
            if self.invoke(*id, handler, envelope) {
                succeeded += 1;
            }
        }
        succeeded
    }

    fn invoke(&self, id: HandlerId, handler: &SharedHandler, envelope: &Envelope) -> bool {
        let event_type = envelope.event_type();

        match catch_unwind(AssertUnwindSafe(|| handler.handle(envelope))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(%id, event_type, error = %e, "Handler failed");
                (self.diagnostics)(Diagnostic::HandlerFailed {
                    event_type: event_type.to_string(),
                    handler_id: id,
                    error: e.to_string(),
                });
                false
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(%id, event_type, panic = %message, "Handler panicked");
                (self.diagnostics)(Diagnostic::HandlerPanicked {
                    event_type: event_type.to_string(),
                    handler_id: id,
                    message,
                });
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
