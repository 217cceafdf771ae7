use crate::core::config::ChannelConfig;
use crate::core::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::core::diagnostics::{Diagnostic, DiagnosticSink};
use crate::core::envelope::{Envelope, Scope, CONNECTION_FAILED, PING, PONG};
use crate::core::event_router::EventRouter;
use crate::core::heartbeat::{HeartbeatMonitor, HeartbeatTarget};
use crate::core::outbound_queue::OutboundQueue;
use crate::core::presence::PresenceTracker;
use crate::manager::events::{ChannelEvent, ChannelStatus, EventBuffer, Identity};
use crate::traits::*;
use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Resilient realtime channel for one logical session
///
/// Owns the connection state machine and every timer attached to it:
///
/// ```text
/// Disconnected ──connect()──> Connecting ──open ok──> Connected
///                                 ▲  │                   │
///                     retry timer │  │ open failed       │ close / error / heartbeat timeout
///                                 │  ▼                   ▼
///                             (attempts left) <──────────┘
///                                    │
///                             (budget spent) ──> Degraded ──connect()──> Connecting
///
/// close() from any state ──> Disconnected
/// ```
///
/// All state transitions happen under one session lock. Handlers run on the
/// connection's inbound task with that lock released, so they may call back
/// into the manager.
///
/// Cloning is cheap and yields another handle to the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    identity: Identity,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    state: AtomicConnectionState,
    metrics: Arc<AtomicMetrics>,
    session: Mutex<Session>,
    router: EventRouter,
    presence: PresenceTracker,
    events: Arc<EventBuffer>,
}

/// Everything guarded by the session lock
struct Session {
    /// Bumped whenever a transport is opened or abandoned; events and timers
    /// carrying an older value are ignored
    generation: u64,
    writer: Option<Box<dyn TransportWriter>>,
    heartbeat: Option<HeartbeatMonitor>,
    inbound_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    policy: ReconnectPolicy,
    queue: OutboundQueue,
    last_heartbeat_at: Option<DateTime<Utc>>,
    failure_reported: bool,
}

impl Session {
    /// Stop the heartbeat, detach the inbound task and close the writer
    fn teardown(&mut self, code: u16, reason: &str) {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        if let Some(task) = self.inbound_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            writer.close(code, reason);
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
            debug!("Pending reconnect cancelled");
        }
    }
}

/// What the caller of `schedule_recovery` still has to do once unlocked
enum Recovery {
    Retrying,
    Exhausted { attempts: u32 },
    AlreadyReported,
}

impl ConnectionManager {
    pub(crate) fn new(
        url: String,
        identity: Identity,
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(AtomicMetrics::new());
        let events = Arc::new(EventBuffer::new(
            config.event_buffer_capacity,
            Arc::clone(&metrics),
        ));
        let diagnostics: DiagnosticSink = {
            let events = Arc::clone(&events);
            Arc::new(move |diagnostic: Diagnostic| {
                events.publish(ChannelEvent::Diagnostic(diagnostic));
            })
        };

        let session = Session {
            generation: 0,
            writer: None,
            heartbeat: None,
            inbound_task: None,
            reconnect_timer: None,
            policy: config.reconnect_policy(),
            queue: OutboundQueue::new(config.outbound_queue_capacity),
            last_heartbeat_at: None,
            failure_reported: false,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                url,
                identity,
                config,
                connector,
                state: AtomicConnectionState::new(ConnectionState::Disconnected),
                metrics,
                session: Mutex::new(session),
                router: EventRouter::new(diagnostics),
                presence: PresenceTracker::new(),
                events,
            }),
        })
    }

    /// Open the transport unless already connected or connecting
    ///
    /// Suspends until the attempt succeeds, fails or hits `open_timeout`, and
    /// returns the resulting state: `Connected`, `Connecting` (a retry is
    /// scheduled) or `Degraded`. Calling it while `Connecting` or `Connected`
    /// returns immediately without opening anything. Calling it from
    /// `Degraded` or `Disconnected` restores the full reconnect budget.
    pub async fn connect(&self) -> ConnectionState {
        let generation = {
            let mut session = self.inner.session.lock();
            match self.inner.state.get() {
                state @ (ConnectionState::Connecting | ConnectionState::Connected) => {
                    debug!(%state, "connect() ignored");
                    return state;
                }
                ConnectionState::Disconnected | ConnectionState::Degraded => {
                    session.policy.reset();
                    session.failure_reported = false;
                }
            }
            session.cancel_reconnect();
            session.generation += 1;
            self.inner.state.set(ConnectionState::Connecting);
            session.generation
        };

        open_attempt(Arc::clone(&self.inner), generation).await
    }

    /// Build and send an envelope
    pub fn send(&self, event_type: impl Into<String>, scope: Scope, payload: Value) {
        self.send_envelope(Envelope::new(event_type, scope, payload));
    }

    /// Write the envelope now if connected, otherwise queue it
    ///
    /// Never blocks and never fails; delivery is not confirmed.
    pub fn send_envelope(&self, envelope: Envelope) {
        self.inner.send(envelope);
    }

    /// Register a handler for an inbound envelope type
    pub fn on(&self, event_type: impl Into<String>, handler: impl EventHandler) -> HandlerId {
        self.inner.router.on(event_type, handler)
    }

    /// Unregister a handler; returns whether it was registered
    pub fn off(&self, event_type: &str, id: HandlerId) -> bool {
        self.inner.router.off(event_type, id)
    }

    /// Install a catch-all for types nobody registered for
    pub fn on_unrouted(&self, handler: impl EventHandler) {
        self.inner.router.set_fallback(handler);
    }

    pub fn clear_unrouted(&self) {
        self.inner.router.clear_fallback();
    }

    /// Intentional shutdown from any state
    ///
    /// Cancels the heartbeat and any pending reconnect before returning and
    /// closes the transport with code 1000. Queued envelopes are kept for a
    /// later `connect()`.
    pub fn close(&self) {
        let mut session = self.inner.session.lock();
        session.cancel_reconnect();
        session.teardown(CLOSE_NORMAL, "client closed");
        session.generation += 1;

        let previous = self.inner.state.get();
        self.inner.state.set(ConnectionState::Disconnected);

        if previous != ConnectionState::Disconnected {
            info!(%previous, "Channel closed by client");
            self.inner.emit(ChannelEvent::Disconnected {
                reason: "closed by client".to_string(),
            });
        }
    }

    /// Snapshot for observability and offline-mode UI
    pub fn status(&self) -> ChannelStatus {
        let session = self.inner.session.lock();
        ChannelStatus {
            state: self.inner.state.get(),
            reconnect_attempts_remaining: session.policy.attempts_remaining(),
            queued_count: session.queue.len(),
            last_heartbeat_at: session.last_heartbeat_at,
            identity: self.inner.identity.user_id.clone(),
            metrics: self.inner.metrics.snapshot(),
        }
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    /// Lifecycle event channel (shared by all handles)
    ///
    /// Holds at most `event_buffer_capacity` pending events; older ones are
    /// discarded when nobody drains it.
    pub fn events(&self) -> Receiver<ChannelEvent> {
        self.inner.events.receiver().clone()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ChannelEvent> {
        self.inner.events.receiver().try_recv().ok()
    }

    /// Receive an event (blocking)
    pub fn recv_event(&self) -> std::result::Result<ChannelEvent, crossbeam_channel::RecvError> {
        self.inner.events.receiver().recv()
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.inner.presence.is_online(identity)
    }

    pub fn online_count(&self) -> usize {
        self.inner.presence.online_count()
    }

    pub fn online_identities(&self) -> Vec<String> {
        self.inner.presence.online_identities()
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.inner.router.handler_count(event_type)
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.url)
            .field("identity", &self.inner.identity.user_id)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

/// One transport open attempt for `generation`
///
/// Boxed because a failed attempt schedules a timer task that runs this
/// function again.
fn open_attempt(inner: Arc<Inner>, generation: u64) -> BoxFuture<'static, ConnectionState> {
    async move {
        if !inner.is_attempt_current(generation) {
            return inner.state.get();
        }

        inner.metrics.increment_attempts();
        debug!(url = %inner.url, generation, "Opening transport");

        let result = match tokio::time::timeout(
            inner.config.open_timeout,
            inner.connector.open(&inner.url),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(format!(
                "open did not complete within {:?}",
                inner.config.open_timeout
            ))),
        };

        let recovery = {
            let mut session = inner.session.lock();

            if session.generation != generation || !inner.state.is_connecting() {
                debug!(generation, "Open attempt superseded, discarding");
                if let Ok(mut connection) = result {
                    connection.writer.close(CLOSE_NORMAL, "superseded");
                }
                return inner.state.get();
            }

            match result {
                Ok(connection) => {
                    inner.on_open(&mut session, connection, generation);
                    None
                }
                Err(e) => {
                    warn!(url = %inner.url, error = %e, "Transport open failed");
                    Some(inner.schedule_recovery(&mut session))
                }
            }
        };

        if let Some(recovery) = recovery {
            inner.finish_recovery(recovery);
        }
        inner.state.get()
    }
    .boxed()
}

/// Pump transport events for one connection generation
async fn inbound_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut events: UnboundedReceiver<TransportEvent>,
) {
    let reason = loop {
        match events.recv().await {
            Some(TransportEvent::Message(message)) => match inner.upgrade() {
                Some(inner) => inner.on_frame(generation, message),
                None => return,
            },
            Some(TransportEvent::Closed { code, reason }) => {
                break format!("closed by server ({}): {}", code, reason);
            }
            Some(TransportEvent::Error(e)) => break format!("transport error: {}", e),
            None => break "transport event stream ended".to_string(),
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.on_transport_lost(generation, reason);
    }
}

/// Heartbeat target bound to one connection generation
struct HeartbeatProbe {
    inner: Weak<Inner>,
    generation: u64,
}

impl HeartbeatTarget for HeartbeatProbe {
    fn send_ping(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.write_current(self.generation, &Envelope::ping());
        }
    }

    fn heartbeat_timed_out(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_heartbeat_timeout(self.generation);
        }
    }
}

impl Inner {
    fn emit(&self, event: ChannelEvent) {
        self.events.publish(event);
    }

    fn report(&self, diagnostic: Diagnostic) {
        self.emit(ChannelEvent::Diagnostic(diagnostic));
    }

    fn is_attempt_current(&self, generation: u64) -> bool {
        self.session.lock().generation == generation && self.state.is_connecting()
    }

    fn is_connection_current(&self, session: &Session, generation: u64) -> bool {
        session.generation == generation && self.state.is_connected()
    }

    /// Transport opened: enter `Connected`, start the heartbeat, drain the queue
    fn on_open(self: &Arc<Self>, session: &mut Session, connection: Connection, generation: u64) {
        let Connection { writer, events } = connection;

        session.writer = Some(writer);
        session.reconnect_timer = None;
        session.policy.reset();
        session.failure_reported = false;
        self.state.set(ConnectionState::Connected);

        session.heartbeat = Some(HeartbeatMonitor::start(
            self.config.heartbeat_interval,
            HeartbeatProbe {
                inner: Arc::downgrade(self),
                generation,
            },
        ));
        session.inbound_task = Some(tokio::spawn(inbound_loop(
            Arc::downgrade(self),
            generation,
            events,
        )));

        let drained = self.drain_queue(session);
        info!(
            url = %self.url,
            identity = %self.identity.user_id,
            drained,
            still_queued = session.queue.len(),
            "Connected"
        );
        self.emit(ChannelEvent::Connected);
    }

    fn drain_queue(&self, session: &mut Session) -> usize {
        let Session { queue, writer, .. } = session;
        let Some(writer) = writer.as_mut() else {
            return 0;
        };

        let outcome = queue.drain_into(&mut **writer);
        for _ in 0..outcome.written {
            self.metrics.increment_sent();
        }
        self.metrics.add_dropped(outcome.discarded as u64);
        outcome.written
    }

    fn send(&self, envelope: Envelope) {
        let mut session = self.session.lock();

        if self.state.is_connected() && session.writer.is_some() {
            if session.queue.is_empty() {
                match self.write_envelope(&mut session, &envelope) {
                    Ok(()) => return,
                    Err(e) => self.report(Diagnostic::WriteFailed {
                        event_type: envelope.event_type().to_string(),
                        error: e.to_string(),
                    }),
                }
            } else {
                // keep FIFO behind an interrupted drain
                self.enqueue(&mut session, envelope);
                self.drain_queue(&mut session);
                return;
            }
        }

        self.enqueue(&mut session, envelope);
    }

    fn enqueue(&self, session: &mut Session, envelope: Envelope) {
        debug!(event_type = envelope.event_type(), "Queueing envelope");
        if let Some(evicted) = session.queue.enqueue(envelope) {
            self.metrics.add_dropped(1);
            warn!(
                dropped_type = evicted.event_type(),
                capacity = session.queue.capacity(),
                "Outbound queue full, dropped oldest envelope"
            );
            self.report(Diagnostic::QueueOverflow {
                dropped_type: evicted.event_type().to_string(),
                total_dropped: session.queue.dropped_count(),
            });
        }
    }

    fn write_envelope(&self, session: &mut Session, envelope: &Envelope) -> Result<()> {
        let writer = session.writer.as_mut().ok_or(ChannelError::TransportClosed)?;
        writer.write(envelope.encode()?)?;
        self.metrics.increment_sent();
        Ok(())
    }

    /// Write a control envelope if `generation` is still the live connection
    fn write_current(&self, generation: u64, envelope: &Envelope) {
        let mut session = self.session.lock();
        if !self.is_connection_current(&session, generation) {
            return;
        }
        if let Err(e) = self.write_envelope(&mut session, envelope) {
            debug!(event_type = envelope.event_type(), error = %e, "Control write failed");
        }
    }

    fn on_frame(&self, generation: u64, message: WsMessage) {
        {
            let session = self.session.lock();
            if !self.is_connection_current(&session, generation) {
                debug!(generation, "Dropping frame from stale transport");
                return;
            }
        }
        self.metrics.increment_received();

        let envelope = match Envelope::decode(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(length = message.len(), error = %e, "Dropping malformed frame");
                self.report(Diagnostic::MalformedFrame {
                    error: e.to_string(),
                    length: message.len(),
                });
                return;
            }
        };

        match envelope.event_type() {
            PONG => {
                let mut session = self.session.lock();
                if self.is_connection_current(&session, generation) {
                    if let Some(heartbeat) = &session.heartbeat {
                        heartbeat.record_pong();
                    }
                    session.last_heartbeat_at = Some(Utc::now());
                }
                return;
            }
            PING => {
                self.write_current(generation, &Envelope::pong());
                return;
            }
            _ => {}
        }

        if PresenceTracker::is_presence_type(envelope.event_type()) {
            self.presence.apply(&envelope);
        }
        self.router.dispatch(&envelope);
    }

    fn on_transport_lost(self: &Arc<Self>, generation: u64, reason: String) {
        let recovery = {
            let mut session = self.session.lock();
            if !self.is_connection_current(&session, generation) {
                return;
            }

            warn!(url = %self.url, %reason, "Connection lost");
            session.teardown(CLOSE_NORMAL, "connection lost");
            session.generation += 1;
            self.emit(ChannelEvent::Disconnected { reason });
            self.schedule_recovery(&mut session)
        };
        self.finish_recovery(recovery);
    }

    fn on_heartbeat_timeout(self: &Arc<Self>, generation: u64) {
        let recovery = {
            let mut session = self.session.lock();
            if !self.is_connection_current(&session, generation) {
                return;
            }

            warn!(url = %self.url, "Heartbeat timeout, forcing transport closed");
            session.teardown(CLOSE_HEARTBEAT_TIMEOUT, "heartbeat timeout");
            session.generation += 1;
            self.emit(ChannelEvent::HeartbeatTimeout);
            self.emit(ChannelEvent::Disconnected {
                reason: "heartbeat timeout".to_string(),
            });
            self.schedule_recovery(&mut session)
        };
        self.finish_recovery(recovery);
    }

    /// Claim the next reconnect attempt or enter `Degraded`
    fn schedule_recovery(self: &Arc<Self>, session: &mut Session) -> Recovery {
        let Some(delay) = session.policy.next_attempt() else {
            self.state.set(ConnectionState::Degraded);
            if session.failure_reported {
                return Recovery::AlreadyReported;
            }
            session.failure_reported = true;

            let attempts = session.policy.max_attempts();
            self.emit(ChannelEvent::ConnectionFailed { attempts });
            return Recovery::Exhausted { attempts };
        };

        let attempt = session.policy.attempts_made();
        session.generation += 1;
        let generation = session.generation;
        self.state.set(ConnectionState::Connecting);

        info!(
            attempt,
            remaining = session.policy.attempts_remaining(),
            "Reconnecting in {:?}",
            delay
        );

        let weak = Arc::downgrade(self);
        session.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.metrics.increment_reconnects();
                open_attempt(inner, generation).await;
            }
        }));

        self.emit(ChannelEvent::Reconnecting { attempt, delay });
        Recovery::Retrying
    }

    /// Work that must run without the session lock held
    fn finish_recovery(&self, recovery: Recovery) {
        if let Recovery::Exhausted { attempts } = recovery {
            error!(
                url = %self.url,
                attempts,
                "Reconnection failed, channel degraded"
            );
            let failed = Envelope::unscoped(CONNECTION_FAILED, json!({ "attempts": attempts }));
            self.router.dispatch(&failed);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        session.cancel_reconnect();
        session.teardown(CLOSE_NORMAL, "client dropped");
    }
}
