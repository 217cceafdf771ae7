//! Heartbeat monitor for an open connection
//!
//! # Architecture
//!
//! One dedicated Tokio task per connected transport:
//!
//! ```text
//! ┌──────────────────────────┐
//! │  Heartbeat Task          │
//! │                          │
//! │  select:                 │
//! │   every interval ────────┼──> target.send_ping()
//! │   deadline reached? ─────┼──> target.heartbeat_timed_out()  (once, then exit)
//! └──────────────────────────┘
//!          ▲
//!          │ record_pong()  (inbound task on every `pong`)
//! ```
//!
//! The deadline is `last pong + 2 * interval`, re-read on every loop turn so a
//! PONG arriving mid-wait pushes it back. The monitor is started fresh on every
//! entry into `Connected` and stopped (task aborted) on every exit, so no
//! timer outlives its connection.

use crate::core::pong_tracker::PongTracker;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, MissedTickBehavior};
use tracing::{debug, warn};

/// Receiver of heartbeat actions
pub trait HeartbeatTarget: Send + Sync + 'static {
    /// Write a ping envelope to the transport
    fn send_ping(&self);

    /// The connection has been silent past the deadline
    fn heartbeat_timed_out(&self);
}

/// Owns the heartbeat timer for one connection
pub struct HeartbeatMonitor {
    tracker: Arc<PongTracker>,
    fired: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    /// Spawn the heartbeat task
    ///
    /// The first ping goes out one `interval` after start.
    pub fn start(interval: Duration, target: impl HeartbeatTarget) -> Self {
        let tracker = Arc::new(PongTracker::new(interval * 2));
        let fired = Arc::new(AtomicBool::new(false));

        let handle = {
            let tracker = Arc::clone(&tracker);
            let fired = Arc::clone(&fired);
            tokio::spawn(async move {
                heartbeat_task(interval, tracker, fired, target).await;
            })
        };

        Self {
            tracker,
            fired,
            handle: Some(handle),
        }
    }

    /// Note a PONG from the server
    pub fn record_pong(&self) {
        self.tracker.record_pong_received();
    }

    /// Cancel the timer; idempotent
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Heartbeat monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Whether this monitor already declared its connection dead
    pub fn has_timed_out(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.tracker.last_pong_at()
    }

    pub fn tracker(&self) -> &PongTracker {
        &self.tracker
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn heartbeat_task(
    interval: Duration,
    tracker: Arc<PongTracker>,
    fired: Arc<AtomicBool>,
    target: impl HeartbeatTarget,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick - wait for the first interval
    ticker.tick().await;
    // If we miss ticks due to slow processing, skip them rather than bursting
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!("Heartbeat task started with interval: {:?}", interval);

    loop {
        let deadline = tracker.deadline();

        tokio::select! {
            _ = ticker.tick() => {
                debug!("Heartbeat tick - sending ping");
                tracker.record_ping_sent();
                target.send_ping();
            }
            _ = sleep_until(deadline) => {
                if tracker.is_healthy() {
                    // a pong moved the deadline while we slept
                    continue;
                }
                if !fired.swap(true, Ordering::AcqRel) {
                    warn!(
                        timeout = ?tracker.timeout(),
                        pings_sent = tracker.pings_sent(),
                        "No pong within heartbeat timeout"
                    );
                    target.heartbeat_timed_out();
                }
                break;
            }
        }
    }

    debug!("Heartbeat task exiting");
}
