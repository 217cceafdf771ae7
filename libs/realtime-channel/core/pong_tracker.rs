//! PONG Response Tracker
//!
//! Records when the last heartbeat reply arrived so the monitor can detect a
//! silent connection. A connection is considered dead once no PONG has been
//! observed for the configured timeout since the last successful heartbeat
//! (or since the tracker was started, before the first PONG).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks PONG responses for one connection
///
/// Timestamps are stored as milliseconds since an internal epoch so the hot
/// path is a single atomic store. Uses `tokio::time::Instant`, which follows
/// the paused clock in tests.
pub struct PongTracker {
    /// Start of tracking; doubles as the baseline before the first PONG
    epoch: Instant,
    /// Last PONG received (ms since epoch), 0 = none yet
    last_pong_ms: AtomicU64,
    /// PINGs sent since the tracker started
    pings_sent: AtomicU64,
    /// Wall-clock time of the last PONG, for status reporting
    last_pong_at: Mutex<Option<DateTime<Utc>>>,
    /// Silence tolerated before the connection is unhealthy
    timeout: Duration,
}

impl PongTracker {
    /// Create a tracker whose baseline is "now"
    ///
    /// # Arguments
    /// * `timeout` - Silence tolerated since the last PONG (2x heartbeat interval)
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_pong_ms: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            last_pong_at: Mutex::new(None),
            timeout,
        }
    }

    /// Record that a PING was just sent
    pub fn record_ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record that a PONG was just received
    pub fn record_pong_received(&self) {
        // +1 keeps a PONG at the exact epoch distinguishable from "none"
        let ms = self.epoch.elapsed().as_millis() as u64 + 1;
        self.last_pong_ms.store(ms, Ordering::Release);
        *self.last_pong_at.lock() = Some(Utc::now());
    }

    /// Instant of the last successful heartbeat (or the start of tracking)
    pub fn last_heartbeat(&self) -> Instant {
        match self.last_pong_ms.load(Ordering::Acquire) {
            0 => self.epoch,
            ms => self.epoch + Duration::from_millis(ms - 1),
        }
    }

    /// Point in time after which the connection counts as dead
    pub fn deadline(&self) -> Instant {
        self.last_heartbeat() + self.timeout
    }

    /// True while the last heartbeat is within the timeout
    pub fn is_healthy(&self) -> bool {
        Instant::now() < self.deadline()
    }

    /// Time since the last PONG was received
    ///
    /// Returns None if no PONG has ever been received.
    pub fn time_since_last_pong(&self) -> Option<Duration> {
        match self.last_pong_ms.load(Ordering::Acquire) {
            0 => None,
            _ => Some(self.last_heartbeat().elapsed()),
        }
    }

    pub fn last_pong_at(&self) -> Option<DateTime<Utc>> {
        *self.last_pong_at.lock()
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
