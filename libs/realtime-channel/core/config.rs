use crate::traits::{ChannelError, ExponentialBackoff, ReconnectPolicy, Result};
use std::time::Duration;

/// Tunables for one channel session
///
/// All fields are optional at the builder level; `Default` carries the
/// canonical values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Interval between heartbeat pings while connected
    pub heartbeat_interval: Duration,

    /// Reconnection attempts after a failure before giving up
    pub reconnect_attempts: u32,

    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,

    /// Upper bound for the backoff delay
    pub max_delay: Duration,

    /// How long a single open attempt may take
    pub open_timeout: Duration,

    /// Envelopes kept while disconnected; oldest dropped beyond this
    pub outbound_queue_capacity: usize,

    /// Lifecycle events retained for `events()`; oldest dropped beyond this
    pub event_buffer_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            open_timeout: Duration::from_secs(10),
            outbound_queue_capacity: 1000,
            event_buffer_capacity: 1024,
        }
    }
}

impl ChannelConfig {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    /// Heartbeat silence tolerated before a connection is declared dead
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    /// Fresh reconnect policy for these settings
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            ExponentialBackoff::new(self.initial_delay, self.max_delay),
            self.reconnect_attempts,
        )
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(ChannelError::Configuration(
                "heartbeat_interval must be greater than 0".to_string(),
            ));
        }

        if self.open_timeout.is_zero() {
            return Err(ChannelError::Configuration(
                "open_timeout must be greater than 0".to_string(),
            ));
        }

        if self.initial_delay > self.max_delay {
            return Err(ChannelError::Configuration(format!(
                "initial_delay ({:?}) must not exceed max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }

        if self.outbound_queue_capacity == 0 {
            return Err(ChannelError::Configuration(
                "outbound_queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_capacity == 0 {
            return Err(ChannelError::Configuration(
                "event_buffer_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
