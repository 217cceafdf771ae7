use std::time::Duration;

/// Exponential backoff schedule
///
/// Delays between reconnection attempts grow exponentially:
/// initial_delay * 2^attempt, capped at max_delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff schedule
    ///
    /// # Arguments
    /// * `initial_delay` - The delay before the first reconnect
    /// * `max_delay` - The maximum delay between reconnects
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay for the given 0-indexed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Mutable reconnection counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectState {
    pub attempts_remaining: u32,
    pub current_delay: Duration,
}

/// Attempt budget plus backoff schedule for one session
///
/// `next_attempt` is consulted after every failure; it hands out the delay
/// for the next attempt and consumes one unit of budget, or returns `None`
/// once the budget is spent. `reset` restores both counters.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    backoff: ExponentialBackoff,
    max_attempts: u32,
    state: ReconnectState,
}

impl ReconnectPolicy {
    pub fn new(backoff: ExponentialBackoff, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts,
            state: ReconnectState {
                attempts_remaining: max_attempts,
                current_delay: backoff.initial_delay(),
            },
        }
    }

    /// Claim the next attempt, returning the delay to wait before it
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.state.attempts_remaining == 0 {
            return None;
        }

        let delay = self.state.current_delay;
        self.state.attempts_remaining -= 1;
        self.state.current_delay = self.backoff.delay_for(self.attempts_made());
        Some(delay)
    }

    /// Restore the full budget and the initial delay
    pub fn reset(&mut self) {
        self.state = ReconnectState {
            attempts_remaining: self.max_attempts,
            current_delay: self.backoff.initial_delay(),
        };
    }

    /// Number of attempts claimed since the last reset
    pub fn attempts_made(&self) -> u32 {
        self.max_attempts - self.state.attempts_remaining
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.state.attempts_remaining
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.attempts_remaining == 0
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }
}
