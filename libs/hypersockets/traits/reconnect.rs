use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how the client should
/// behave when reconnecting after a disconnection.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - The reconnection attempt number (0-indexed, reset after
    ///   every successful connection)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: usize) -> Option<Duration>;
}

/// Fast-then-periodic reconnection strategy
///
/// The first `fast_attempts` reconnections happen immediately; every later
/// attempt waits `period`. There is no attempt limit.
#[derive(Debug, Clone)]
pub struct FastThenPeriodic {
    fast_attempts: usize,
    period: Duration,
}

impl FastThenPeriodic {
    /// Create a new fast-then-periodic strategy
    ///
    /// # Arguments
    /// * `fast_attempts` - Number of immediate attempts after a drop
    /// * `period` - Delay between attempts once fast attempts are used up
    pub fn new(fast_attempts: usize, period: Duration) -> Self {
        Self {
            fast_attempts,
            period,
        }
    }
}

impl Default for FastThenPeriodic {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl ReconnectionStrategy for FastThenPeriodic {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if attempt < self.fast_attempts {
            Some(Duration::ZERO)
        } else {
            Some(self.period)
        }
    }
}

/// Never reconnect strategy
///
/// The client will not attempt to reconnect after disconnection
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }
}
