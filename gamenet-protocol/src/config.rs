//! Engine tuning knobs

use crate::packet::MAX_DATAGRAM_SIZE;
use std::time::Duration;

/// Default time between retransmission attempts of one reliable frame
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Default lifetime of an unacknowledged frame, and of an unresolved gap
pub const DEFAULT_LIFETIME_THRESHOLD: Duration = Duration::from_millis(200);

/// Timing and sizing parameters shared by the sender and receiver halves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Delay between two transmissions of the same reliable frame
    pub retry_interval: Duration,
    /// How long a reliable frame may stay unacknowledged (sender), and how
    /// long a sequence gap may stay unresolved (receiver)
    pub lifetime_threshold: Duration,
    /// Upper bound on any datagram handed to the channel
    pub max_datagram_size: usize,
}

impl EngineConfig {
    pub fn new() -> Self {
        EngineConfig {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            lifetime_threshold: DEFAULT_LIFETIME_THRESHOLD,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_lifetime_threshold(mut self, lifetime: Duration) -> Self {
        self.lifetime_threshold = lifetime;
        self
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size.min(MAX_DATAGRAM_SIZE);
        self
    }

    /// Number of transmissions an unacknowledged frame gets before it is
    /// abandoned
    pub fn max_retry_attempts(&self) -> u32 {
        if self.retry_interval.is_zero() {
            return 1;
        }
        let ratio = self.lifetime_threshold.as_secs_f64() / self.retry_interval.as_secs_f64();
        (ratio.ceil() as u32).max(1)
    }

    pub(crate) fn retry_interval_secs(&self) -> f64 {
        self.retry_interval.as_secs_f64()
    }

    pub(crate) fn lifetime_secs(&self) -> f64 {
        self.lifetime_threshold.as_secs_f64()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
