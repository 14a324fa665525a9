//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for a [`crate::SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval of the periodic sync ticker. `Duration::ZERO` disables it.
    pub sync_interval: Duration,
    /// Maximum number of changes per push attempt.
    pub batch_size: usize,
    /// Total tries per transport call (first attempt included).
    pub retry_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_delay: Duration,
    /// Quiet window that coalesces pushes after local mutations.
    pub debounce_delay: Duration,
    /// Interval of the connectivity probe ticker.
    pub online_probe_interval: Duration,
    /// Delay between an offline-to-online transition and the triggered sync.
    pub post_online_sync_delay: Duration,
}

impl SyncConfig {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            batch_size: 100,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            debounce_delay: Duration::from_secs(1),
            online_probe_interval: Duration::from_secs(10),
            post_online_sync_delay: Duration::from_secs(1),
        }
    }

    /// Sets the periodic sync interval. `Duration::ZERO` disables it.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the maximum number of changes per push.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the total number of tries per transport call.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the base retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the debounce window for pushes after local mutations.
    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    /// Sets the connectivity probe interval.
    pub fn with_online_probe_interval(mut self, interval: Duration) -> Self {
        self.online_probe_interval = interval;
        self
    }

    /// Sets the delay before the sync triggered by coming back online.
    pub fn with_post_online_sync_delay(mut self, delay: Duration) -> Self {
        self.post_online_sync_delay = delay;
        self
    }

    /// Backoff before the try following failed attempt number `attempt`
    /// (1-indexed): `retry_delay * 2^(attempt - 1)`.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.retry_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
