use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MIN_DELAY_MS: u64 = 800;
pub const DEFAULT_MAX_DELAY_MS: u64 = 3000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_JITTER: f64 = 0.5;

/// Backoff and timeout settings for the notification connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub connect_timeout: Duration,
    /// Fraction of the base delay randomly added or removed, 0.0..=1.0
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl ReconnectPolicy {
    /// Base delay for a 0-based attempt before jitter is applied.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.min_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Delay to wait before the given attempt, always within `[0, max_delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }

        let spread = base.as_secs_f64() * jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let secs = (base.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(secs).min(self.max_delay)
    }
}
