use crate::config::ResilienceSettings;
use rand::Rng;
use std::time::Duration;

/// Retry with exponential backoff and additive jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_max: Duration,
}

impl RetryPolicy {
    /// Deterministic part of the delay before retry number `attempt + 1`:
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }

    /// Backoff plus uniform jitter in `[0, jitter_max]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter_max.as_millis() as u64;
        if jitter_ms == 0 {
            return self.backoff(attempt);
        }
        let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_ms));
        self.backoff(attempt) + jitter
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            jitter_max: Duration::from_millis(100),
        }
    }
}

/// Failure-ratio circuit breaker over a rolling sampling window.
#[derive(Debug, Clone)]
pub struct CircuitBreakerPolicy {
    pub failure_ratio: f64,
    pub sampling_window: Duration,
    pub minimum_throughput: u32,
    pub break_duration: Duration,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            sampling_window: Duration::from_secs(30),
            minimum_throughput: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}

/// Full policy bound to one upstream dependency.
#[derive(Debug, Clone)]
pub struct ResiliencePolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerPolicy,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerPolicy::default(),
        }
    }
}

impl From<&ResilienceSettings> for ResiliencePolicy {
    fn from(settings: &ResilienceSettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: Duration::from_millis(settings.base_delay_ms),
                max_delay: Duration::from_millis(settings.max_delay_ms),
                jitter_max: Duration::from_millis(settings.jitter_max_ms),
            },
            circuit_breaker: CircuitBreakerPolicy {
                failure_ratio: settings.failure_ratio.clamp(0.0, 1.0),
                sampling_window: Duration::from_secs(settings.sampling_window_secs),
                minimum_throughput: settings.minimum_throughput.max(1),
                break_duration: Duration::from_secs(settings.break_duration_secs),
            },
        }
    }
}
