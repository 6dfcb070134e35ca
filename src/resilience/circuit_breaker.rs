//! Failure-ratio circuit breaker.
//!
//! ```text
//! Closed   -> Open:     failures / samples >= ratio, samples >= minimum throughput
//! Open     -> HalfOpen: break duration elapsed, one trial call admitted
//! HalfOpen -> Closed:   trial succeeded
//! HalfOpen -> Open:     trial failed, break timer restarts
//! ```

use crate::observability::get_metrics;
use crate::resilience::policy::CircuitBreakerPolicy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// `(recorded_at, failed)` in arrival order.
    outcomes: VecDeque<(Instant, bool)>,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

impl Inner {
    fn prune(&mut self, now: Instant, window: std::time::Duration) {
        while let Some((at, _)) = self.outcomes.front() {
            if now.duration_since(*at) > window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn failure_stats(&self) -> (usize, usize) {
        let failures = self.outcomes.iter().filter(|(_, failed)| *failed).count();
        (failures, self.outcomes.len())
    }
}

/// Circuit breaker owned by a single dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    policy: CircuitBreakerPolicy,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: CircuitBreakerPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                outcomes: VecDeque::new(),
                open_until: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state as seen by the next caller.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match (inner.state, inner.open_until) {
            (CircuitState::Open, Some(until)) if Instant::now() >= until => CircuitState::HalfOpen,
            (state, _) => state,
        }
    }

    /// Asks for permission to call the dependency.
    ///
    /// Returns `None` while the circuit is open, or while a half-open trial is
    /// already in flight.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => Some(CallPermit::new(self, false)),
            CircuitState::Open => {
                let open_until = inner.open_until;
                match open_until {
                    Some(until) if now < until => None,
                    _ => {
                        inner.trial_in_flight = true;
                        self.transition(&mut inner, CircuitState::HalfOpen);
                        Some(CallPermit::new(self, true))
                    }
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(CallPermit::new(self, true))
                }
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                inner.outcomes.clear();
                inner.open_until = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
            CircuitState::Closed => {
                inner.outcomes.push_back((now, false));
                inner.prune(now, self.policy.sampling_window);
            }
            // Late result from a call admitted before the circuit opened.
            _ => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();

        match inner.state {
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                self.open(&mut inner, now);
            }
            CircuitState::Closed => {
                inner.outcomes.push_back((now, true));
                inner.prune(now, self.policy.sampling_window);

                let (failures, samples) = inner.failure_stats();
                if samples >= self.policy.minimum_throughput as usize
                    && failures as f64 / samples as f64 >= self.policy.failure_ratio
                {
                    tracing::warn!(
                        dependency = %self.name,
                        failures,
                        samples,
                        break_secs = self.policy.break_duration.as_secs_f64(),
                        "Circuit breaker tripped"
                    );
                    self.open(&mut inner, now);
                }
            }
            _ => {}
        }
    }

    /// A trial that ended without an outcome frees the slot for the next caller.
    fn record_abandoned(&self, trial: bool) {
        if !trial {
            return;
        }
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.trial_in_flight {
            inner.trial_in_flight = false;
        }
    }

    fn open(&self, inner: &mut Inner, now: Instant) {
        inner.outcomes.clear();
        inner.open_until = Some(now + self.policy.break_duration);
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        if from != to {
            tracing::info!(
                dependency = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit state changed"
            );
            get_metrics().set_circuit_state(&self.name, to.gauge_value());
        }
    }
}

/// Admission ticket for one call through the breaker.
///
/// Dropping it without reporting an outcome (e.g. on cancellation) counts as
/// neither success nor failure.
#[must_use]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_abandoned(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "erp",
            CircuitBreakerPolicy {
                failure_ratio: 0.5,
                sampling_window: Duration::from_secs(30),
                minimum_throughput: 4,
                break_duration: Duration::from_secs(10),
            },
        )
    }

    fn fail(cb: &CircuitBreaker) {
        cb.try_acquire().expect("permit").failure();
    }

    fn succeed(cb: &CircuitBreaker) {
        cb.try_acquire().expect("permit").success();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_minimum_throughput() {
        let cb = breaker();
        fail(&cb);
        fail(&cb);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ratio_below_threshold_keeps_closed() {
        let cb = breaker();
        succeed(&cb);
        succeed(&cb);
        succeed(&cb);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_samples_leave_window() {
        let cb = breaker();
        fail(&cb);
        fail(&cb);
        fail(&cb);
        tokio::time::advance(Duration::from_secs(31)).await;
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_trial_after_break() {
        let cb = breaker();
        for _ in 0..4 {
            fail(&cb);
        }
        assert!(cb.try_acquire().is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let trial = cb.try_acquire().expect("trial permit");
        assert!(trial.is_trial());
        assert!(cb.try_acquire().is_none());

        trial.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let cb = breaker();
        for _ in 0..4 {
            fail(&cb);
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        cb.try_acquire().expect("trial permit").failure();

        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cb.try_acquire().is_none());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let cb = breaker();
        for _ in 0..4 {
            fail(&cb);
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        drop(cb.try_acquire().expect("trial permit"));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_some());
    }
}
