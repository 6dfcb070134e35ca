use crate::error::{AppError, Result};
use crate::observability::{get_metrics, LatencyTimer};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::resilience::fallback::Fallback;
use crate::resilience::policy::ResiliencePolicy;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Timeout, retry and circuit breaking around calls to one upstream.
///
/// One instance per dependency. The breaker state is never shared between
/// dependencies.
#[derive(Debug)]
pub struct ResilientCall {
    name: String,
    policy: ResiliencePolicy,
    breaker: CircuitBreaker,
}

impl ResilientCall {
    pub fn new(name: impl Into<String>, policy: ResiliencePolicy) -> Self {
        let name = name.into();
        let breaker = CircuitBreaker::new(name.clone(), policy.circuit_breaker.clone());
        Self {
            name,
            policy,
            breaker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `operation` under the bound policy and applies `fallback` to
    /// whatever failure is left at the end.
    ///
    /// `operation` is invoked once per attempt. A `NotFound` result is
    /// returned as-is: it is not retried, not counted as a failure, and not
    /// replaced by the fallback.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: F,
        fallback: Fallback<T>,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.run(operation, cancel).await {
            Ok(value) => Ok(value),
            Err(error) => fallback.resolve(&self.name, error),
        }
    }

    async fn run<T, F, Fut>(&self, mut operation: F, cancel: &CancellationToken) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.policy.retry.max_retries;
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let permit = match self.breaker.try_acquire() {
                Some(permit) => permit,
                None => {
                    get_metrics().record_upstream_call(&self.name, "rejected", 0.0);
                    tracing::debug!(dependency = %self.name, "Circuit open, failing fast");
                    return Err(AppError::UpstreamUnavailable(self.name.clone()));
                }
            };

            let timer = LatencyTimer::new();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                result = tokio::time::timeout(self.policy.timeout, operation()) => match result {
                    Ok(result) => result,
                    Err(_) => Err(AppError::UpstreamTimeout(self.name.clone())),
                },
            };
            let elapsed_ms = timer.elapsed_ms();

            match outcome {
                Ok(value) => {
                    permit.success();
                    get_metrics().record_upstream_call(&self.name, "success", elapsed_ms);
                    return Ok(value);
                }
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(error) if error.is_transient() => {
                    permit.failure();
                    get_metrics().record_upstream_call(&self.name, "failure", elapsed_ms);

                    if attempt >= max_retries {
                        tracing::warn!(
                            dependency = %self.name,
                            attempts = attempt + 1,
                            error = %error,
                            "Upstream call failed after retries"
                        );
                        return Err(error);
                    }

                    let delay = self.policy.retry.delay_for(attempt);
                    tracing::debug!(
                        dependency = %self.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying upstream call"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => {
                    // The dependency answered, so it is healthy from the breaker's view.
                    permit.success();
                    let outcome = if error.is_not_found() { "not_found" } else { "rejected_request" };
                    get_metrics().record_upstream_call(&self.name, outcome, elapsed_ms);
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::policy::{CircuitBreakerPolicy, RetryPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(max_retries: u32) -> ResiliencePolicy {
        ResiliencePolicy {
            timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_secs(1),
                jitter_max: Duration::ZERO,
            },
            circuit_breaker: CircuitBreakerPolicy {
                failure_ratio: 0.5,
                sampling_window: Duration::from_secs(30),
                minimum_throughput: 100,
                break_duration: Duration::from_secs(30),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let call = ResilientCall::new("erp", policy(3));
        let calls = &AtomicU32::new(0);

        let value = call
            .execute(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, AppError>(42)
                },
                Fallback::Propagate,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let call = ResilientCall::new("erp", policy(3));
        let calls = &AtomicU32::new(0);

        let value = call
            .execute(
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::Upstream {
                            dependency: "erp".into(),
                            status: 503,
                        })
                    } else {
                        Ok("ok")
                    }
                },
                Fallback::Propagate,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let call = ResilientCall::new("erp", policy(3));
        let calls = &AtomicU32::new(0);

        let result = call
            .execute(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(AppError::NotFound("product 9".into()))
                },
                Fallback::DefaultValue(0),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let call = ResilientCall::new("erp", policy(3));
        let calls = &AtomicU32::new(0);

        let result = call
            .execute(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(AppError::Upstream {
                        dependency: "erp".into(),
                        status: 400,
                    })
                },
                Fallback::Propagate,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(result, Err(AppError::Upstream { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let call = ResilientCall::new("erp", policy(3));
        let token = CancellationToken::new();
        token.cancel();

        let result = call
            .execute(|| async { Ok::<_, AppError>(1) }, Fallback::DefaultValue(0), &token)
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
