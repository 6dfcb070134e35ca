use crate::error::{AppError, Result};
use crate::idempotency::coordinator::IdempotencyCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background job that periodically sweeps expired idempotency state.
pub struct IdempotencySweeper {
    coordinator: Arc<IdempotencyCoordinator>,
    interval: Duration,
}

impl IdempotencySweeper {
    pub fn new(coordinator: Arc<IdempotencyCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    /// Starts the sweep loop on a background task.
    ///
    /// The first sweep runs one full interval after start. A zero interval
    /// is rejected.
    pub fn start(self) -> Result<SweeperHandle> {
        if self.interval.is_zero() {
            return Err(AppError::Validation(
                "sweep interval must be greater than zero".to_string(),
            ));
        }

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let period = self.interval;
        let coordinator = self.coordinator;

        let join = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        coordinator.sweep();
                    }
                }
            }

            tracing::debug!("Idempotency sweeper stopped");
        });

        tracing::info!(interval_secs = period.as_secs(), "Idempotency sweeper started");

        Ok(SweeperHandle { shutdown, join })
    }
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Stops the sweep loop and waits for the task to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            tracing::error!("Idempotency sweeper task failed: {}", e);
        }
    }
}
