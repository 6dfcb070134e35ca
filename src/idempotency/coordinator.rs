use crate::clock::{Clock, SystemClock};
use crate::config::IdempotencySettings;
use crate::error::Result;
use crate::idempotency::key_generator::IdempotencyKeyGenerator;
use crate::idempotency::storage::{IdempotencyRecord, InMemoryIdempotencyStore};
use crate::observability::get_metrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics for idempotency handling.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub new_requests: AtomicU64,
    pub duplicate_requests: AtomicU64,
    pub in_progress_requests: AtomicU64,
    pub completed_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub missed_completions: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_new(&self) {
        self.new_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_check("new");
    }

    pub fn record_duplicate(&self) {
        self.duplicate_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_check("replayed");
    }

    pub fn record_in_progress(&self) {
        self.in_progress_requests.fetch_add(1, Ordering::Relaxed);
        get_metrics().record_idempotency_check("in_progress");
    }

    pub fn record_completed(&self) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missed_completion(&self) {
        self.missed_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
            duplicate_requests: self.duplicate_requests.load(Ordering::Relaxed),
            in_progress_requests: self.in_progress_requests.load(Ordering::Relaxed),
            completed_requests: self.completed_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            missed_completions: self.missed_completions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub new_requests: u64,
    pub duplicate_requests: u64,
    pub in_progress_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub missed_completions: u64,
}

impl MetricsSnapshot {
    /// Share of requests that hit an existing record, finished or not.
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.duplicate_requests + self.in_progress_requests) as f64
                / self.total_requests as f64
        }
    }
}

/// Result of an idempotency check.
#[derive(Debug, Clone)]
pub enum IdempotencyCheckResult {
    /// First caller for this composite key, proceed with the operation.
    New(IdempotencyRecord),
    /// Another caller owns the operation and has not finished yet.
    InProgress(IdempotencyRecord),
    /// The operation already finished, replay its response.
    Completed(IdempotencyRecord),
}

impl IdempotencyCheckResult {
    pub fn is_existing(&self) -> bool {
        !matches!(self, IdempotencyCheckResult::New(_))
    }

    pub fn record(&self) -> &IdempotencyRecord {
        match self {
            IdempotencyCheckResult::New(r)
            | IdempotencyCheckResult::InProgress(r)
            | IdempotencyCheckResult::Completed(r) => r,
        }
    }

    pub fn into_record(self) -> IdempotencyRecord {
        match self {
            IdempotencyCheckResult::New(r)
            | IdempotencyCheckResult::InProgress(r)
            | IdempotencyCheckResult::Completed(r) => r,
        }
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub expired_records: usize,
    pub orphaned_locks: usize,
}

/// Deduplicates writes by composite key within this process.
pub struct IdempotencyCoordinator {
    store: InMemoryIdempotencyStore,
    key_generator: IdempotencyKeyGenerator,
    metrics: Arc<IdempotencyMetrics>,
    settings: IdempotencySettings,
    clock: Arc<dyn Clock>,
}

impl IdempotencyCoordinator {
    pub fn new(settings: IdempotencySettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: IdempotencySettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: InMemoryIdempotencyStore::new(),
            key_generator: IdempotencyKeyGenerator::with_default_config(),
            metrics: Arc::new(IdempotencyMetrics::new()),
            settings,
            clock,
        }
    }

    /// Gets the metrics for this coordinator.
    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn key_generator(&self) -> &IdempotencyKeyGenerator {
        &self.key_generator
    }

    pub fn settings(&self) -> &IdempotencySettings {
        &self.settings
    }

    pub fn store(&self) -> &InMemoryIdempotencyStore {
        &self.store
    }

    /// Looks up the record for `(key, operation, body_hash)` or creates a
    /// pending one.
    ///
    /// The per-key lock is held only across the check-and-create step. Of any
    /// number of concurrent callers with the same composite key exactly one
    /// receives [`IdempotencyCheckResult::New`].
    pub async fn get_or_create_operation(
        &self,
        key: &str,
        operation: &str,
        body_hash: &str,
    ) -> Result<IdempotencyCheckResult> {
        self.key_generator
            .validate_components(key, operation, body_hash)?;
        self.metrics.record_request();

        let composite_key = self.key_generator.composite_key(key, operation, body_hash);
        let lock = self.store.lock_for(&composite_key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        if let Some(existing) = self.store.find(&composite_key) {
            if existing.is_expired_at(now) || existing.is_failed() {
                tracing::debug!(
                    operation = %operation,
                    status = ?existing.status,
                    "Replacing stale idempotency record"
                );
                self.store.remove(&composite_key);
            } else if existing.is_completed() {
                self.metrics.record_duplicate();
                return Ok(IdempotencyCheckResult::Completed(existing));
            } else {
                self.metrics.record_in_progress();
                return Ok(IdempotencyCheckResult::InProgress(existing));
            }
        }

        let record = IdempotencyRecord::new(
            composite_key,
            key.to_string(),
            operation.to_string(),
            body_hash.to_string(),
            self.settings.ttl_seconds,
            now,
        );
        self.store.insert(record.clone());
        self.metrics.record_new();

        Ok(IdempotencyCheckResult::New(record))
    }

    /// Stores the response of a finished operation.
    ///
    /// Best effort: a missing or already finished record is logged and ignored.
    pub fn complete_operation(
        &self,
        key: &str,
        operation: &str,
        body_hash: &str,
        response_body: String,
        status_code: u16,
    ) {
        let composite_key = self.key_generator.composite_key(key, operation, body_hash);
        let now = self.clock.now();
        let mut transitioned = false;

        let found = self.store.update(&composite_key, |record| {
            if record.is_pending() {
                record.complete(response_body, status_code, now);
                transitioned = true;
            }
        });

        match found {
            Some(_) if transitioned => {
                self.metrics.record_completed();
                get_metrics().record_idempotency_completion(true);
                tracing::debug!(operation = %operation, status_code, "Idempotent operation completed");
            }
            Some(record) => {
                tracing::warn!(
                    operation = %operation,
                    status = ?record.status,
                    "Idempotency record is not pending, completion ignored"
                );
            }
            None => {
                self.metrics.record_missed_completion();
                tracing::warn!(
                    operation = %operation,
                    "No idempotency record to complete, it may have expired"
                );
            }
        }
    }

    /// Marks a pending operation as failed so the client can retry it.
    pub fn fail_operation(&self, key: &str, operation: &str, body_hash: &str) {
        let composite_key = self.key_generator.composite_key(key, operation, body_hash);
        let now = self.clock.now();
        let mut transitioned = false;

        let found = self.store.update(&composite_key, |record| {
            if record.is_pending() {
                record.fail(now);
                transitioned = true;
            }
        });

        if transitioned {
            self.metrics.record_failed();
            get_metrics().record_idempotency_completion(false);
        } else if found.is_none() {
            tracing::warn!(operation = %operation, "No idempotency record to mark as failed");
        }
    }

    /// Removes expired records and orphaned locks.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let expired_records = self.store.remove_expired(now);
        let orphaned_locks = self.store.remove_orphan_locks();

        let report = SweepReport {
            expired_records,
            orphaned_locks,
        };
        get_metrics().record_idempotency_sweep(expired_records, orphaned_locks);
        get_metrics().set_idempotency_records(self.store.record_count());
        if expired_records > 0 || orphaned_locks > 0 {
            tracing::info!(
                expired_records,
                orphaned_locks,
                remaining_records = self.store.record_count(),
                "Idempotency sweep finished"
            );
        }
        report
    }
}
