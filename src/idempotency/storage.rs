use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Status of an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    Pending,
    Completed,
    Failed,
}

/// Stored idempotency record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub composite_key: String,
    pub idempotency_key: String,
    pub operation: String,
    pub body_hash: String,
    pub status: IdempotencyStatus,
    pub response_body: Option<String>,
    pub response_status_code: Option<u16>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn new(
        composite_key: String,
        idempotency_key: String,
        operation: String,
        body_hash: String,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            composite_key,
            idempotency_key,
            operation,
            body_hash,
            status: IdempotencyStatus::Pending,
            response_body: None,
            response_status_code: None,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            completed_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == IdempotencyStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == IdempotencyStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == IdempotencyStatus::Failed
    }

    pub fn complete(&mut self, response_body: String, status_code: u16, now: DateTime<Utc>) {
        self.status = IdempotencyStatus::Completed;
        self.response_body = Some(response_body);
        self.response_status_code = Some(status_code);
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, now: DateTime<Utc>) {
        self.status = IdempotencyStatus::Failed;
        self.completed_at = Some(now);
    }
}

/// Per-key lock guarding the check-and-create step.
pub type OperationLock = Arc<Mutex<()>>;

/// In-process record and lock store.
///
/// Both maps are keyed by composite key. A lock is only ever dropped from the
/// map when its record is gone and no caller holds a clone of it, so two
/// callers can never end up holding different locks for the same key.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
    locks: DashMap<String, OperationLock>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for a key, creating it on first use.
    pub fn lock_for(&self, composite_key: &str) -> OperationLock {
        self.locks
            .entry(composite_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn find(&self, composite_key: &str) -> Option<IdempotencyRecord> {
        self.records.get(composite_key).map(|r| r.clone())
    }

    pub fn insert(&self, record: IdempotencyRecord) {
        self.records.insert(record.composite_key.clone(), record);
    }

    pub fn remove(&self, composite_key: &str) -> Option<IdempotencyRecord> {
        self.records.remove(composite_key).map(|(_, r)| r)
    }

    /// Applies `update` to an existing record and returns the updated copy.
    pub fn update<F>(&self, composite_key: &str, update: F) -> Option<IdempotencyRecord>
    where
        F: FnOnce(&mut IdempotencyRecord),
    {
        self.records.get_mut(composite_key).map(|mut record| {
            update(&mut record);
            record.clone()
        })
    }

    /// Deletes records whose expiry has passed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired_at(now));
        before.saturating_sub(self.records.len())
    }

    /// Deletes locks with no record that nobody holds or waits on.
    pub fn remove_orphan_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|key, lock| {
            self.records.contains_key(key) || Arc::strong_count(lock) > 1
        });
        before.saturating_sub(self.locks.len())
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub fn has_lock(&self, composite_key: &str) -> bool {
        self.locks.contains_key(composite_key)
    }

    /// Keys of locks that have no backing record.
    pub fn orphan_lock_keys(&self) -> Vec<String> {
        self.locks
            .iter()
            .filter(|entry| !self.records.contains_key(entry.key()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of records whose expiry has passed.
    pub fn expired_count(&self, now: DateTime<Utc>) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .count()
    }
}
