pub mod coordinator;
pub mod key_generator;
pub mod storage;
pub mod sweeper;

pub use coordinator::{
    IdempotencyCheckResult, IdempotencyCoordinator, IdempotencyMetrics, MetricsSnapshot,
    SweepReport,
};
pub use key_generator::{IdempotencyKeyGenerator, KeyGeneratorConfig};
pub use storage::{IdempotencyRecord, IdempotencyStatus, InMemoryIdempotencyStore, OperationLock};
pub use sweeper::{IdempotencySweeper, SweeperHandle};
