pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod observability;
pub mod resilience;
pub mod services;
pub mod upstream;
