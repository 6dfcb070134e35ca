pub mod circuit_breaker;
pub mod executor;
pub mod fallback;
pub mod policy;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitState};
pub use executor::ResilientCall;
pub use fallback::Fallback;
pub use policy::{CircuitBreakerPolicy, ResiliencePolicy, RetryPolicy};
