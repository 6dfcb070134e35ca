use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request with the same idempotency key is still being processed")]
    ConcurrentRequestInProgress,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream '{0}' timed out")]
    UpstreamTimeout(String),

    #[error("Upstream '{0}' is unavailable (circuit open)")]
    UpstreamUnavailable(String),

    #[error("Upstream '{dependency}' returned status {status}")]
    Upstream { dependency: String, status: u16 },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// How a failed upstream call should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRetryStrategy {
    /// Transient failure, retry with backoff and count against the circuit.
    Retry,
    /// Permanent failure, return immediately.
    Fail,
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn to_retry_strategy(&self) -> ErrorRetryStrategy {
        match self {
            AppError::UpstreamTimeout(_) => ErrorRetryStrategy::Retry,

            // 5xx plus request timeout and throttling are worth another attempt,
            // any other client error is a bug on our side
            AppError::Upstream { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    ErrorRetryStrategy::Retry
                } else {
                    ErrorRetryStrategy::Fail
                }
            }

            // Transport failures and malformed upstream bodies alike
            AppError::Http(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                ErrorRetryStrategy::Retry
            }

            // Circuit already open, retrying would only hit it again
            AppError::UpstreamUnavailable(_) => ErrorRetryStrategy::Fail,

            AppError::Validation(_)
            | AppError::ConcurrentRequestInProgress
            | AppError::NotFound(_)
            | AppError::Cancelled
            | AppError::Config(_) => ErrorRetryStrategy::Fail,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.to_retry_strategy() == ErrorRetryStrategy::Retry
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ConcurrentRequestInProgress => "REQUEST_IN_PROGRESS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::Upstream { .. } | AppError::Http(_) => "UPSTREAM_ERROR",
            AppError::Cancelled => "CANCELLED",
            AppError::Serialization(_) | AppError::Config(_) | AppError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(status: u16) -> AppError {
        AppError::Upstream {
            dependency: "erp".to_string(),
            status,
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(upstream(500).is_transient());
        assert!(upstream(503).is_transient());
        assert!(upstream(408).is_transient());
        assert!(upstream(429).is_transient());
        assert!(AppError::UpstreamTimeout("erp".into()).is_transient());
    }

    #[test]
    fn test_unexpected_failures_are_transient() {
        assert!(AppError::Internal(anyhow::anyhow!("malformed upstream body")).is_transient());
        let decode = serde_json::from_str::<u32>("{").unwrap_err();
        assert!(AppError::Serialization(decode).is_transient());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        assert!(!upstream(400).is_transient());
        assert!(!upstream(422).is_transient());
        assert!(!AppError::NotFound("product 1".into()).is_transient());
        assert!(!AppError::UpstreamUnavailable("erp".into()).is_transient());
        assert!(!AppError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(AppError::ConcurrentRequestInProgress.code(), "REQUEST_IN_PROGRESS");
        assert_eq!(upstream(502).code(), "UPSTREAM_ERROR");
    }
}
