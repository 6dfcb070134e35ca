use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::error::AppError;
use crate::idempotency::MetricsSnapshot;
use crate::observability::AggregatedHealth;
use crate::services::DependencyCircuit;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConcurrentRequestInProgress => StatusCode::CONFLICT,
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream { .. } | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Serialization(_)
            | AppError::Cancelled
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ApiResponse::<()>::error(ErrorResponse::new(self.code(), message));
        (status, Json(body)).into_response()
    }
}

/// Confirmation returned after a product is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

impl CacheStatsResponse {
    pub fn new(stats: &CacheStats, entries: usize) -> Self {
        Self {
            entries,
            hits: stats.get_hits(),
            misses: stats.get_misses(),
            invalidations: stats.get_invalidations(),
            errors: stats.get_errors(),
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Detailed health: dependency status, circuit states and reliability counters.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedHealthResponse {
    #[serde(flatten)]
    pub health: AggregatedHealth,
    pub circuits: Vec<DependencyCircuit>,
    pub idempotency: MetricsSnapshot,
    pub idempotency_records: usize,
    pub cache: CacheStatsResponse,
}
