use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::requests::ListProductsQuery;
use crate::api::responses::{
    ApiResponse, CacheStatsResponse, DeletedResponse, DetailedHealthResponse, HealthResponse,
};
use crate::error::Result;
use crate::models::{ErpProduct, NewProduct, Product, ProductPage, ProductUpdate};

use super::routes::AppState;

/// Token cancelled when the handler future is dropped, e.g. on client disconnect.
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let health = state.health_checker.check_all();
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status: health.status.as_str().to_string(),
        version: health.version,
        timestamp: chrono::Utc::now(),
    };

    (status, Json(ApiResponse::success(response)))
}

/// Detailed health with circuit states and reliability counters.
pub async fn detailed_health_check(
    State(state): State<AppState>,
) -> Json<ApiResponse<DetailedHealthResponse>> {
    let cache = state.product_service.cache();

    let response = DetailedHealthResponse {
        health: state.health_checker.check_all(),
        circuits: state.product_service.circuit_states(),
        idempotency: state.coordinator.metrics().snapshot(),
        idempotency_records: state.coordinator.store().record_count(),
        cache: CacheStatsResponse::new(&cache.stats(), cache.len()),
    };

    Json(ApiResponse::success(response))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response(),
    }
}

// ============================================================================
// Product Handlers
// ============================================================================

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ApiResponse<ProductPage>>> {
    let (cancel, _guard) = request_token();
    let page = state
        .product_service
        .list_products(query.page(), query.page_size(), &cancel)
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>> {
    let (cancel, _guard) = request_token();
    let product = state.product_service.get_product(id, &cancel).await?;

    Ok(Json(ApiResponse::success(product)))
}

pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<NewProduct>,
) -> Result<(StatusCode, Json<ApiResponse<ErpProduct>>)> {
    let (cancel, _guard) = request_token();
    let product = state.product_service.create_product(&request, &cancel).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProductUpdate>,
) -> Result<Json<ApiResponse<ErpProduct>>> {
    let (cancel, _guard) = request_token();
    let product = state
        .product_service
        .update_product(id, &request, &cancel)
        .await?;

    Ok(Json(ApiResponse::success(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DeletedResponse>>> {
    let (cancel, _guard) = request_token();
    state.product_service.delete_product(id, &cancel).await?;

    Ok(Json(ApiResponse::success(DeletedResponse { id, deleted: true })))
}
