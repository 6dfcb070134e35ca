use axum::{
    body::{to_bytes, Body},
    extract::{MatchedPath, OriginalUri, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::idempotency::IdempotencyCheckResult;
use crate::observability::{get_metrics, mask_sensitive, LatencyTimer};

use super::routes::AppState;

/// Set on responses served from a stored idempotency record.
pub const IDEMPOTENT_REPLAYED_HEADER: &str = "idempotent-replayed";

/// Largest request or response body captured for idempotency.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

fn requires_key(method: &Method) -> bool {
    method == Method::POST || method == Method::PUT
}

fn accepts_key(method: &Method) -> bool {
    requires_key(method) || method == Method::DELETE || method == Method::PATCH
}

/// Deduplicates writes carrying an idempotency key.
///
/// The first request for a `(key, METHOD path, body hash)` triple runs the
/// handler. Later ones get the stored response, or 409 while the first is
/// still running. Non-2xx outcomes are not stored, so the client may retry.
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    if !accepts_key(&method) {
        return next.run(request).await;
    }

    let coordinator = state.coordinator.clone();
    let header_name = coordinator.settings().header_name.as_str();

    let header_value = request
        .headers()
        .get(header_name)
        .map(|value| value.to_str().map(str::to_string));

    let key = match header_value {
        Some(Ok(key)) => key,
        Some(Err(_)) => {
            return AppError::Validation(format!("{} header must be ASCII", header_name))
                .into_response()
        }
        None if requires_key(&method) => {
            return AppError::Validation(format!("{} header is required", header_name))
                .into_response()
        }
        None => return next.run(request).await,
    };

    let generator = coordinator.key_generator();
    if let Err(e) = generator.validate_client_key(&key) {
        return e.into_response();
    }

    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let operation = generator.operation_name(method.as_str(), &path);

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::Validation("Request body is too large or unreadable".to_string())
                .into_response()
        }
    };
    let body_hash = generator.hash_body(&bytes);

    let check = match coordinator
        .get_or_create_operation(&key, &operation, &body_hash)
        .await
    {
        Ok(check) => check,
        Err(e) => return e.into_response(),
    };

    match check {
        IdempotencyCheckResult::Completed(record) => {
            tracing::info!(
                idempotency_key = %mask_sensitive(&key, 4),
                operation = %operation,
                "Replaying stored response"
            );
            replay(
                record.response_status_code.unwrap_or(200),
                record.response_body.unwrap_or_default(),
            )
        }
        IdempotencyCheckResult::InProgress(_) => {
            tracing::info!(
                idempotency_key = %mask_sensitive(&key, 4),
                operation = %operation,
                "Duplicate request while original is in progress"
            );
            AppError::ConcurrentRequestInProgress.into_response()
        }
        IdempotencyCheckResult::New(_) => {
            let request = Request::from_parts(parts, Body::from(bytes));
            let response = next.run(request).await;
            let status = response.status();

            if !status.is_success() {
                coordinator.fail_operation(&key, &operation, &body_hash);
                return response;
            }

            let (parts, body) = response.into_parts();
            match to_bytes(body, MAX_BODY_BYTES).await {
                Ok(bytes) => {
                    coordinator.complete_operation(
                        &key,
                        &operation,
                        &body_hash,
                        String::from_utf8_lossy(&bytes).into_owned(),
                        status.as_u16(),
                    );
                    Response::from_parts(parts, Body::from(bytes))
                }
                Err(e) => {
                    coordinator.fail_operation(&key, &operation, &body_hash);
                    AppError::Internal(anyhow::anyhow!("Failed to buffer response body: {}", e))
                        .into_response()
                }
            }
        }
    }
}

fn replay(status_code: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::OK);
    let has_body = !body.is_empty();
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    if has_body {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    } else {
        headers.remove(header::CONTENT_TYPE);
    }
    headers.insert(IDEMPOTENT_REPLAYED_HEADER, HeaderValue::from_static("true"));
    response
}

/// Records request count and latency per matched route.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}
