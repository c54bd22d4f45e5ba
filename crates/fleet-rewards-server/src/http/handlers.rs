use crate::AppState;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleet_rewards_api::{map_store_error, ApiError, ApiErrorCode};
use fleet_rewards_store::StoreError;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Instant;

pub(crate) fn api_error_response(status: StatusCode, err: ApiError) -> Response {
    let body = Json(json!({ "error": err }));
    (status, body).into_response()
}

pub(crate) fn store_error_response(err: &StoreError) -> Response {
    let (status, api_err) = map_store_error(err);
    let status =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    api_error_response(status, api_err)
}

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

/// Honors an upstream-supplied x-request-id so one id spans the gateway and
/// this service; mints a fresh one otherwise.
pub(crate) fn propagated_request_id(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(std::string::ToString::to_string)
        .unwrap_or_else(|| make_request_id(state))
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

/// Caller identity as asserted by the authenticating gateway.
pub(crate) fn caller_user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(std::string::ToString::to_string)
}

/// Bounds every handler so a wedged store lock cannot pin connections open.
pub(crate) async fn request_timeout_mw(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(state.api.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => api_error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiError::new(ApiErrorCode::Retryable, "request timed out", json!({})),
        ),
    }
}

pub(crate) fn finish(
    state: &AppState,
    route: &str,
    started: Instant,
    request_id: &str,
    response: Response,
) -> Response {
    state
        .metrics
        .observe_request(route, response.status().as_u16(), started.elapsed());
    with_request_id(response, request_id)
}
