//! Responses produced by the gatekeeper instead of the downstream service.

use axum::{
    Json,
    body::Body,
    response::{IntoResponse, Response},
};
use http::{HeaderMap, StatusCode};
use rate_limit::ConsumeResult;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
    #[serde(rename = "rateLimit", skip_serializing_if = "Option::is_none")]
    rate_limit: Option<RateLimitState>,
}

#[derive(Debug, Serialize)]
struct RateLimitState {
    remaining: u64,
    /// Seconds until the window resets.
    reset: f64,
}

/// Default JSON body of a rejected request.
pub(super) fn too_many_requests_body(result: &ConsumeResult) -> Value {
    let body = ErrorBody {
        error: "Too Many Requests",
        message: "You have exceeded the rate limit.",
        rate_limit: Some(RateLimitState {
            remaining: result.remaining_points,
            reset: result.ms_before_next as f64 / 1000.0,
        }),
    };

    serde_json::to_value(body).unwrap_or(Value::Null)
}

/// A 429 response with the given JSON body and rate limit headers.
pub(super) fn too_many_requests(headers: HeaderMap, body: Value) -> Response<Body> {
    (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
}

/// The counter store failed and the limiter fails closed.
pub(super) fn service_unavailable() -> Response<Body> {
    let body = ErrorBody {
        error: "Service Unavailable",
        message: "Rate limit state is unavailable.",
        rate_limit: None,
    };

    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

/// A user callback failed. Carries no detail about the failure.
pub(super) fn internal_server_error() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
