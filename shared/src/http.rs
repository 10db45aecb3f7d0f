use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use std::sync::Arc;

pub const API_KEY_HEADER: &str = "x-api-key";

/// JSON error body shared by every HTTP surface.
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub error_message: String,
}

pub fn make_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Json(ApiErrorBody {
        error_message: message.into(),
    });
    (status, body).into_response()
}

/// Checks the `x-api-key` header against the configured key.
///
/// Returns the 401 response to send when the header is missing or does not
/// match, so handlers can use it with `?` after mapping to `Err`.
pub fn require_api_key(headers: &HeaderMap, expected: &str) -> Result<(), Response> {
    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == expected => Ok(()),
        _ => Err(make_error_response(
            StatusCode::UNAUTHORIZED,
            format!("Missing or invalid {API_KEY_HEADER} header"),
        )),
    }
}

/// Readiness probe injected by the component that knows its own startup state.
pub type ReadinessProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Router exposing the liveness and readiness endpoints.
pub fn admin_routes(is_ready: ReadinessProbe) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(is_ready)
}

async fn health_handler() -> &'static str {
    "ok\n"
}

async fn ready_handler(State(is_ready): State<ReadinessProbe>) -> Response {
    if is_ready() {
        (StatusCode::OK, "ok\n").into_response()
    } else {
        make_error_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
