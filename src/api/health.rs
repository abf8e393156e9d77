use axum::http::StatusCode;

/// Liveness check on `/`: 200 with an empty body.
#[must_use]
pub fn health_handler() -> StatusCode {
    StatusCode::OK
}
