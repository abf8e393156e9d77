use serde_json::json;

/// Error type surfaced to clients as a single JSON error envelope.
///
/// Per-line decode and extraction failures inside a running stream are
/// recovered locally and never become a `ProxyError`.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Backend unreachable: {0}")]
    BackendUnreachable(String),
    #[error("Backend error: status={status}, message={message}")]
    Backend { status: u16, message: String },
    #[error("Failed to decode backend response: {0}")]
    Decode(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    NotImplemented,
    ServerError,
    Unknown,
}

/// Map a backend HTTP status code to an error category.
#[must_use]
pub fn category_from_backend_status(status: u16) -> ErrorCategory {
    match status {
        400 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        404 => ErrorCategory::NotFound,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl ProxyError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProxyError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            ProxyError::NotImplemented(_) => ErrorCategory::NotImplemented,
            ProxyError::Config(_)
            | ProxyError::BackendUnreachable(_)
            | ProxyError::Decode(_)
            | ProxyError::Internal(_) => ErrorCategory::ServerError,
            ProxyError::Backend { status, .. } => category_from_backend_status(*status),
        }
    }

    /// Status code returned to the client for this error.
    ///
    /// Backend 4xx/5xx codes are relayed verbatim; anything else falls back
    /// to the category mapping.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        if let ProxyError::Backend { status, .. } = self {
            if (400..=599).contains(status) {
                if let Ok(code) = http::StatusCode::from_u16(*status) {
                    return code;
                }
            }
        }
        http_status_for_category(self.category())
    }

    /// Message placed in the envelope. Backend errors carry the backend's own text.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ProxyError::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::Permission => http::StatusCode::FORBIDDEN,
        ErrorCategory::NotFound => http::StatusCode::NOT_FOUND,
        ErrorCategory::RateLimit => http::StatusCode::TOO_MANY_REQUESTS,
        ErrorCategory::NotImplemented => http::StatusCode::NOT_IMPLEMENTED,
        ErrorCategory::ServerError | ErrorCategory::Unknown => {
            http::StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Format an error as `(status_code, {"error": message})`.
#[must_use]
pub fn format_error(err: &ProxyError) -> (http::StatusCode, serde_json::Value) {
    (err.status_code(), error_envelope(&err.client_message()))
}

fn error_envelope(message: &str) -> serde_json::Value {
    json!({ "error": message })
}

/// Pull a human-readable message out of a backend error body.
///
/// OpenAI-style bodies carry `{"error":{"message":...}}`; some servers use a
/// bare string under `error` or `message`. Falls back to the raw text.
#[must_use]
pub fn backend_error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|v| v.is_string()))
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = message {
            return message.to_owned();
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "empty error body from backend".to_owned()
    } else {
        text.to_owned()
    }
}

impl ProxyError {
    /// The usual envelope, but answered with `status` instead of [`ProxyError::status_code`].
    #[must_use]
    pub fn into_response_with_status(self, status: http::StatusCode) -> axum::response::Response {
        use axum::response::IntoResponse;
        (status, axum::Json(error_envelope(&self.client_message()))).into_response()
    }
}

impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        self.into_response_with_status(status)
    }
}
