use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// How the inbound credential looked, without revealing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialPresence {
    Bearer,
    Other,
    Absent,
}

impl CredentialPresence {
    #[must_use]
    pub fn of(headers: &http::HeaderMap) -> Self {
        let Some(value) = headers.get(http::header::AUTHORIZATION) else {
            return Self::Absent;
        };
        let bytes = value.as_bytes();
        if bytes.is_empty() {
            Self::Absent
        } else if bytes.len() > 7 && bytes[..7].eq_ignore_ascii_case(b"bearer ") {
            Self::Bearer
        } else {
            Self::Other
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::Other => "other",
            Self::Absent => "absent",
        }
    }
}

/// Log an inbound request. The credential is reduced to [`CredentialPresence`].
pub fn log_request_start(
    method: &http::Method,
    path: &str,
    remote_addr: Option<SocketAddr>,
    headers: &http::HeaderMap,
) {
    let user_agent = headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let remote = remote_addr.map_or_else(|| "-".to_owned(), |addr| addr.to_string());
    tracing::info!(
        method = %method,
        path,
        remote = %remote,
        user_agent,
        authorization = CredentialPresence::of(headers).as_str(),
        "incoming request"
    );
}

/// Log request completion. For streamed bodies this marks when headers were sent.
pub fn log_request_complete(
    method: &http::Method,
    path: &str,
    status: http::StatusCode,
    elapsed: Duration,
) {
    tracing::info!(
        method = %method,
        path,
        status = status.as_u16(),
        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "request handled"
    );
}
