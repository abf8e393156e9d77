use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{chat, health, tags, version};
use crate::error::ProxyError;
use crate::observability::{log_request_complete, log_request_start};
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Source-tool endpoints this proxy knows about but does not serve.
const UNIMPLEMENTED_PATHS: &[&str] = &[
    "/api/generate",
    "/api/pull",
    "/api/push",
    "/api/create",
    "/api/ps",
    "/api/copy",
    "/api/delete",
    "/api/show",
    "/api/embed",
    "/api/embeddings",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteMatch<'a> {
    Health,
    Version,
    Tags,
    Chat,
    NotImplemented(&'a str),
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    remote_addr: Option<SocketAddr>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let started = Instant::now();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();
    log_request_start(&parts.method, path, remote_addr, &parts.headers);

    let response = match match_route(&parts.method, path) {
        RouteMatch::Health => health::health_handler().into_response(),
        RouteMatch::Version => version::handler(&state).into_response(),
        RouteMatch::Tags => tags::handler(state, &parts.headers).await,
        RouteMatch::Chat => match read_request_body(body).await {
            Ok(body_bytes) => chat::handler(state, &parts.headers, body_bytes).await,
            Err(response) => response,
        },
        RouteMatch::NotImplemented(endpoint) => {
            ProxyError::NotImplemented(format!("{endpoint} is not supported by this proxy"))
                .into_response()
        }
        RouteMatch::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        RouteMatch::NotFound => StatusCode::NOT_FOUND.into_response(),
    };

    log_request_complete(&parts.method, path, response.status(), started.elapsed());
    Ok(response)
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                axum::Json(serde_json::json!({ "error": "Request body too large (max 2MiB)" })),
            )
                .into_response()
        })
}

fn match_route<'a>(method: &Method, path: &'a str) -> RouteMatch<'a> {
    match path {
        "/" => {
            if method == Method::GET || method == Method::HEAD {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/api/version" => {
            if method == Method::GET {
                RouteMatch::Version
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/api/tags" => {
            if method == Method::GET {
                RouteMatch::Tags
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        "/api/chat" => {
            if method == Method::POST {
                RouteMatch::Chat
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        _ if UNIMPLEMENTED_PATHS.contains(&path) => RouteMatch::NotImplemented(path),
        _ => RouteMatch::NotFound,
    }
}
