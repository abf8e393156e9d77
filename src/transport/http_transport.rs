use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue};

use crate::config::BackendConfig;
use crate::error::{backend_error_message, ProxyError};
use crate::protocol::openai::{CHAT_COMPLETIONS_PATH, MODELS_PATH};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(15);
const EVENT_STREAM: &str = "text/event-stream";
const APPLICATION_JSON: &str = "application/json";

fn build_reqwest_client() -> Result<reqwest::Client, ProxyError> {
    // No overall timeout: a chat stream lives as long as the backend keeps it open.
    reqwest::Client::builder()
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|err| ProxyError::Config(format!("Failed to build HTTP client: {err}")))
}

/// The caller's `Authorization` header, cloned verbatim for the backend.
#[must_use]
pub fn credential_header(headers: &HeaderMap) -> Option<HeaderValue> {
    headers.get(header::AUTHORIZATION).cloned()
}

/// HTTP client for the single OpenAI-compatible backend.
///
/// Sends each request once; there is no retry layer.
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: url::Url,
    models_url: url::Url,
    models_timeout: Duration,
}

impl HttpTransport {
    /// Build the transport for `backend`, resolving both endpoint URLs up front.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the base URL does not form valid
    /// endpoint URLs or the HTTP client cannot be built.
    pub fn new(backend: &BackendConfig) -> Result<Self, ProxyError> {
        let base = backend.base_url.trim_end_matches('/');
        Ok(Self {
            client: build_reqwest_client()?,
            chat_url: endpoint_url(base, CHAT_COMPLETIONS_PATH)?,
            models_url: endpoint_url(base, MODELS_PATH)?,
            models_timeout: Duration::from_secs(backend.models_timeout_secs),
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    #[must_use]
    pub fn models_url(&self) -> &url::Url {
        &self.models_url
    }

    /// POST a chat-completion body. With `stream` set, the response body is
    /// left unread for the caller to consume as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::BackendUnreachable`] when the request cannot be
    /// sent and [`ProxyError::Backend`] for a non-2xx reply.
    pub async fn post_chat(
        &self,
        body: Bytes,
        credential: Option<&HeaderValue>,
        stream: bool,
    ) -> Result<reqwest::Response, ProxyError> {
        let mut request = reqwest::Request::new(http::Method::POST, self.chat_url.clone());
        let headers = request.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(APPLICATION_JSON),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(if stream { EVENT_STREAM } else { APPLICATION_JSON }),
        );
        if let Some(credential) = credential {
            headers.insert(header::AUTHORIZATION, credential.clone());
        }
        *request.body_mut() = Some(reqwest::Body::from(body));
        self.execute(request).await
    }

    /// GET the backend model list and return the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::BackendUnreachable`] on send/read failure or
    /// timeout and [`ProxyError::Backend`] for a non-2xx reply.
    pub async fn get_models(&self, credential: Option<&HeaderValue>) -> Result<Bytes, ProxyError> {
        let mut request = reqwest::Request::new(http::Method::GET, self.models_url.clone());
        *request.timeout_mut() = Some(self.models_timeout);
        request
            .headers_mut()
            .insert(header::ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        if let Some(credential) = credential {
            request
                .headers_mut()
                .insert(header::AUTHORIZATION, credential.clone());
        }
        let response = self.execute(request).await?;
        response.bytes().await.map_err(|err| {
            ProxyError::BackendUnreachable(format!("failed to read model list: {err}"))
        })
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, ProxyError> {
        let url = request.url().clone();
        let response = self.client.execute(request).await.map_err(|err| {
            tracing::debug!(url = %url, error = %err, "backend request failed");
            ProxyError::BackendUnreachable(err.to_string())
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = backend_error_message(&body);
        tracing::warn!(
            url = %url,
            status = status.as_u16(),
            message = %message,
            "backend returned an error status"
        );
        Err(ProxyError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

fn endpoint_url(base: &str, path: &str) -> Result<url::Url, ProxyError> {
    url::Url::parse(&format!("{base}{path}"))
        .map_err(|err| ProxyError::Config(format!("Invalid backend URL '{base}{path}': {err}")))
}
