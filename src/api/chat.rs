use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use tracing::Instrument;

use crate::error::ProxyError;
use crate::protocol::ollama::{ChatMessage, ChatRequest, ChatResponse, ValidChatRequest, ASSISTANT_ROLE};
use crate::protocol::openai::{ChatCompletion, ChatCompletionRequest};
use crate::protocol::rfc3339_from_unix;
use crate::state::AppState;
use crate::stream::open_session;
use crate::transport::credential_header;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// `POST /api/chat`.
pub async fn handler(state: Arc<AppState>, headers: &HeaderMap, body: Bytes) -> Response {
    let request = match parse_chat_request(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting chat request");
            return err.into_response();
        }
    };
    let credential = credential_header(headers);
    let session_id = state.next_session_id();
    let span = tracing::info_span!(
        "chat",
        session = %session_id,
        model = %request.model,
        stream = request.stream
    );
    if request.options.is_some() {
        tracing::debug!(parent: &span, "ignoring sampling options");
    }

    if request.stream {
        let opened = open_session(
            &state.transport,
            &request,
            credential.as_ref(),
            session_id,
            span,
        )
        .await;
        match opened {
            Ok(session) => ndjson_response(Body::from_stream(session.into_body_stream())),
            Err(err) => err.into_response(),
        }
    } else {
        match complete(&state, &request, credential.as_ref())
            .instrument(span)
            .await
        {
            Ok(reply) => Json(reply).into_response(),
            Err(err) => err.into_response(),
        }
    }
}

/// Decode and validate a chat body.
///
/// # Errors
///
/// Returns [`ProxyError::InvalidRequest`] for malformed JSON or a missing
/// `model`/`messages` field.
pub fn parse_chat_request(body: &[u8]) -> Result<ValidChatRequest, ProxyError> {
    let request: ChatRequest = serde_json::from_slice(body)
        .map_err(|err| ProxyError::InvalidRequest(format!("malformed JSON body: {err}")))?;
    request.validate().map_err(ProxyError::InvalidRequest)
}

fn ndjson_response(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE)),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response()
}

async fn complete(
    state: &AppState,
    request: &ValidChatRequest,
    credential: Option<&HeaderValue>,
) -> Result<ChatResponse, ProxyError> {
    let body = serde_json::to_vec(&ChatCompletionRequest {
        model: &request.model,
        messages: &request.messages,
        stream: false,
    })
    .map_err(|err| ProxyError::Internal(format!("failed to encode backend request: {err}")))?;

    let response = state
        .transport
        .post_chat(Bytes::from(body), credential, false)
        .await?;
    let raw = response.bytes().await.map_err(|err| {
        ProxyError::BackendUnreachable(format!("failed to read backend response: {err}"))
    })?;
    let completion: ChatCompletion = serde_json::from_slice(&raw).map_err(|err| {
        tracing::warn!(error = %err, "backend completion is not valid JSON");
        ProxyError::Decode(err.to_string())
    })?;
    to_chat_response(completion, &request.model)
}

/// Reshape a backend `chat.completion` into the single-object chat reply.
///
/// # Errors
///
/// Returns [`ProxyError::Decode`] when the completion has no choices.
pub fn to_chat_response(
    completion: ChatCompletion,
    requested_model: &str,
) -> Result<ChatResponse, ProxyError> {
    let Some(choice) = completion.choices.into_iter().next() else {
        return Err(ProxyError::Decode("backend returned no choices".to_owned()));
    };
    let message = choice.message.unwrap_or_default();
    let created = completion
        .created
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    Ok(ChatResponse {
        model: completion
            .model
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| requested_model.to_owned()),
        created_at: rfc3339_from_unix(created),
        message: ChatMessage::new(
            message
                .role
                .filter(|role| !role.is_empty())
                .unwrap_or_else(|| ASSISTANT_ROLE.to_owned()),
            message.content.unwrap_or_default(),
        ),
        done: true,
    })
}
