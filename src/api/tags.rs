use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::error::ProxyError;
use crate::protocol::ollama::{ModelDescriptor, ModelDetails, TagsResponse};
use crate::protocol::openai::{BackendModel, ModelList};
use crate::protocol::rfc3339_from_unix;
use crate::state::AppState;
use crate::transport::{credential_header, HttpTransport};

/// `GET /api/tags`. Any failure is a 500 envelope; nothing partial is returned.
pub async fn handler(state: Arc<AppState>, headers: &HeaderMap) -> Response {
    let credential = credential_header(headers);
    match fetch_catalog(
        &state.transport,
        &state.config.backend.allowed_models,
        credential.as_ref(),
    )
    .await
    {
        Ok(tags) => Json(tags).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "model catalog request failed");
            err.into_response_with_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// List backend models, keep the allowed ones, reshape them as descriptors.
///
/// # Errors
///
/// Propagates transport errors and returns [`ProxyError::Decode`] when the
/// backend body is not a model list.
pub async fn fetch_catalog(
    transport: &HttpTransport,
    allowed: &[String],
    credential: Option<&HeaderValue>,
) -> Result<TagsResponse, ProxyError> {
    let body = transport.get_models(credential).await?;
    let list: ModelList = serde_json::from_slice(&body)
        .map_err(|err| ProxyError::Decode(format!("invalid model list: {err}")))?;
    let total = list.data.len();
    let models = filter_and_map(list.data, allowed);
    tracing::debug!(total, exposed = models.len(), "model catalog fetched");
    Ok(TagsResponse { models })
}

/// Keep backend order; an empty allow-list keeps everything.
#[must_use]
pub fn filter_and_map(models: Vec<BackendModel>, allowed: &[String]) -> Vec<ModelDescriptor> {
    models
        .into_iter()
        .filter(|model| allowed.is_empty() || allowed.iter().any(|id| *id == model.id))
        .map(describe)
        .collect()
}

fn describe(model: BackendModel) -> ModelDescriptor {
    ModelDescriptor {
        modified_at: rfc3339_from_unix(model.created.unwrap_or(0)),
        name: model.id.clone(),
        model: model.id,
        size: 0,
        digest: String::new(),
        details: ModelDetails::default(),
    }
}
