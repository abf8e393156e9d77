use std::sync::Arc;

use axum::response::Json;

use crate::protocol::ollama::VersionResponse;
use crate::state::AppState;

/// `GET /api/version`. Some clients call this before anything else.
#[must_use]
pub fn handler(state: &Arc<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: state.config.features.reported_version.clone(),
    })
}
