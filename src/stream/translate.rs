//! Mapping of extracted deltas onto client records.

use std::sync::Arc;

use bytes::Bytes;

use super::delta::Delta;
use crate::protocol::ollama::{AssistantMessage, ChatChunk, ASSISTANT_ROLE};

/// One client-visible record, produced per backend data event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedChunk {
    pub model: Arc<str>,
    pub role: &'static str,
    pub content: String,
    /// Carried for logging only; the record does not encode it and stream
    /// termination is driven by the sentinel.
    pub is_final: bool,
}

/// Map a delta onto a record for the session's requested model.
#[must_use]
pub fn translate(delta: Delta, model: &Arc<str>) -> TranslatedChunk {
    TranslatedChunk {
        model: Arc::clone(model),
        role: ASSISTANT_ROLE,
        content: delta.content,
        is_final: delta.is_final,
    }
}

impl TranslatedChunk {
    /// Encode as one NDJSON line: the JSON object followed by `\n`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for string-only records.
    pub fn to_ndjson_line(&self) -> Result<Bytes, serde_json::Error> {
        let record = ChatChunk {
            model: &self.model,
            message: AssistantMessage {
                role: self.role,
                content: &self.content,
            },
        };
        let mut out = Vec::with_capacity(48 + self.model.len() + self.content.len());
        serde_json::to_writer(&mut out, &record)?;
        out.push(b'\n');
        Ok(Bytes::from(out))
    }
}
