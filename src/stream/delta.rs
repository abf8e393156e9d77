//! Extraction of the incremental token from a backend chunk payload.

use serde_json::Value;

/// What one data event contributes to the reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Text fragment; empty when the chunk carried none.
    pub content: String,
    /// The backend set `finish_reason` on this chunk.
    pub is_final: bool,
}

/// Payload shapes that cannot be read as a chat chunk.
///
/// Absent fields are not errors; only fields present with the wrong type are.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("`choices` is not an array")]
    ChoicesNotArray,
    #[error("first choice is not an object")]
    ChoiceNotObject,
    #[error("`delta` is not an object")]
    DeltaNotObject,
    #[error("`delta.content` is not a string")]
    ContentNotString,
}

/// Read the first choice of a chunk.
///
/// Fallbacks: no `choices`, an empty `choices`, no `delta`, or a missing or
/// `null` `content` all yield empty content. `finish_reason` counts only when
/// it is a non-null string.
///
/// # Errors
///
/// Returns [`ExtractError`] when a field is present with an unexpected type.
pub fn try_extract_delta(payload: &Value) -> Result<Delta, ExtractError> {
    let Some(choices) = payload.get("choices") else {
        return Ok(Delta::default());
    };
    let choices = choices.as_array().ok_or(ExtractError::ChoicesNotArray)?;
    let Some(choice) = choices.first() else {
        return Ok(Delta::default());
    };
    let choice = choice.as_object().ok_or(ExtractError::ChoiceNotObject)?;

    let is_final = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .is_some_and(|reason| !reason.is_empty());

    let content = match choice.get("delta") {
        None | Some(Value::Null) => String::new(),
        Some(Value::Object(delta)) => match delta.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(_) => return Err(ExtractError::ContentNotString),
        },
        Some(_) => return Err(ExtractError::DeltaNotObject),
    };

    Ok(Delta { content, is_final })
}

/// [`try_extract_delta`] with failures logged and replaced by an empty,
/// non-final delta. Never ends the stream.
#[must_use]
pub fn extract_delta(payload: &Value, model: &str) -> Delta {
    match try_extract_delta(payload) {
        Ok(delta) => delta,
        Err(err) => {
            tracing::warn!(model, error = %err, payload = %payload, "could not extract delta, using empty content");
            Delta::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_extracted() {
        let delta = try_extract_delta(&json!({
            "choices": [{"index": 0, "delta": {"content": "."}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(
            delta,
            Delta {
                content: ".".into(),
                is_final: false
            }
        );
    }

    #[test]
    fn test_final_chunk_with_empty_delta() {
        let delta = try_extract_delta(&json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert_eq!(delta.content, "");
        assert!(delta.is_final);
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        for payload in [
            json!({}),
            json!({"choices": []}),
            json!({"choices": [{}]}),
            json!({"choices": [{"delta": null}]}),
            json!({"choices": [{"delta": {"role": "assistant"}}]}),
            json!({"choices": [{"delta": {"content": null}}]}),
        ] {
            assert_eq!(try_extract_delta(&payload).unwrap(), Delta::default(), "{payload}");
        }
    }

    #[test]
    fn test_only_first_choice_is_read() {
        let delta = try_extract_delta(&json!({
            "choices": [{"delta": {"content": "a"}}, {"delta": {"content": "b"}}]
        }))
        .unwrap();
        assert_eq!(delta.content, "a");
    }

    #[test]
    fn test_wrong_types_are_errors() {
        assert_eq!(
            try_extract_delta(&json!({"choices": {}})),
            Err(ExtractError::ChoicesNotArray)
        );
        assert_eq!(
            try_extract_delta(&json!({"choices": [1]})),
            Err(ExtractError::ChoiceNotObject)
        );
        assert_eq!(
            try_extract_delta(&json!({"choices": [{"delta": "x"}]})),
            Err(ExtractError::DeltaNotObject)
        );
        assert_eq!(
            try_extract_delta(&json!({"choices": [{"delta": {"content": 7}}]})),
            Err(ExtractError::ContentNotString)
        );
    }

    #[test]
    fn test_extract_delta_recovers_from_errors() {
        let delta = extract_delta(&json!({"choices": [{"delta": {"content": ["x"]}}]}), "m");
        assert_eq!(delta, Delta::default());
    }
}
