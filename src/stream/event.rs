//! Classification of framed backend lines.

use serde_json::Value;

/// Lead-in marking a data line.
pub const DATA_PREFIX: &[u8] = b"data:";
/// Payload that ends the backend stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded unit of the backend stream.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A JSON object carrying zero or more choice deltas.
    Data(Value),
    /// The `[DONE]` marker.
    Sentinel,
    /// A line that could not be decoded. Skipped by the relay.
    Malformed(DecodeFailure),
    /// Blank lines, comments, non-data SSE fields and known fragment artifacts.
    Ignorable,
}

/// Why a line could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("line is not valid UTF-8")]
    NotUtf8,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("unrecognized line")]
    UnrecognizedLine,
}

/// Classify one framed line.
#[must_use]
pub fn decode_line(line: &[u8]) -> BackendEvent {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return classify_unprefixed(line);
    };
    let payload = rest.strip_prefix(b" ").unwrap_or(rest);
    let Ok(payload) = std::str::from_utf8(payload) else {
        return BackendEvent::Malformed(DecodeFailure::NotUtf8);
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return BackendEvent::Sentinel;
    }
    if payload.is_empty() || is_fragment_artifact(payload) {
        return BackendEvent::Ignorable;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value @ Value::Object(_)) => BackendEvent::Data(value),
        Ok(_) => BackendEvent::Malformed(DecodeFailure::NotAnObject),
        Err(err) => BackendEvent::Malformed(DecodeFailure::InvalidJson(err.to_string())),
    }
}

fn classify_unprefixed(line: &[u8]) -> BackendEvent {
    let Ok(text) = std::str::from_utf8(line) else {
        return BackendEvent::Malformed(DecodeFailure::NotUtf8);
    };
    let text = text.trim();
    if text.is_empty() || text.starts_with(':') || is_sse_field(text) || is_fragment_artifact(text)
    {
        return BackendEvent::Ignorable;
    }
    BackendEvent::Malformed(DecodeFailure::UnrecognizedLine)
}

fn is_sse_field(text: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| text.starts_with(field))
}

/// A word token directly followed by `:` and a digit, e.g. `undefined:1`.
///
/// Produced when a chunk boundary breaks a line upstream of us; never JSON.
#[must_use]
pub fn is_fragment_artifact(text: &str) -> bool {
    let Some(colon) = text.find(':') else {
        return false;
    };
    let token = &text[..colon];
    let starts_alpha = token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    starts_alpha
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && text[colon + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
}
