pub mod ollama;
pub mod openai;

/// Render a unix timestamp (seconds) as RFC 3339 UTC, e.g. `2024-05-01T12:00:00Z`.
///
/// Out-of-range values fall back to the unix epoch.
#[must_use]
pub fn rfc3339_from_unix(secs: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
