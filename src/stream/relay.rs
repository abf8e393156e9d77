//! Per-request relay from the backend event stream to the client NDJSON body.
//!
//! A [`StreamSession`] moves through `Init -> Streaming -> Done | Failed`:
//!
//! - `Init`: the backend request is issued by [`open_session`]. A connect
//!   failure or a non-2xx reply moves the session to `Failed` and becomes a
//!   [`ProxyError`] before any client bytes exist, so the caller can still
//!   answer with an error envelope.
//! - `Streaming`: each pull of the body stream pulls backend lines until one
//!   yields a record. `Malformed` and `Ignorable` lines are skipped.
//! - `Done`: sentinel seen or backend body ended. The backend stream is dropped.
//! - `Failed`: backend fault after the client response started. The client
//!   body just ends; nothing more can be signalled on it.
//!
//! The session is driven by the client body being polled. Nothing is read
//! from the backend until the transport asks for the next frame. Every poll
//! runs inside the session's span.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::HeaderValue;
use tracing::Instrument;

use super::delta::extract_delta;
use super::event::{decode_line, BackendEvent};
use super::lines::{line_stream, BoxError};
use super::translate::translate;
use crate::error::ProxyError;
use crate::protocol::ollama::ValidChatRequest;
use crate::protocol::openai::ChatCompletionRequest;
use crate::transport::HttpTransport;

const LOG_PREVIEW_LIMIT: usize = 512;

type LineStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Init,
    Streaming,
    Done,
    Failed,
}

/// Context of one streamed chat exchange. Not shared between requests.
pub struct StreamSession {
    id: uuid::Uuid,
    model: Arc<str>,
    state: RelayState,
    lines: Option<LineStream>,
    records: u64,
    started: Instant,
    span: tracing::Span,
}

/// Issue the streaming backend request for `request`, logging under `span`.
///
/// # Errors
///
/// Returns [`ProxyError::BackendUnreachable`] when the connection fails and
/// [`ProxyError::Backend`] when the backend answers with a non-2xx status.
pub async fn open_session(
    transport: &HttpTransport,
    request: &ValidChatRequest,
    credential: Option<&HeaderValue>,
    id: uuid::Uuid,
    span: tracing::Span,
) -> Result<StreamSession, ProxyError> {
    let mut session = StreamSession::new(id, Arc::from(request.model.as_str()), span);
    let body = serde_json::to_vec(&ChatCompletionRequest {
        model: &request.model,
        messages: &request.messages,
        stream: true,
    })
    .map_err(|err| {
        session.state = RelayState::Failed;
        ProxyError::Internal(format!("failed to encode backend request: {err}"))
    })?;

    let span = session.span.clone();
    let sent = transport
        .post_chat(Bytes::from(body), credential, true)
        .instrument(span.clone())
        .await;
    match sent {
        Ok(response) => {
            tracing::debug!(parent: &span, "backend stream opened");
            session.attach(response.bytes_stream());
            Ok(session)
        }
        Err(err) => {
            tracing::warn!(parent: &span, error = %err, "backend stream could not be opened");
            session.state = RelayState::Failed;
            Err(err)
        }
    }
}

impl StreamSession {
    fn new(id: uuid::Uuid, model: Arc<str>, span: tracing::Span) -> Self {
        Self {
            id,
            model,
            state: RelayState::Init,
            lines: None,
            records: 0,
            started: Instant::now(),
            span,
        }
    }

    fn attach<S, B, E>(&mut self, byte_stream: S)
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.lines = Some(Box::pin(line_stream(byte_stream)));
        self.state = RelayState::Streaming;
    }

    /// Build a session in the `Streaming` state over an already-open byte stream.
    pub fn from_byte_stream<S, B, E>(id: uuid::Uuid, model: Arc<str>, byte_stream: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let span = tracing::info_span!("chat", session = %id, model = %model);
        let mut session = Self::new(id, model, span);
        session.attach(byte_stream);
        session
    }

    #[must_use]
    pub fn state(&self) -> RelayState {
        self.state
    }

    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Pull backend lines until the next client record is ready.
    ///
    /// Returns `None` once the session is `Done` or `Failed`.
    pub async fn next_record(&mut self) -> Option<Bytes> {
        loop {
            if self.state != RelayState::Streaming {
                return None;
            }
            let lines = self.lines.as_mut()?;
            let line = match lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    tracing::warn!(
                        session = %self.id,
                        model = %self.model,
                        records = self.records,
                        error = %err,
                        "backend stream failed mid-response, ending client stream"
                    );
                    self.finish(RelayState::Failed);
                    return None;
                }
                None => {
                    tracing::debug!(
                        session = %self.id,
                        model = %self.model,
                        "backend stream ended without sentinel"
                    );
                    self.finish(RelayState::Done);
                    return None;
                }
            };

            match decode_line(&line) {
                BackendEvent::Data(payload) => {
                    let delta = extract_delta(&payload, &self.model);
                    let chunk = translate(delta, &self.model);
                    match chunk.to_ndjson_line() {
                        Ok(record) => {
                            self.records += 1;
                            if chunk.is_final {
                                tracing::trace!(session = %self.id, "backend reported finish_reason");
                            }
                            return Some(record);
                        }
                        Err(err) => {
                            tracing::error!(
                                session = %self.id,
                                model = %self.model,
                                error = %err,
                                "failed to encode client record"
                            );
                            self.finish(RelayState::Failed);
                            return None;
                        }
                    }
                }
                BackendEvent::Sentinel => {
                    self.finish(RelayState::Done);
                    return None;
                }
                BackendEvent::Malformed(reason) => {
                    tracing::warn!(
                        session = %self.id,
                        model = %self.model,
                        reason = %reason,
                        line = %preview(&line),
                        "skipping undecodable backend line"
                    );
                }
                BackendEvent::Ignorable => {}
            }
        }
    }

    fn finish(&mut self, state: RelayState) {
        self.state = state;
        // Dropping the line stream releases the backend connection.
        self.lines = None;
        tracing::info!(
            session = %self.id,
            model = %self.model,
            records = self.records,
            outcome = if state == RelayState::Done { "done" } else { "failed" },
            elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "chat stream finished"
        );
    }

    /// Turn the session into a client body stream, one frame per record.
    pub fn into_body_stream(self) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
        futures_util::stream::unfold(self, |mut session| async move {
            let span = session.span.clone();
            let record = session.next_record().instrument(span).await?;
            Some((Ok(record), session))
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.state == RelayState::Streaming {
            let _entered = self.span.enter();
            tracing::info!(
                session = %self.id,
                model = %self.model,
                records = self.records,
                "client went away, releasing backend stream"
            );
        }
    }
}

fn preview(line: &[u8]) -> String {
    let text = String::from_utf8_lossy(line);
    if text.len() <= LOG_PREVIEW_LIMIT {
        return text.into_owned();
    }
    let mut end = LOG_PREVIEW_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
