//! Line framing for the backend byte stream.
//!
//! Chunks arrive with arbitrary boundaries. [`LineFramer`] carries any trailing
//! partial line over to the next chunk and hands out complete lines without
//! their `\n` / `\r\n` terminator. It performs no semantic filtering: blank
//! lines are emitted like any other line.
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use memchr::memchr;
use smallvec::SmallVec;

/// Boxed error carried by a framed line stream.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Incremental newline splitter. One instance per backend stream.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: BytesMut,
    scan_from: usize,
}

impl LineFramer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
        }
    }

    /// Feed raw bytes and return every line they complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw bytes and append completed lines into a caller-provided buffer.
    pub fn feed_into<O: Extend<Bytes>>(&mut self, chunk: &[u8], out: &mut O) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        while let Some(rel_pos) = memchr(b'\n', &self.buffer[self.scan_from..]) {
            let line_end = self.scan_from + rel_pos;
            let mut line = self.buffer.split_to(line_end + 1);
            line.truncate(line_end);
            if line.last() == Some(&b'\r') {
                line.truncate(line_end - 1);
            }
            out.extend(std::iter::once(line.freeze()));
            self.scan_from = 0;
        }
        // Everything buffered so far is newline-free.
        self.scan_from = self.buffer.len();
    }

    /// Bytes held back waiting for a newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Flush the unterminated tail at end of stream, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scan_from = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let mut tail = self.buffer.split();
        if tail.last() == Some(&b'\r') {
            let len = tail.len();
            tail.truncate(len - 1);
        }
        Some(tail.freeze())
    }
}

struct PendingLines {
    lines: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingLines {
    #[inline]
    fn new() -> Self {
        Self {
            lines: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.lines.len() {
            return None;
        }
        let line = std::mem::take(&mut self.lines[self.head]);
        self.head += 1;
        if self.head == self.lines.len() {
            self.lines.clear();
            self.head = 0;
        }
        Some(line)
    }
}

impl Extend<Bytes> for PendingLines {
    fn extend<T: IntoIterator<Item = Bytes>>(&mut self, iter: T) {
        self.lines.extend(iter);
    }
}

struct LineStreamState<S> {
    source: std::pin::Pin<Box<S>>,
    framer: LineFramer,
    pending: PendingLines,
    exhausted: bool,
}

/// Split a byte stream into logical lines using [`LineFramer`].
///
/// The source is only polled when no complete line is pending, so reading
/// from the backend is paced by whoever consumes this stream. A source error
/// is yielded once and ends the stream; lines already framed before the
/// error are yielded first.
pub fn line_stream<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<Bytes, BoxError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    use futures_util::StreamExt;

    let state = LineStreamState {
        source: Box::pin(byte_stream),
        framer: LineFramer::new(),
        pending: PendingLines::new(),
        exhausted: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                return Some((Ok(line), st));
            }
            if st.exhausted {
                return None;
            }
            match st.source.as_mut().next().await {
                Some(Ok(chunk)) => {
                    st.framer.feed_into(chunk.as_ref(), &mut st.pending);
                }
                Some(Err(err)) => {
                    st.exhausted = true;
                    return Some((Err(err.into()), st));
                }
                None => {
                    st.exhausted = true;
                    if let Some(tail) = st.framer.finish() {
                        return Some((Ok(tail), st));
                    }
                    return None;
                }
            }
        }
    })
}
