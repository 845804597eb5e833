//! Streaming fragments: SSE framing and the accumulation loop.
//!
//! A provider turns its HTTP body into a [`FragmentStream`] with
//! [`sse_fragments`]; the chat layer drains it with [`accumulate`], which keeps
//! one growing buffer and hands the whole buffer to a [`DisplaySink`] after
//! every fragment. Single consumer, arrival order, no reordering.

use std::collections::VecDeque;
use std::fmt;

use futures_util::{Stream, StreamExt, stream};
use tracing::trace;

use super::{FragmentStream, ProviderError};

/// Content recorded for a reply that produced no text at all.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "(no response)";

// ── Display sink ──────────────────────────────────────────────────────────────

/// Receives the full accumulated reply after each fragment.
pub trait DisplaySink {
    fn render(&mut self, full: &str);
}

impl<F: FnMut(&str)> DisplaySink for F {
    fn render(&mut self, full: &str) {
        self(full)
    }
}

// ── Accumulator ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: String,
    fragments: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the whole buffer so far.
    pub fn push(&mut self, fragment: &str) -> &str {
        self.buffer.push_str(fragment);
        self.fragments += 1;
        &self.buffer
    }

    /// Final reply text; [`EMPTY_REPLY_PLACEHOLDER`] when nothing arrived.
    pub fn finish(self) -> String {
        if self.buffer.is_empty() {
            EMPTY_REPLY_PLACEHOLDER.to_string()
        } else {
            self.buffer
        }
    }
}

/// Drain `fragments`, re-rendering the full buffer after each non-empty one.
pub async fn accumulate<S>(mut fragments: FragmentStream, sink: &mut S) -> Result<String, ProviderError>
where
    S: DisplaySink + ?Sized,
{
    let mut acc = StreamAccumulator::new();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        sink.render(acc.push(&fragment));
    }
    trace!(fragments = acc.fragments, chars = acc.buffer.len(), "stream complete");
    Ok(acc.finish())
}

// ── SSE framing ───────────────────────────────────────────────────────────────

/// Splits a byte stream into Server-Sent Events `data:` payloads.
///
/// Lines are only decoded once their terminating `\n` has arrived, so a
/// multi-byte character split across network chunks is never cut.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the payloads of every completed `data:` line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(p) = data_payload(&line[..line.len() - 1]) {
                payloads.push(p);
            }
        }
        payloads
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buf);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches('\r');
    line.strip_prefix("data:")
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest).to_string())
}

/// What a provider makes of one `data:` payload.
#[derive(Debug, PartialEq, Eq)]
pub enum SseData {
    Fragment(String),
    /// Keep-alive, role-only delta or other payload without text.
    Skip,
    /// End-of-stream marker.
    Done,
}

pub type SseParser = fn(&str) -> Result<SseData, ProviderError>;

struct SseState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    parse: SseParser,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
}

/// Turn an SSE byte stream into text fragments using `parse` per payload.
///
/// Ends at the parser's [`SseData::Done`] or when the body ends. The first
/// transport or parse error is yielded after any fragments decoded before it,
/// and terminates the stream.
pub fn sse_fragments<S, B, E>(body: S, parse: SseParser) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        parse,
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }

            let payloads = match st.body.next().await {
                Some(Ok(chunk)) => st.decoder.feed(chunk.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ProviderError::Stream(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    st.decoder.finish().into_iter().collect()
                }
            };

            for payload in payloads {
                match (st.parse)(&payload) {
                    Ok(SseData::Fragment(text)) => st.pending.push_back(Ok(text)),
                    Ok(SseData::Skip) => {}
                    Ok(SseData::Done) => {
                        st.finished = true;
                        break;
                    }
                    Err(e) => {
                        st.pending.push_back(Err(e));
                        st.finished = true;
                        break;
                    }
                }
            }
        }
    }))
}
