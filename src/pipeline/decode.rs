//! SSE framing (Bytes -> frame payloads)
//!
//! Frames are split on the configured delimiter after carriage returns are
//! stripped. Each frame's `data:` lines are joined with `\n`; comment lines and
//! other SSE fields (`event:`, `id:`, `retry:`) are ignored. The done signal ends
//! the stream. Payloads are returned as raw bytes: UTF-8 and JSON are checked by
//! the event decoder, so a malformed frame fails on its own instead of ending
//! the stream or being silently repaired.

use crate::config::DecoderConfig;
use crate::pipeline::FrameDecoder;
use crate::{BoxStream, PipeResult};
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::collections::VecDeque;
use tracing::debug;

/// Incremental, synchronous SSE frame parser.
///
/// Bytes are buffered until a full frame is available, so multi-byte UTF-8
/// characters split across chunks are reassembled before decoding.
#[derive(Debug, Clone)]
pub struct SseFrameParser {
    delimiter: Vec<u8>,
    done_signal: String,
    buf: Vec<u8>,
    /// Offset before which `buf` holds no delimiter start.
    scanned: usize,
    done: bool,
}

impl SseFrameParser {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            delimiter: config.delimiter.replace('\r', "").into_bytes(),
            done_signal: config.done_signal.clone(),
            buf: Vec::new(),
            scanned: 0,
            done: false,
        }
    }

    /// Appends a chunk and drains every complete frame payload.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut payloads = Vec::new();
        if self.done {
            return payloads;
        }
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        while let Some(idx) = find(&self.buf, &self.delimiter, self.scanned) {
            let frame: Vec<u8> = self.buf.drain(..idx + self.delimiter.len()).collect();
            self.scanned = 0;
            match self.payload(&frame[..idx]) {
                Some(Frame::Data(payload)) => payloads.push(payload),
                Some(Frame::Done) => {
                    self.done = true;
                    self.buf.clear();
                    break;
                }
                None => {}
            }
        }
        // A delimiter may still complete across the tail of the buffer.
        self.scanned = (self.buf.len() + 1).saturating_sub(self.delimiter.len());
        payloads
    }

    /// Flushes a trailing frame left without a delimiter at end of input.
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.done {
            return None;
        }
        self.done = true;
        let rest = std::mem::take(&mut self.buf);
        match self.payload(&rest) {
            Some(Frame::Data(payload)) => Some(payload),
            _ => None,
        }
    }

    /// Whether the done signal (or end of input) was reached.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn payload(&self, frame: &[u8]) -> Option<Frame> {
        let mut data: Vec<&[u8]> = Vec::new();
        for line in frame.split(|b| *b == b'\n') {
            if line.first() == Some(&b':') {
                continue;
            }
            if let Some(value) = line.strip_prefix(b"data:") {
                data.push(value.strip_prefix(b" ").unwrap_or(value));
            }
        }
        if data.is_empty() {
            return None;
        }

        let payload = data.join(&b'\n');
        let trimmed = trim_ascii(&payload);
        if trimmed == self.done_signal.as_bytes() {
            debug!("sse done signal received");
            return Some(Frame::Done);
        }
        if trimmed.is_empty() {
            return None;
        }
        Some(Frame::Data(Bytes::from(payload)))
    }
}

enum Frame {
    Data(Bytes),
    Done,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < from + needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|idx| idx + from)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);
    &bytes[start..end]
}

/// Streaming SSE decoder built on [`SseFrameParser`].
pub struct SseDecoder {
    config: DecoderConfig,
}

impl SseDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

struct DecodeState {
    input: BoxStream<'static, Bytes>,
    parser: SseFrameParser,
    pending: VecDeque<Bytes>,
    exhausted: bool,
}

#[async_trait::async_trait]
impl FrameDecoder for SseDecoder {
    async fn decode_stream(
        &self,
        input: BoxStream<'static, Bytes>,
    ) -> PipeResult<BoxStream<'static, Bytes>> {
        let state = DecodeState {
            input,
            parser: SseFrameParser::new(&self.config),
            pending: VecDeque::new(),
            exhausted: false,
        };

        let stream = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(payload) = state.pending.pop_front() {
                    return Some((Ok(payload), state));
                }
                if state.exhausted || state.parser.is_done() {
                    return None;
                }

                match state.input.next().await {
                    Some(Ok(bytes)) => {
                        let payloads = state.parser.feed(&bytes);
                        state.pending.extend(payloads);
                    }
                    Some(Err(e)) => {
                        // Transport failures end the stream after being reported.
                        state.exhausted = true;
                        return Some((Err(e), state));
                    }
                    None => {
                        state.exhausted = true;
                        state.pending.extend(state.parser.finish());
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
