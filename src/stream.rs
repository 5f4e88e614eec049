//! Server-sent event framing for streamed chat completions.
//!
//! Only `data:` fields matter here; `event:`, `id:` and comment lines are
//! dropped. A payload of `[DONE]` ends the feed.

use std::collections::VecDeque;
use std::mem;

use futures_core::Stream;
use futures_util::{StreamExt, stream};

use crate::error::ChatError;
use crate::http::HttpBodyStream;

const DONE_MARKER: &str = "[DONE]";

/// 增量 SSE 分帧器 输入任意切分的字节 输出完整事件的 data
#[derive(Debug, Default)]
pub struct SseFramer {
    partial: Vec<u8>,
    event: Vec<u8>,
    has_data: bool,
}

impl SseFramer {
    /// Consumes `bytes` and returns the payload of every event they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.partial.extend_from_slice(bytes);
        let mut ready = Vec::new();
        while let Some(end) = self.partial.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=end).collect();
            let line = trim_line_end(&line);
            if line.is_empty() {
                ready.extend(self.take_event());
            } else {
                self.push_line(line);
            }
        }
        ready
    }

    /// Flushes an event the body left unterminated.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = mem::take(&mut self.partial);
        let line = trim_line_end(&rest);
        if !line.is_empty() {
            self.push_line(line);
        }
        self.take_event()
    }

    fn push_line(&mut self, line: &[u8]) {
        let Some(value) = line.strip_prefix(b"data:") else {
            return;
        };
        let value = value.strip_prefix(b" ").unwrap_or(value);
        if self.has_data {
            self.event.push(b'\n');
        }
        self.event.extend_from_slice(value);
        self.has_data = true;
    }

    fn take_event(&mut self) -> Option<Vec<u8>> {
        if !mem::take(&mut self.has_data) {
            return None;
        }
        Some(mem::take(&mut self.event)).filter(|event| !event.is_empty())
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

struct SseState {
    body: HttpBodyStream,
    framer: SseFramer,
    ready: VecDeque<Vec<u8>>,
    body_done: bool,
    adapter: &'static str,
}

/// Decodes an SSE body into its `data:` payloads, stopping at `[DONE]`.
///
/// The stream ends after the first error.
pub fn sse_data(
    body: HttpBodyStream,
    adapter: &'static str,
) -> impl Stream<Item = Result<String, ChatError>> + Send {
    let state = SseState {
        body,
        framer: SseFramer::default(),
        ready: VecDeque::new(),
        body_done: false,
        adapter,
    };
    stream::try_unfold(state, next_payload)
}

async fn next_payload(mut state: SseState) -> Result<Option<(String, SseState)>, ChatError> {
    loop {
        if let Some(raw) = state.ready.pop_front() {
            let text = String::from_utf8(raw).map_err(|err| {
                ChatError::provider(state.adapter, format!("invalid UTF-8 in stream chunk: {err}"))
            })?;
            if text.trim() == DONE_MARKER {
                return Ok(None);
            }
            return Ok(Some((text, state)));
        }
        if state.body_done {
            return Ok(None);
        }
        match state.body.next().await {
            Some(chunk) => {
                let events = state.framer.feed(&chunk?);
                state.ready.extend(events);
            }
            None => {
                state.body_done = true;
                state.ready.extend(state.framer.finish());
            }
        }
    }
}

/// Drains a body stream into text, used to read error responses.
pub(crate) async fn collect_body_text(
    mut body: HttpBodyStream,
    adapter: &'static str,
) -> Result<String, ChatError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes)
        .map_err(|err| ChatError::provider(adapter, format!("failed to decode error body: {err}")))
}
