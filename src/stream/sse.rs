//! Incremental SSE (Server-Sent Events) parsing over an HTTP body stream.
//!
//! Follows the field rules of the
//! [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html):
//! `data:` lines accumulate, an empty line dispatches, `:` starts a comment.
use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;

use crate::error::AdapterError;

/// A parsed SSE frame from the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Unnamed single-payload frame.
    #[must_use]
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }

    /// Whether this frame is the `[DONE]` sentinel some backends send last.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

struct PendingEvents {
    events: SmallVec<[SseEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn new() -> Self {
        Self {
            events: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<SseEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = std::mem::take(&mut self.events[self.head]);
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<SseEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.extend(parsed.drain(..));
    }
}

/// Field state of the frame currently being assembled.
#[derive(Debug, Default)]
struct FrameState {
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
    last_event_id: Option<String>,
}

impl FrameState {
    fn process_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if self.has_data {
                out.push(SseEvent {
                    event: self.event_type.take(),
                    data: std::mem::take(&mut self.data_buffer),
                    id: self.last_event_id.clone(),
                });
                self.has_data = false;
            } else {
                self.event_type = None;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if self.has_data {
                self.data_buffer.push('\n');
            } else {
                self.has_data = true;
            }
            self.data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.event_type = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.last_event_id = Some(value.to_string());
        }
        // `retry:` and unknown field names are ignored
    }
}

/// Incremental SSE line parser.
///
/// Feed it text chunks split at arbitrary boundaries and it yields fully
/// assembled [`SseEvent`] frames.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    frame: FrameState,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any complete events parsed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let Self {
            buffer,
            read_offset,
            frame,
        } = self;
        let mut processed_up_to = *read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &buffer[processed_up_to..line_end];
            frame.process_line(line.strip_suffix('\r').unwrap_or(line), out);
            processed_up_to = line_end + 1;
        }

        *read_offset = processed_up_to;
        if *read_offset == buffer.len() {
            buffer.clear();
            *read_offset = 0;
            return;
        }
        let should_compact =
            *read_offset > 0 && (*read_offset >= buffer.len() / 2 || *read_offset >= 8 * 1024);
        if should_compact {
            buffer.drain(..*read_offset);
            *read_offset = 0;
        }
    }

    /// Dispatch whatever is buffered at end of input, including a final
    /// frame that was not followed by a blank line.
    pub fn flush_into(&mut self, out: &mut Vec<SseEvent>) {
        if self.read_offset < self.buffer.len() {
            let tail = &self.buffer[self.read_offset..];
            self.frame
                .process_line(tail.strip_suffix('\r').unwrap_or(tail), out);
        }
        self.buffer.clear();
        self.read_offset = 0;
        self.frame.process_line("", out);
    }
}

/// Decode as much of `remainder` as is valid UTF-8 and feed it to `parser`.
///
/// A multi-byte character split across chunks stays in `remainder` until the
/// rest arrives; invalid sequences are replaced with U+FFFD.
fn feed_utf8(parser: &mut SseParser, remainder: &mut Vec<u8>, out: &mut Vec<SseEvent>) {
    while !remainder.is_empty() {
        match std::str::from_utf8(remainder) {
            Ok(text) => {
                parser.feed_into(text, out);
                remainder.clear();
            }
            Err(e) => {
                let consumed = match e.error_len() {
                    None => e.valid_up_to(),
                    Some(len) => e.valid_up_to() + len,
                };
                if consumed == 0 {
                    return;
                }
                let text = String::from_utf8_lossy(&remainder[..consumed]).into_owned();
                parser.feed_into(&text, out);
                remainder.drain(..consumed);
                if e.error_len().is_none() {
                    return;
                }
            }
        }
    }
}

/// Split a byte stream into SSE events using [`SseParser`].
///
/// A body read error is yielded once as [`AdapterError::Transport`] and ends
/// the stream. A trailing unterminated frame is dispatched at end of input.
pub fn sse_frame_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<SseEvent, AdapterError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    struct State<S> {
        stream: std::pin::Pin<Box<S>>,
        parser: SseParser,
        remainder: Vec<u8>,
        parsed: Vec<SseEvent>,
        pending: PendingEvents,
        done: bool,
    }

    let state = State {
        stream: Box::pin(byte_stream),
        parser: SseParser::new(),
        remainder: Vec::new(),
        parsed: Vec::with_capacity(8),
        pending: PendingEvents::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }

            match state.stream.as_mut().next().await {
                Some(Ok(bytes)) => {
                    if state.remainder.is_empty() {
                        if let Ok(text) = std::str::from_utf8(&bytes) {
                            state.parser.feed_into(text, &mut state.parsed);
                        } else {
                            state.remainder.extend_from_slice(&bytes);
                            feed_utf8(&mut state.parser, &mut state.remainder, &mut state.parsed);
                        }
                    } else {
                        state.remainder.extend_from_slice(&bytes);
                        feed_utf8(&mut state.parser, &mut state.remainder, &mut state.parsed);
                    }
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((
                        Err(AdapterError::Transport(format!(
                            "failed to read event stream: {err}"
                        ))),
                        state,
                    ));
                }
                None => {
                    state.done = true;
                    if !state.remainder.is_empty() {
                        let text = String::from_utf8_lossy(&state.remainder).into_owned();
                        state.remainder.clear();
                        state.parser.feed_into(&text, &mut state.parsed);
                    }
                    state.parser.flush_into(&mut state.parsed);
                }
            }
            state.pending.extend_from_vec(&mut state.parsed);
        }
    })
}
