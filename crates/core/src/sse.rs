//! Incremental `text/event-stream` decoding.
//!
//! The chat endpoint frames each model chunk as a server-sent event. Bytes may
//! arrive split at any point (mid-line, mid-codepoint), so the decoder buffers
//! until a full line is available and dispatches an event on each blank line.

use crate::error::{BackendError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use std::collections::VecDeque;
use std::fmt::Display;

/// Marker the backend prefixes to a data payload when generation fails mid-stream.
pub const ERROR_MARKER: &str = "[Error]:";

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if the server set one.
    pub event: Option<String>,
    /// All `data:` lines of the event joined with `\n`.
    pub data: String,
}

/// Line-buffering SSE parser.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every event completed by them, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            // `id`, `retry` and unknown fields carry nothing the chat needs.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = self.data.take()?;
        if data.is_empty() {
            return None;
        }
        Some(SseEvent { event, data })
    }
}

/// Maps a dispatched event to a chat item. Only untyped or `message` events
/// carry chat text; other event types are skipped.
fn into_chunk(event: SseEvent) -> Option<Result<String>> {
    if event.event.as_deref().is_some_and(|kind| kind != "message") {
        return None;
    }
    Some(match event.data.strip_prefix(ERROR_MARKER) {
        Some(reason) => Err(BackendError::Stream(reason.trim().to_string())),
        None => Ok(event.data),
    })
}

/// Adapts a raw byte stream into a stream of chat text chunks.
///
/// The returned stream ends after the first error item: a transport failure or
/// an in-band error marker terminates the feed.
pub fn chat_chunks<S, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display,
{
    struct State<S> {
        bytes: std::pin::Pin<Box<S>>,
        decoder: SseDecoder,
        pending: VecDeque<Result<String>>,
        done: bool,
    }

    let state = State {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.done = true;
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state
                        .pending
                        .extend(state.decoder.feed(&chunk).into_iter().filter_map(into_chunk));
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(BackendError::Stream(e.to_string())));
                }
                None => state.done = true,
            }
        }
    })
}
