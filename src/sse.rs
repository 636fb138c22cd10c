//! Server-Sent Events (SSE) decoding.
//!
//! The decoder reads a response body as lines, groups `data:` lines into
//! frames separated by blank lines and decodes each frame's payload as JSON.
//!
//! SSE format:
//! ```text
//! data: {"key": "value"}
//!
//! event: message
//! data: {"another": "event"}
//!
//! data: [DONE]
//! ```
//!
//! States: `AwaitingFrame -> ParsingFrame -> EmittingEvent -> AwaitingFrame`,
//! ending in `Done` (sentinel or end of body) or `Faulted` (transport error or
//! cancellation). A frame that fails to decode yields one error and decoding
//! carries on with the next frame.

use std::marker::PhantomData;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use nonempty::NonEmpty;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::outcome::{decode_payload, ApiError};

/// Payload that ends a stream normally.
pub const DONE_MARKER: &str = "[DONE]";

/// Split an SSE line into its field name and value.
///
/// One space after the colon is part of the separator. Comment lines
/// (starting with `:`) yield `None`.
///
/// # Example
/// ```
/// use aidispatch::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": \"value\"}"), Some(("data", "{\"key\": \"value\"}")));
/// assert_eq!(parse_sse_line("data:[DONE]"), Some(("data", "[DONE]")));
/// assert_eq!(parse_sse_line("event"), Some(("event", "")));
/// assert_eq!(parse_sse_line(": keep-alive"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(':') {
        return None;
    }
    match line.split_once(':') {
        Some((field, value)) => Some((field, value.strip_prefix(' ').unwrap_or(value))),
        None => Some((line, "")),
    }
}

/// Check if an SSE data payload indicates the stream is done.
///
/// # Example
/// ```
/// use aidispatch::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(is_done_marker(" [DONE] "));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"data\": \"value\"}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data.trim() == DONE_MARKER
}

/// Where the decoder is in its frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingFrame,
    ParsingFrame,
    EmittingEvent,
    Done,
    Faulted,
}

impl DecoderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Faulted)
    }
}

/// One decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame<T> {
    /// The SSE `event:` name, when the server sent one.
    pub event: Option<String>,
    /// The SSE `id:` value, when the server sent one.
    pub id: Option<String>,
    pub payload: T,
}

impl<T> EventFrame<T> {
    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// Split a raw SSE line into its field name and value, without assuming UTF-8.
fn split_field(line: &[u8]) -> Option<(&[u8], &[u8])> {
    if line.first() == Some(&b':') {
        return None;
    }
    match line.iter().position(|b| *b == b':') {
        Some(colon) => {
            let value = &line[colon + 1..];
            Some((&line[..colon], value.strip_prefix(b" ").unwrap_or(value)))
        }
        None => Some((line, &[][..])),
    }
}

/// A frame as read from the wire, before its payload is decoded.
///
/// Data lines stay as raw bytes so that a frame with invalid UTF-8 fails on
/// its own when decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: NonEmpty<Bytes>,
}

impl RawFrame {
    /// The frame's `data:` lines joined with newlines.
    pub fn payload(&self) -> Bytes {
        if self.data.tail.is_empty() {
            return self.data.head.clone();
        }
        let lines: Vec<&[u8]> = self.data.iter().map(|line| &line[..]).collect();
        Bytes::from(lines.join(&b'\n'))
    }

    pub fn is_done_marker(&self) -> bool {
        self.data.tail.is_empty() && std::str::from_utf8(&self.data.head).is_ok_and(is_done_marker)
    }
}

#[derive(Debug, Default)]
struct PendingFrame {
    event: Option<String>,
    id: Option<String>,
    data: Option<NonEmpty<Bytes>>,
}

impl PendingFrame {
    fn push_line(&mut self, line: Bytes) {
        let Some((field, value)) = split_field(&line) else {
            return;
        };
        match field {
            b"data" => {
                let value = line.slice_ref(value);
                match &mut self.data {
                    Some(data) => data.push(value),
                    None => self.data = Some(NonEmpty::new(value)),
                }
            }
            b"event" => self.event = Some(String::from_utf8_lossy(value).into_owned()),
            b"id" => self.id = Some(String::from_utf8_lossy(value).into_owned()),
            // `retry` and unknown fields carry nothing we deliver
            _ => {}
        }
    }

    fn is_empty(&self) -> bool {
        self.event.is_none() && self.id.is_none() && self.data.is_none()
    }

    /// Complete the frame; a frame without data lines is dropped.
    fn take(&mut self) -> Option<RawFrame> {
        let frame = std::mem::take(self);
        frame.data.map(|data| RawFrame {
            event: frame.event,
            id: frame.id,
            data,
        })
    }
}

/// Internal unit handed to the delivery adapters.
#[derive(Debug)]
pub(crate) enum Step<T> {
    Event(Result<EventFrame<T>, ApiError>),
    Faulted(ApiError),
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

/// Incremental decoder over a streamed response body.
pub struct StreamDecoder<T> {
    body: ByteStream,
    buffer: BytesMut,
    /// Leading bytes of `buffer` already known to hold no line break.
    scanned: usize,
    body_ended: bool,
    pending: PendingFrame,
    state: DecoderState,
    status: StatusCode,
    cancel: CancellationToken,
    frames: usize,
    _payload: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> StreamDecoder<T> {
    /// Decode `body`, a stream of chunks from a response with `status`.
    pub fn new<S, E>(body: S, status: StatusCode, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            body: Box::pin(body.map(|chunk| chunk.map_err(ApiError::transport))),
            buffer: BytesMut::new(),
            scanned: 0,
            body_ended: false,
            pending: PendingFrame::default(),
            state: DecoderState::AwaitingFrame,
            status,
            cancel,
            frames: 0,
            _payload: PhantomData,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Number of frames emitted so far, including frames that failed to decode.
    pub fn frames_emitted(&self) -> usize {
        self.frames
    }

    /// Advance to the next frame.
    ///
    /// Returns `None` once the stream is done, and after a fault has been
    /// reported.
    pub(crate) async fn next_step(&mut self) -> Option<Step<T>> {
        if self.state.is_terminal() {
            return None;
        }
        if self.cancel.is_cancelled() {
            return Some(self.fault(ApiError::Cancelled));
        }
        if self.state == DecoderState::EmittingEvent {
            self.state = DecoderState::AwaitingFrame;
        }

        let frame = match self.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.finish();
                return None;
            }
            Err(error) => return Some(self.fault(error)),
        };

        if frame.is_done_marker() {
            self.finish();
            return None;
        }
        let decoded = decode_payload::<T>(&frame.payload(), self.status);

        self.state = DecoderState::EmittingEvent;
        self.frames += 1;
        let item = match decoded {
            Ok(payload) => {
                trace!(frame = self.frames, event = ?frame.event, "Decoded stream frame");
                Ok(EventFrame {
                    event: frame.event,
                    id: frame.id,
                    payload,
                })
            }
            Err(error) => {
                warn!(frame = self.frames, error = %error, "Failed to decode stream frame");
                Err(error)
            }
        };

        Some(Step::Event(item))
    }

    async fn read_frame(&mut self) -> Result<Option<RawFrame>, ApiError> {
        loop {
            while let Some(line) = self.next_line() {
                if line.is_empty() {
                    if let Some(frame) = self.pending.take() {
                        return Ok(Some(frame));
                    }
                    continue;
                }
                self.push_line(line);
            }

            if self.body_ended {
                // An unterminated last line still belongs to the last frame
                if !self.buffer.is_empty() {
                    let rest = self.buffer.split().freeze();
                    self.scanned = 0;
                    self.push_line(rest);
                }
                return Ok(self.pending.take());
            }

            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                chunk = self.body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(error)) => return Err(error),
                None => self.body_ended = true,
            }
        }
    }

    fn push_line(&mut self, line: Bytes) {
        self.pending.push_line(line);
        if !self.pending.is_empty() {
            self.state = DecoderState::ParsingFrame;
        }
    }

    /// Pop one complete line from the buffer, without its line ending.
    ///
    /// Only bytes appended since the last call are searched for a line break.
    fn next_line(&mut self) -> Option<Bytes> {
        let Some(found) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buffer.len();
            return None;
        };
        let end = self.scanned + found;
        self.scanned = 0;
        let mut line = self.buffer.split_to(end + 1).freeze();
        line.truncate(end);
        if line.ends_with(b"\r") {
            line.truncate(end - 1);
        }
        Some(line)
    }

    fn finish(&mut self) {
        self.state = DecoderState::Done;
        debug!(frames = self.frames, "Event stream completed");
    }

    fn fault(&mut self, error: ApiError) -> Step<T> {
        self.state = DecoderState::Faulted;
        debug!(frames = self.frames, error = %error, "Event stream faulted");
        Step::Faulted(error)
    }
}
