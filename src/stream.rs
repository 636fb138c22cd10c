//! Delivery of decoded stream events.
//!
//! [`EventStream`] exposes one decoder either as a pull-based
//! [`Stream`] or through a callback ([`EventStream::for_each_event`]). Both
//! read the same sequence of steps, so ordering, cancellation and errors are
//! the same in either mode.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::outcome::{ApiError, Outcome};
use crate::sse::{Step, StreamDecoder};

pub use crate::sse::EventFrame;

/// One item of an event stream: a decoded frame or the error for that frame.
pub type EventResult<T> = Result<EventFrame<T>, ApiError>;

/// Lazily decoded sequence of events from one streamed response.
///
/// Nothing is read from the network until the stream is polled, and at most
/// one frame is decoded ahead of the consumer. Dropping the stream closes the
/// underlying connection.
///
/// As a [`Stream`], per-frame decode errors are yielded as `Err` items and the
/// stream goes on; a transport fault or cancellation is yielded as the last
/// `Err` item.
pub struct EventStream<T> {
    steps: BoxStream<'static, Step<T>>,
}

impl<T> EventStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    pub fn new(decoder: StreamDecoder<T>) -> Self {
        let steps = stream::unfold(decoder, |mut decoder| async move {
            let step = decoder.next_step().await?;
            Some((step, decoder))
        });
        Self {
            steps: steps.boxed(),
        }
    }
}

impl<T: Send + 'static> EventStream<T> {
    /// A stream that ends with `error` before producing any frame.
    pub fn failed(error: ApiError) -> Self {
        Self {
            steps: stream::once(async move { Step::Faulted(error) }).boxed(),
        }
    }

    /// Invoke `on_event` once per frame, in order.
    ///
    /// Returns [`Outcome::Empty`] when the stream completes, or the transport
    /// or cancellation error that ended it. Per-frame errors go to `on_event`.
    pub async fn for_each_event<F>(mut self, mut on_event: F) -> Outcome<()>
    where
        F: FnMut(EventResult<T>),
    {
        while let Some(step) = self.steps.next().await {
            match step {
                Step::Event(item) => on_event(item),
                Step::Faulted(error) => return Outcome::Failure(error),
            }
        }
        Outcome::Empty
    }

    /// Collect the payloads of every frame, failing on the first error.
    pub async fn collect_payloads(self) -> Outcome<Vec<T>> {
        let mut payloads = Vec::new();
        let mut first_error = None;
        let finished = self
            .for_each_event(|item| match item {
                Ok(frame) if first_error.is_none() => payloads.push(frame.payload),
                Ok(_) => {}
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            })
            .await;

        match (first_error, finished) {
            (Some(error), _) => Outcome::Failure(error),
            (None, Outcome::Failure(error)) => Outcome::Failure(error),
            (None, _) => Outcome::Success(payloads),
        }
    }
}

impl<T> Stream for EventStream<T> {
    type Item = EventResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.steps.poll_next_unpin(cx).map(|step| {
            step.map(|step| match step {
                Step::Event(item) => item,
                Step::Faulted(error) => Err(error),
            })
        })
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
