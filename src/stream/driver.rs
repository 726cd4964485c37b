use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AdapterError;
use crate::observability::log_call_complete;
use crate::protocol::canonical::{FinishReason, LifecycleEvent, Warning};
use crate::protocol::openai_responses::stream::parse_responses_stream_event;

use super::reconstruct::StreamReconstructor;
use super::sse::SseEvent;

/// Per-call settings for [`drive_lifecycle_stream`].
#[derive(Debug, Default)]
pub struct DriverOptions {
    /// Request-building warnings, carried on `stream-start`.
    pub warnings: Vec<Warning>,
    /// Ends the input early; finalization still runs once.
    pub cancel: Option<CancellationToken>,
    /// Model id reported in the completion log record.
    pub model_id: String,
    /// Span entered while events are processed.
    pub span: Option<tracing::Span>,
}

enum Next {
    Frame(Option<Result<SseEvent, AdapterError>>),
    Cancelled,
}

struct DriverState<S> {
    source: Pin<Box<S>>,
    reconstructor: StreamReconstructor,
    pending: VecDeque<LifecycleEvent>,
    scratch: Vec<LifecycleEvent>,
    warnings: Option<Vec<Warning>>,
    cancel: Option<CancellationToken>,
    model_id: String,
    span: tracing::Span,
    started_at: Instant,
    done: bool,
}

impl<S> DriverState<S> {
    fn ensure_started(&mut self) {
        if let Some(warnings) = self.warnings.take() {
            self.pending
                .push_back(LifecycleEvent::StreamStart { warnings });
        }
    }

    fn flush_scratch(&mut self) {
        self.pending.extend(self.scratch.drain(..));
    }

    fn handle_frame(&mut self, frame: Result<SseEvent, AdapterError>) {
        self.ensure_started();
        match frame {
            Ok(frame) => match parse_responses_stream_event(&frame.data) {
                Ok(Some(event)) => self.reconstructor.process_into(&event, &mut self.scratch),
                Ok(None) => {}
                Err(err) => self
                    .reconstructor
                    .record_parse_failure(&err.to_string(), &mut self.scratch),
            },
            Err(err) => self
                .reconstructor
                .record_transport_failure(&err.to_string(), &mut self.scratch),
        }
        self.flush_scratch();
    }

    fn finalize(&mut self) {
        self.ensure_started();
        self.reconstructor.finish_into(&mut self.scratch);
        self.flush_scratch();
        self.done = true;
        let state = self.reconstructor.state();
        log_call_complete(
            &self.model_id,
            state.usage(),
            state.finish_reason().unwrap_or(&FinishReason::Stop),
            self.started_at.elapsed(),
        );
    }
}

/// Drive `source` through `reconstructor`, yielding lifecycle events.
///
/// `stream-start` is emitted before the first event (or at finalization when
/// the source yields nothing). A malformed payload becomes an `error` event
/// and processing continues; a transport error ends the input. Finalization
/// runs exactly once: at end of input, after a terminal wire event, or on
/// cancellation.
pub fn drive_lifecycle_stream<S>(
    source: S,
    reconstructor: StreamReconstructor,
    options: DriverOptions,
) -> impl Stream<Item = LifecycleEvent> + Send
where
    S: Stream<Item = Result<SseEvent, AdapterError>> + Send + 'static,
{
    let state = DriverState {
        source: Box::pin(source),
        reconstructor,
        pending: VecDeque::with_capacity(8),
        scratch: Vec::with_capacity(8),
        warnings: Some(options.warnings),
        cancel: options.cancel,
        model_id: options.model_id,
        span: options.span.unwrap_or_else(tracing::Span::none),
        started_at: Instant::now(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }
            if state.reconstructor.is_terminated() {
                let span = state.span.clone();
                span.in_scope(|| state.finalize());
                continue;
            }

            let next = match &state.cancel {
                Some(token) => tokio::select! {
                    biased;
                    () = token.cancelled() => Next::Cancelled,
                    frame = state.source.next() => Next::Frame(frame),
                },
                None => Next::Frame(state.source.next().await),
            };

            let span = state.span.clone();
            span.in_scope(|| match next {
                Next::Frame(Some(frame)) => state.handle_frame(frame),
                Next::Frame(None) => state.finalize(),
                Next::Cancelled => {
                    debug!("stream cancelled by caller");
                    state.finalize();
                }
            });
        }
    })
}
