//! Live segment streams.
//!
//! A generation call returns a [`StreamContent`] immediately. A worker task
//! produces segments into a bounded, ordered queue and, once it is done,
//! publishes a [`StreamOutcome`] holding the final error, content, usage and
//! finish reason.
//!
//! The outcome only exists after the live sequence has been fully drained.
//! Rather than exposing fields that are meaningless until then, the handle
//! hands out the outcome exclusively through [`StreamContent::finish`], which
//! consumes the handle and drains whatever the caller did not read.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::CanonicalError;
use crate::protocol::canonical::{Content, FinishReason, Role, Segment, UsageData};

/// Default capacity of the live segment queue.
///
/// This only smooths producer/consumer speed mismatches; any positive value
/// is correct.
pub const DEFAULT_STREAM_CAPACITY: usize = 128;

/// Final aggregate of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub error: Option<CanonicalError>,
    pub content: Content,
    pub usage: Option<UsageData>,
    pub finish_reason: FinishReason,
}

impl StreamOutcome {
    #[must_use]
    pub fn success(content: Content, usage: Option<UsageData>, finish_reason: FinishReason) -> Self {
        Self {
            error: None,
            content,
            usage,
            finish_reason,
        }
    }

    /// Outcome of a generation that failed before producing a final answer.
    #[must_use]
    pub fn failure(error: CanonicalError, content: Content) -> Self {
        Self {
            error: Some(error),
            content,
            usage: None,
            finish_reason: FinishReason::Error,
        }
    }

    /// Convert into a `Result`, discarding partial content on error.
    ///
    /// # Errors
    ///
    /// Returns the recorded error, if any.
    pub fn into_result(self) -> Result<Content, CanonicalError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.content),
        }
    }
}

/// Producer side of a [`StreamContent`].
///
/// Owned by exactly one worker; dropping it closes the live sequence.
#[derive(Debug)]
pub struct StreamWriter {
    tx: mpsc::Sender<Segment>,
    cancel: CancellationToken,
}

impl StreamWriter {
    /// Enqueue one segment, waiting for queue space if the consumer is slow.
    ///
    /// Cancellation is observed before and while waiting, and takes priority.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError::Cancelled`] when the caller cancelled or the
    /// consumer dropped its handle.
    pub async fn send(&self, segment: Segment) -> Result<(), CanonicalError> {
        if self.cancel.is_cancelled() {
            return Err(CanonicalError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(CanonicalError::Cancelled),
            sent = self.tx.send(segment) => sent.map_err(|_| {
                tracing::debug!("stream consumer dropped; stopping worker");
                CanonicalError::Cancelled
            }),
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Handle to an in-flight generation.
///
/// Read segments through [`StreamContent::next_segment`] or the
/// [`Stream`] implementation, then call [`StreamContent::finish`] to obtain
/// the final aggregate. There is one consumer per handle.
#[derive(Debug)]
pub struct StreamContent {
    segments: mpsc::Receiver<Segment>,
    outcome: oneshot::Receiver<StreamOutcome>,
}

impl StreamContent {
    /// Spawn `producer` on the tokio runtime and return the consumer handle.
    ///
    /// The producer receives the [`StreamWriter`] and returns the outcome.
    /// The writer is dropped (closing the live sequence) before the outcome
    /// is published.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(cancel: CancellationToken, capacity: usize, producer: F) -> Self
    where
        F: FnOnce(StreamWriter) -> Fut,
        Fut: Future<Output = StreamOutcome> + Send + 'static,
    {
        let (tx, segments) = mpsc::channel(capacity.max(1));
        let (outcome_tx, outcome) = oneshot::channel();
        let task = producer(StreamWriter { tx, cancel });
        tokio::spawn(async move {
            let result = task.await;
            let _ = outcome_tx.send(result);
        });
        Self { segments, outcome }
    }

    /// A stream that yields the given segments and completes with `outcome`.
    ///
    /// Requires no runtime; useful for canned responses and tests.
    #[must_use]
    pub fn ready(segments: Vec<Segment>, outcome: StreamOutcome) -> Self {
        let (tx, rx) = mpsc::channel(segments.len().max(1));
        for segment in segments {
            // Capacity equals the number of segments, so this cannot fail.
            let _ = tx.try_send(segment);
        }
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let _ = outcome_tx.send(outcome);
        Self {
            segments: rx,
            outcome: outcome_rx,
        }
    }

    /// A stream that fails immediately with `error` and yields nothing.
    #[must_use]
    pub fn failed(error: CanonicalError) -> Self {
        Self::ready(
            Vec::new(),
            StreamOutcome::failure(error, Content::empty(Role::Model)),
        )
    }

    /// Receive the next live segment; `None` once the worker has finished.
    pub async fn next_segment(&mut self) -> Option<Segment> {
        self.segments.recv().await
    }

    /// Drain the live sequence and return the final aggregate.
    pub async fn finish(mut self) -> StreamOutcome {
        while self.segments.recv().await.is_some() {}
        self.await_outcome().await
    }

    /// Collect every remaining live segment together with the final aggregate.
    pub async fn collect(mut self) -> (Vec<Segment>, StreamOutcome) {
        let mut live = Vec::new();
        while let Some(segment) = self.segments.recv().await {
            live.push(segment);
        }
        let outcome = self.await_outcome().await;
        (live, outcome)
    }

    async fn await_outcome(self) -> StreamOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => StreamOutcome::failure(
                CanonicalError::Internal("stream worker terminated without an outcome".into()),
                Content::empty(Role::Model),
            ),
        }
    }
}

impl Stream for StreamContent {
    type Item = Segment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Segment>> {
        self.segments.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn segments_arrive_in_order_then_outcome() {
        let stream = StreamContent::spawn(CancellationToken::new(), 2, |writer| async move {
            let mut parts = Vec::new();
            for i in 0..10 {
                let seg = Segment::text(i.to_string());
                parts.push(seg.clone());
                if let Err(err) = writer.send(seg).await {
                    return StreamOutcome::failure(err, Content::new(Role::Model, parts));
                }
            }
            StreamOutcome::success(Content::new(Role::Model, parts), None, FinishReason::Stop)
        });

        let (live, outcome) = stream.collect().await;
        let texts: Vec<_> = live.iter().filter_map(Segment::as_text).collect();
        assert_eq!(texts, ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        assert_eq!(outcome.content.parts.len(), 10);
    }

    #[tokio::test]
    async fn stream_trait_yields_segments() {
        let mut stream = StreamContent::ready(
            vec![Segment::text("a"), Segment::text("b")],
            StreamOutcome::success(Content::empty(Role::Model), None, FinishReason::Stop),
        );
        assert_eq!(stream.next().await, Some(Segment::text("a")));
        assert_eq!(stream.next().await, Some(Segment::text("b")));
        assert_eq!(stream.next().await, None);
        assert_eq!(stream.finish().await.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn blocked_producer_observes_cancellation() {
        let cancel = CancellationToken::new();
        let stream = StreamContent::spawn(cancel.clone(), 1, |writer| async move {
            loop {
                if let Err(err) = writer.send(Segment::text("x")).await {
                    return StreamOutcome::failure(err, Content::empty(Role::Model));
                }
            }
        });

        // Let the producer fill the queue and block on backpressure.
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), stream.finish())
            .await
            .expect("worker must stop after cancellation");
        assert_eq!(outcome.error, Some(CanonicalError::Cancelled));
    }

    #[tokio::test]
    async fn dropped_consumer_stops_producer() {
        let (done_tx, done_rx) = oneshot::channel();
        let stream = StreamContent::spawn(CancellationToken::new(), 1, |writer| async move {
            let err = loop {
                if let Err(err) = writer.send(Segment::text("x")).await {
                    break err;
                }
            };
            let _ = done_tx.send(err.clone());
            StreamOutcome::failure(err, Content::empty(Role::Model))
        });
        drop(stream);

        let err = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("worker must notice the dropped consumer")
            .expect("worker reports its error");
        assert_eq!(err, CanonicalError::Cancelled);
    }

    #[tokio::test]
    async fn failed_stream_reports_error() {
        let outcome = StreamContent::failed(CanonicalError::NoSuchProvider("x".into()))
            .finish()
            .await;
        assert_eq!(
            outcome.error,
            Some(CanonicalError::NoSuchProvider("x".into()))
        );
        assert_eq!(outcome.finish_reason, FinishReason::Error);
    }
}
