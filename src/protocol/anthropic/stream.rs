use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{upstream_kind_from_anthropic_type, CanonicalError};
use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicDelta, AnthropicStreamEvent};
use crate::protocol::assembler::{BlockDelta, BlockEvent, BlockStart, ResponseAssembler};
use crate::protocol::canonical::{Content, FinishReason, Role, Segment, UsageData};
use crate::protocol::mapping::anthropic_stop_to_finish_reason;
use crate::protocol::normalize::normalize;
use crate::stream::{StreamContent, StreamOutcome};

/// Parse an Anthropic SSE named event into a typed stream event.
///
/// Anthropic uses named events: `event: message_start\ndata: {...}\n\n`
/// The `event_type` is the value after "event:", and `data` is the JSON payload.
#[must_use]
pub fn parse_anthropic_sse(event_type: &str, data: &str) -> Option<AnthropicStreamEvent> {
    match event_type {
        "message_start"
        | "content_block_start"
        | "content_block_delta"
        | "content_block_stop"
        | "message_delta"
        | "message_stop"
        | "ping"
        | "error" => serde_json::from_str(data).ok(),
        _ => None,
    }
}

/// Translate a content-block event into the generic block vocabulary.
///
/// Message-level events carry no block and yield `None`.
#[must_use]
pub fn to_block_event(event: AnthropicStreamEvent) -> Option<BlockEvent> {
    match event {
        AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block,
        } => {
            let block = match content_block {
                AnthropicContentBlock::Text { text } => BlockStart::Text(text),
                AnthropicContentBlock::Thinking { thinking } => BlockStart::Thinking { thinking },
                AnthropicContentBlock::RedactedThinking { data } => {
                    BlockStart::RedactedThinking { data }
                }
                // `input` is always an empty object here; arguments arrive as
                // `input_json_delta` fragments.
                AnthropicContentBlock::ToolUse { id, name, .. } => {
                    BlockStart::ToolCall { id, name }
                }
            };
            Some(BlockEvent::Start { index, block })
        }
        AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
            let delta = match delta {
                AnthropicDelta::TextDelta { text } => BlockDelta::Text(text),
                AnthropicDelta::ThinkingDelta { thinking } => BlockDelta::Thinking(thinking),
                AnthropicDelta::SignatureDelta { signature } => BlockDelta::Signature(signature),
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    BlockDelta::ToolArguments(partial_json)
                }
            };
            Some(BlockEvent::Delta { index, delta })
        }
        AnthropicStreamEvent::ContentBlockStop { index } => Some(BlockEvent::Stop { index }),
        _ => None,
    }
}

/// Stateful assembler for one Anthropic Messages stream.
///
/// Content blocks go through the generic [`ResponseAssembler`]; message-level
/// events accumulate usage and the stop reason.
#[derive(Debug, Default)]
pub struct AnthropicStreamAssembler {
    blocks: ResponseAssembler,
    stop_reason: Option<String>,
    usage: Option<UsageData>,
    message_stopped: bool,
}

impl AnthropicStreamAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `message_stop` has been received.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.message_stopped
    }

    /// Apply one wire event, returning the segment to forward live, if any.
    ///
    /// # Errors
    ///
    /// Returns the mapped upstream error for `error` events, and the
    /// assembler's protocol or decode errors for malformed block sequences.
    pub fn apply(&mut self, event: AnthropicStreamEvent) -> Result<Option<Segment>, CanonicalError> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if message.stop_reason.is_some() {
                    self.stop_reason = message.stop_reason;
                }
                self.record_usage(message.usage.input_tokens, message.usage.output_tokens);
                Ok(None)
            }
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                if let Some(usage) = usage {
                    self.record_usage(usage.input_tokens, usage.output_tokens);
                }
                Ok(None)
            }
            AnthropicStreamEvent::MessageStop {} => {
                self.message_stopped = true;
                Ok(None)
            }
            AnthropicStreamEvent::Ping {} => Ok(None),
            AnthropicStreamEvent::Error { error } => Err(CanonicalError::upstream(
                upstream_kind_from_anthropic_type(&error.type_),
                error.message,
            )),
            block_event => match to_block_event(block_event) {
                Some(event) => self.blocks.apply(event),
                None => Ok(None),
            },
        }
    }

    // Anthropic reports input tokens on `message_start` and a running output
    // total on `message_delta`, so keep the largest value seen for each.
    fn record_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        let usage = self.usage.get_or_insert_with(UsageData::default);
        usage.input_tokens = usage.input_tokens.max(input_tokens);
        usage.output_tokens = usage.output_tokens.max(output_tokens);
        usage.total_tokens = usage.input_tokens + usage.output_tokens;
    }

    /// Build the final aggregate.
    ///
    /// # Errors
    ///
    /// Propagates [`ResponseAssembler::finish`] failures.
    pub fn finish(self) -> Result<(Content, Option<UsageData>, FinishReason), CanonicalError> {
        let finish_reason = self
            .stop_reason
            .as_deref()
            .map_or(FinishReason::Unknown, anthropic_stop_to_finish_reason);
        let parts = normalize(self.blocks.finish()?);
        Ok((Content::new(Role::Model, parts), self.usage, finish_reason))
    }
}

/// Drive a stream of decoded Anthropic events into a [`StreamContent`].
///
/// Transport is the caller's concern: `events` yields wire events already
/// decoded (for example with [`parse_anthropic_sse`]) or a transport error.
/// The stream ends at `message_stop` or when `events` is exhausted.
pub fn assemble_anthropic_stream<S>(events: S, cancel: CancellationToken, capacity: usize) -> StreamContent
where
    S: Stream<Item = Result<AnthropicStreamEvent, CanonicalError>> + Send + Unpin + 'static,
{
    StreamContent::spawn(cancel, capacity, move |writer| async move {
        let mut events = events;
        let mut assembler = AnthropicStreamAssembler::new();
        let mut live: Vec<Segment> = Vec::new();
        let cancel = writer.cancel_token().clone();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return StreamOutcome::failure(CanonicalError::Cancelled, live_content(live));
                }
                next = events.next() => next,
            };
            let Some(event) = next else { break };

            let forwarded = match event.and_then(|event| assembler.apply(event)) {
                Ok(forwarded) => forwarded,
                Err(err) => {
                    tracing::debug!("anthropic stream failed: {err}");
                    return StreamOutcome::failure(err, live_content(live));
                }
            };
            if let Some(segment) = forwarded {
                live.push(segment.clone());
                if let Err(err) = writer.send(segment).await {
                    return StreamOutcome::failure(err, live_content(live));
                }
            }
            if assembler.is_stopped() {
                break;
            }
        }

        match assembler.finish() {
            Ok((content, usage, finish_reason)) => {
                StreamOutcome::success(content, usage, finish_reason)
            }
            Err(err) => StreamOutcome::failure(err, live_content(live)),
        }
    })
}

fn live_content(live: Vec<Segment>) -> Content {
    Content::new(Role::Model, normalize(live))
}
