use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, SoftCallConfig};
use crate::error::CanonicalError;
use crate::model::Model;
use crate::observability::{self, token_counter};
use crate::protocol::canonical::{ChatContext, Content, Role, Segment, ThinkingBlock};
use crate::state::{CallIdGenerator, OpenAiCallIds};
use crate::stream::{StreamContent, StreamOutcome, StreamWriter, DEFAULT_STREAM_CAPACITY};

use super::detector::{DetectorOutput, DetectorOutputs, SoftCallDetector};
use super::postprocess::{finalize_parts, resolve_finish_reason};
use super::preprocess::{build_softcall_history, rewrite_content};
use super::prompt;

/// Tool calling for upstreams that have none.
///
/// Requests with tools are rewritten into a tag-based text convention and the
/// upstream's text is scanned back into function calls. Requests without
/// tools go straight to the upstream. The wrapper is itself a [`Model`], so
/// it can be stacked.
#[derive(Debug)]
pub struct SoftCallModel<M> {
    upstream: M,
    config: SoftCallConfig,
    call_ids: Arc<dyn CallIdGenerator>,
    stream_capacity: usize,
}

impl<M: Model> SoftCallModel<M> {
    #[must_use]
    pub fn new(upstream: M, config: SoftCallConfig) -> Self {
        Self {
            upstream,
            config,
            call_ids: Arc::new(OpenAiCallIds),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    /// Build from the `softcall` and `stream` sections of `config`.
    #[must_use]
    pub fn from_config(upstream: M, config: &AppConfig) -> Self {
        Self::new(upstream, config.softcall).with_stream_capacity(config.stream.buffer_capacity)
    }

    #[must_use]
    pub fn with_call_ids(mut self, call_ids: Arc<dyn CallIdGenerator>) -> Self {
        self.call_ids = call_ids;
        self
    }

    #[must_use]
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SoftCallConfig {
        &self.config
    }

    #[must_use]
    pub fn upstream(&self) -> &M {
        &self.upstream
    }
}

impl<M: Model> Model for SoftCallModel<M> {
    fn generate_stream(
        &self,
        cancel: CancellationToken,
        chat: ChatContext,
        input: Content,
    ) -> StreamContent {
        let Some(prompt) = prompt::instruction_prompt(&chat.tools) else {
            return self.upstream.generate_stream(cancel, chat, input);
        };

        let estimated_input = observability::usage_logging_enabled()
            .then(|| token_counter::estimate_chat_tokens(&chat, &input));
        let history = build_softcall_history(chat.history, &prompt);
        let input = rewrite_content(input);
        tracing::debug!(
            model = self.upstream.name(),
            tools = chat.tools.len(),
            turns = history.len(),
            "softcall: delegating rewritten chat"
        );
        let upstream = self
            .upstream
            .generate_stream(cancel.clone(), ChatContext::new(history), input);

        let worker = SoftCallWorker {
            detector: SoftCallDetector::new(
                self.config.preserve_reasoning,
                self.config.max_block_bytes,
            ),
            call_ids: Arc::clone(&self.call_ids),
            parts: Vec::new(),
            model: self.upstream.name().to_string(),
            estimated_input,
        };
        StreamContent::spawn(cancel, self.stream_capacity, move |writer| {
            worker.run(upstream, writer)
        })
    }

    fn name(&self) -> &str {
        self.upstream.name()
    }

    fn close(&self) -> Result<(), CanonicalError> {
        self.upstream.close()
    }
}

/// Per-generation state, owned by the spawned task.
struct SoftCallWorker {
    detector: SoftCallDetector,
    call_ids: Arc<dyn CallIdGenerator>,
    /// Every segment sent to the caller, in order.
    parts: Vec<Segment>,
    model: String,
    /// `None` when usage logging is filtered out.
    estimated_input: Option<u64>,
}

impl SoftCallWorker {
    async fn run(mut self, mut upstream: StreamContent, writer: StreamWriter) -> StreamOutcome {
        let start = Instant::now();
        let cancel = writer.cancel_token().clone();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.fail(CanonicalError::Cancelled),
                next = upstream.next_segment() => next,
            };
            let Some(segment) = next else { break };

            let text = match segment {
                Segment::Text(text) => text,
                other => {
                    tracing::debug!(
                        kind = ?other.kind(),
                        "softcall: ignoring non-text upstream segment"
                    );
                    continue;
                }
            };
            let mut out = DetectorOutputs::new();
            self.detector.feed(&text, &mut out);
            if let Err(err) = self.emit(out, &writer).await {
                return self.fail(err);
            }
        }

        let mut out = DetectorOutputs::new();
        self.detector.finish(&mut out);
        if let Err(err) = self.emit(out, &writer).await {
            return self.fail(err);
        }

        let upstream_outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return self.fail(CanonicalError::Cancelled),
            outcome = upstream.finish() => outcome,
        };

        let parts = finalize_parts(self.parts);
        let finish_reason = resolve_finish_reason(upstream_outcome.finish_reason, &parts);
        let content = Content::new(Role::Model, parts);

        if let Some(err) = &upstream_outcome.error {
            tracing::debug!(model = %self.model, "softcall: upstream failed: {err}");
        } else if let Some(estimated_input) = self.estimated_input {
            let estimated_output = token_counter::estimate_content_tokens(&content);
            let usage = token_counter::merge_usage(
                upstream_outcome.usage.as_ref(),
                estimated_input,
                estimated_output,
            );
            observability::log_generation_complete(&self.model, &usage, start);
        }

        StreamOutcome {
            error: upstream_outcome.error,
            content,
            usage: upstream_outcome.usage,
            finish_reason,
        }
    }

    async fn emit(&mut self, out: DetectorOutputs, writer: &StreamWriter) -> Result<(), CanonicalError> {
        for item in out {
            let segment = match item {
                DetectorOutput::Text(text) => Segment::Text(text),
                DetectorOutput::Reasoning(data) => Segment::Thinking(ThinkingBlock {
                    data,
                    signature: None,
                    redacted: false,
                }),
                DetectorOutput::ToolCall(call) => Segment::FunctionCall {
                    id: self.call_ids.new_call_id(),
                    name: call.name,
                    args: call.arguments,
                },
            };
            self.parts.push(segment.clone());
            writer.send(segment).await?;
        }
        Ok(())
    }

    fn fail(self, error: CanonicalError) -> StreamOutcome {
        tracing::debug!(model = %self.model, "softcall: generation stopped: {error}");
        StreamOutcome::failure(error, Content::new(Role::Model, finalize_parts(self.parts)))
    }
}
