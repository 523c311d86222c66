use crate::protocol::canonical::{ChatContext, Content, Segment, UsageData};
use std::time::Duration;
use tracing::info;

/// Estimate the number of tokens in `text`.
///
/// Uses a lightweight heuristic (`bytes / 4`) to avoid loading model BPE tables.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Estimate the tokens carried by the segments of one turn.
///
/// Binary payloads are not counted.
#[must_use]
pub fn estimate_content_tokens(content: &Content) -> u64 {
    content
        .parts
        .iter()
        .map(|part| match part {
            Segment::Text(text) => estimate_tokens(text),
            Segment::Thinking(block) => estimate_tokens(&block.data),
            Segment::FunctionCall { name, args, .. } => {
                estimate_tokens(name)
                    + serde_json::to_string(args).map_or(0, |json| estimate_tokens(&json))
            }
            Segment::FunctionResponse { content, .. } => {
                serde_json::to_string(content).map_or(0, |json| estimate_tokens(&json))
            }
            Segment::InlineData { .. } | Segment::FileData { .. } => 0,
        })
        .sum()
}

/// Estimate the input tokens of a generation: history, input and tool
/// declarations.
#[must_use]
pub fn estimate_chat_tokens(chat: &ChatContext, input: &Content) -> u64 {
    let history: u64 = chat.history.iter().map(estimate_content_tokens).sum();
    let tools: u64 = chat
        .tools
        .iter()
        .map(|tool| serde_json::to_string(tool).map_or(0, |json| estimate_tokens(&json)))
        .sum();
    history + tools + estimate_content_tokens(input)
}

/// Merge upstream-reported usage with local estimates.
///
/// - Always prefer upstream non-zero values
/// - Only fill missing or zero fields with estimates
/// - Compute total = input + output if total is missing
#[must_use]
pub fn merge_usage(
    upstream: Option<&UsageData>,
    estimated_input: u64,
    estimated_output: u64,
) -> UsageData {
    let upstream = upstream.copied().unwrap_or_default();
    let pick = |reported: u64, estimated: u64| if reported > 0 { reported } else { estimated };

    let input_tokens = pick(upstream.input_tokens, estimated_input);
    let output_tokens = pick(upstream.output_tokens, estimated_output);
    UsageData {
        input_tokens,
        output_tokens,
        total_tokens: pick(upstream.total_tokens, input_tokens + output_tokens),
    }
}

/// Log token usage for a completed generation at INFO level.
pub fn log_generation_usage(model: &str, usage: &UsageData, duration: Duration) {
    info!(
        model = model,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = duration.as_secs_f64(),
        "generation completed"
    );
}
