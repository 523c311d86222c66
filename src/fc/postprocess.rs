use crate::protocol::canonical::{FinishReason, Segment};
use crate::protocol::normalize::{normalize, strip_blank_texts};

/// Final cleanup of an emulated response.
///
/// Normalizes, then drops every whitespace-only text. Unlike [`normalize`],
/// a lone blank text is removed too: at this point it is delimiter residue.
#[must_use]
pub fn finalize_parts(parts: Vec<Segment>) -> Vec<Segment> {
    strip_blank_texts(normalize(parts))
}

/// Report `ToolUse` instead of `Stop` when the response contains a call.
#[must_use]
pub fn resolve_finish_reason(reason: FinishReason, parts: &[Segment]) -> FinishReason {
    if reason == FinishReason::Stop && parts.iter().any(Segment::is_function_call) {
        FinishReason::ToolUse
    } else {
        reason
    }
}
