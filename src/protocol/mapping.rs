use super::canonical::FinishReason;

// ---------------------------------------------------------------------------
// Stop reason mappings
// ---------------------------------------------------------------------------

#[must_use]
pub fn anthropic_stop_to_finish_reason(s: &str) -> FinishReason {
    match s {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::MaxTokens,
        "tool_use" => FinishReason::ToolUse,
        "refusal" => FinishReason::Safety,
        _ => FinishReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reasons() {
        assert_eq!(anthropic_stop_to_finish_reason("end_turn"), FinishReason::Stop);
        assert_eq!(
            anthropic_stop_to_finish_reason("stop_sequence"),
            FinishReason::Stop
        );
        assert_eq!(
            anthropic_stop_to_finish_reason("tool_use"),
            FinishReason::ToolUse
        );
        assert_eq!(
            anthropic_stop_to_finish_reason("pause_turn"),
            FinishReason::Unknown
        );
    }
}
