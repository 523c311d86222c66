use crate::protocol::canonical::{Content, FunctionArgs, Segment};
use crate::protocol::normalize::normalize;

use super::parser::render_tool_call;
use super::prompt;

const TOOL_CALL_FALLBACK: &str = "name: tool_call_failed\n";
const TOOL_RESPONSE_FALLBACK: &str = "error: |-\n  RPCError: Failed to marshal the args (HTTP 500)";

/// Render a historical function call as a literal `<tool_call>` block.
fn tool_call_text(name: &str, args: &FunctionArgs) -> String {
    let doc = render_tool_call(name, args).unwrap_or_else(|err| {
        tracing::warn!(tool = %name, "softcall: failed to render tool call: {err}");
        TOOL_CALL_FALLBACK.to_string()
    });
    format!("\n\n<tool_call>\n{doc}\n</tool_call>")
}

/// Render a historical function result as a literal `<tool_response>` block.
fn tool_response_text(name: &str, content: &serde_json::Value) -> String {
    let body = serde_json::to_string(content).unwrap_or_else(|err| {
        tracing::warn!(tool = %name, "softcall: failed to serialize tool response: {err}");
        TOOL_RESPONSE_FALLBACK.to_string()
    });
    format!("\n\n<tool_response>\n{body}\n</tool_response>")
}

/// Rewrite function calls and responses in `content` into literal text.
///
/// Content without either kind of segment is returned untouched.
#[must_use]
pub fn rewrite_content(mut content: Content) -> Content {
    let has_tool_traffic = content.parts.iter().any(|part| {
        matches!(
            part,
            Segment::FunctionCall { .. } | Segment::FunctionResponse { .. }
        )
    });
    if !has_tool_traffic {
        return content;
    }

    for part in &mut content.parts {
        let text = match &*part {
            Segment::FunctionCall { name, args, .. } => tool_call_text(name, args),
            Segment::FunctionResponse { name, content, .. } => tool_response_text(name, content),
            _ => continue,
        };
        *part = Segment::Text(text);
    }
    content
}

/// Build the upstream history: the priming dialogue built from `prompt`,
/// followed by every turn of `history` rewritten and normalized.
#[must_use]
pub fn build_softcall_history(history: Vec<Content>, prompt: &str) -> Vec<Content> {
    let mut messages = Vec::with_capacity(history.len() + prompt::FEW_SHOT_TURNS);
    messages.extend(prompt::few_shot_dialogue(prompt));
    messages.extend(history.into_iter().map(|content| {
        let mut content = rewrite_content(content);
        content.parts = normalize(content.parts);
        content
    }));
    messages
}
