//! Tool-call document parsing and rendering.
//!
//! A tool call travels as a small YAML document between `<tool_call>`
//! delimiters:
//!
//! ```text
//! name: |-
//!   get_weather
//! parameters:
//!   location: Seoul
//! ```
//!
//! The same document shape is produced when replaying historical calls to the
//! upstream and parsed back out of the upstream's text output.

use serde::{Deserialize, Serialize};

use crate::error::CanonicalError;
use crate::protocol::canonical::FunctionArgs;

/// A tool call recovered from delimited model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    /// Tool name with surrounding whitespace removed.
    pub name: String,
    pub arguments: FunctionArgs,
}

#[derive(Deserialize)]
struct ToolCallDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parameters: Option<FunctionArgs>,
}

#[derive(Serialize)]
struct ToolCallDocumentRef<'a> {
    name: &'a str,
    parameters: &'a FunctionArgs,
}

/// Parse the body of a `<tool_call>` block.
///
/// Missing or null `parameters` yield an empty argument map.
///
/// # Errors
///
/// Returns [`CanonicalError::FcParse`] when the body is not a YAML mapping of
/// the expected shape or the name is empty.
pub fn parse_tool_call_block(body: &str) -> Result<ParsedToolCall, CanonicalError> {
    let doc = match serde_yaml::from_str::<ToolCallDocument>(body) {
        Ok(doc) => Ok(doc),
        // Models often copy the tab-indented example from the prompt; YAML
        // forbids tabs as indentation.
        Err(_) if body.contains('\t') => serde_yaml::from_str(&expand_leading_tabs(body)),
        Err(err) => Err(err),
    }
    .map_err(|err| CanonicalError::FcParse(format!("tool call document: {err}")))?;

    let name = doc.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(CanonicalError::FcParse("tool call has no name".into()));
    }

    Ok(ParsedToolCall {
        name: name.to_string(),
        arguments: doc.parameters.unwrap_or_default(),
    })
}

/// Replace each leading tab of every line with two spaces.
fn expand_leading_tabs(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 16);
    for line in body.split_inclusive('\n') {
        let rest = line.trim_start_matches('\t');
        for _ in 0..(line.len() - rest.len()) {
            out.push_str("  ");
        }
        out.push_str(rest);
    }
    out
}

/// Render a call as a tool-call YAML document (trailing newline included).
///
/// # Errors
///
/// Propagates YAML serialization failures.
pub fn render_tool_call(name: &str, arguments: &FunctionArgs) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&ToolCallDocumentRef {
        name,
        parameters: arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_literal_block_name_and_parameters() {
        let call =
            parse_tool_call_block("\nname: |-\n  get_weather\nparameters:\n  location: Seoul\n")
                .unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arguments["location"], json!("Seoul"));
    }

    #[test]
    fn tab_indented_body_is_accepted() {
        let call =
            parse_tool_call_block("\nname: |-\n\ttest_function0\nparameters:\n\tapple: |-\n\t\t1\n")
                .unwrap();
        assert_eq!(call.name, "test_function0");
        assert_eq!(call.arguments["apple"], json!("1"));
    }

    #[test]
    fn name_is_trimmed() {
        let call = parse_tool_call_block("name: \"  run  \"\n").unwrap();
        assert_eq!(call.name, "run");
    }

    #[test]
    fn missing_or_null_parameters_are_empty() {
        assert!(parse_tool_call_block("name: ping\n")
            .unwrap()
            .arguments
            .is_empty());
        assert!(parse_tool_call_block("name: ping\nparameters: null\n")
            .unwrap()
            .arguments
            .is_empty());
    }

    #[test]
    fn nested_parameters_keep_structure_and_order() {
        let call = parse_tool_call_block(
            "name: search\nparameters:\n  query: rust\n  limit: 5\n  filters:\n    lang: [en, ko]\n",
        )
        .unwrap();
        let keys: Vec<_> = call.arguments.keys().map(String::as_str).collect();
        assert_eq!(keys, ["query", "limit", "filters"]);
        assert_eq!(call.arguments["limit"], json!(5));
        assert_eq!(call.arguments["filters"], json!({"lang": ["en", "ko"]}));
    }

    #[test]
    fn rejects_empty_name() {
        let err = parse_tool_call_block("name: \"   \"\nparameters: {}\n").unwrap_err();
        assert!(matches!(err, CanonicalError::FcParse(_)));
        assert!(parse_tool_call_block("parameters: {}\n").is_err());
    }

    #[test]
    fn rejects_non_mapping_bodies() {
        assert!(parse_tool_call_block("just some prose").is_err());
        assert!(parse_tool_call_block("name: [unclosed").is_err());
        assert!(parse_tool_call_block("name: x\nparameters: [1, 2]\n").is_err());
    }

    #[test]
    fn rendered_document_parses_back() {
        let mut args = FunctionArgs::new();
        args.insert("code".into(), json!("print(\"hi\")\nprint(\"bye\")"));
        args.insert("retries".into(), json!(3));
        let doc = render_tool_call("run_python", &args).unwrap();
        assert!(doc.starts_with("name: run_python\n"));
        let call = parse_tool_call_block(&doc).unwrap();
        assert_eq!(call.name, "run_python");
        assert_eq!(call.arguments, args);
    }
}
