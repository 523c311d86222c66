use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Ordered argument mapping of a function call.
pub type FunctionArgs = serde_json::Map<String, serde_json::Value>;

/// Canonical message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Function,
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Unknown,
    Error,
    Safety,
    Recitation,
    Stop,
    MaxTokens,
    ToolUse,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Unknown => "unknown",
            FinishReason::Error => "error",
            FinishReason::Safety => "safety",
            FinishReason::Recitation => "recitation",
            FinishReason::Stop => "stop",
            FinishReason::MaxTokens => "max_tokens",
            FinishReason::ToolUse => "tool_use",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage information. Not every provider reports usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageData {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageData {
    #[must_use]
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// A provider-specific reasoning trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingBlock {
    pub data: String,
    pub signature: Option<String>,
    pub redacted: bool,
}

/// A single piece of conversational content.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    InlineData {
        mime_type: String,
        data: Bytes,
    },
    FileData {
        mime_type: String,
        file_uri: String,
    },
    FunctionCall {
        id: String,
        name: String,
        args: FunctionArgs,
    },
    FunctionResponse {
        id: String,
        name: String,
        content: serde_json::Value,
        is_error: bool,
    },
    Thinking(ThinkingBlock),
}

/// Discriminant of a [`Segment`], handy for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Text,
    InlineData,
    FileData,
    FunctionCall,
    FunctionResponse,
    Thinking,
}

impl Segment {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text(text.into())
    }

    #[must_use]
    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::Text(_) => SegmentKind::Text,
            Segment::InlineData { .. } => SegmentKind::InlineData,
            Segment::FileData { .. } => SegmentKind::FileData,
            Segment::FunctionCall { .. } => SegmentKind::FunctionCall,
            Segment::FunctionResponse { .. } => SegmentKind::FunctionResponse,
            Segment::Thinking(_) => SegmentKind::Thinking,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_function_call(&self) -> bool {
        matches!(self, Segment::FunctionCall { .. })
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Segment>,
}

impl Content {
    #[must_use]
    pub fn new(role: Role, parts: Vec<Segment>) -> Self {
        Self { role, parts }
    }

    /// Content holding a single text segment.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Segment::Text(text.into())],
        }
    }

    #[must_use]
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_function_calls(&self) -> bool {
        self.parts.iter().any(Segment::is_function_call)
    }
}

/// Concatenate every text segment of `content`, skipping other kinds.
#[must_use]
pub fn text_from_content(content: &Content) -> String {
    let mut out = String::new();
    for part in &content.parts {
        if let Segment::Text(text) = part {
            out.push_str(text);
        }
    }
    out
}

/// OpenAPI primitive types accepted in tool schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Subset of the OpenAPI schema object used to describe tool parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl Schema {
    #[must_use]
    pub fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            title: String::new(),
            description: String::new(),
            properties: BTreeMap::new(),
            items: None,
            required: Vec::new(),
            nullable: false,
            format: String::new(),
            enum_values: Vec::new(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    #[must_use]
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }
}

/// A tool's function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub schema: Option<Schema>,
}

/// Conversation history plus the tools available for the current turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatContext {
    pub history: Vec<Content>,
    pub tools: Vec<FunctionDeclaration>,
}

impl ChatContext {
    #[must_use]
    pub fn new(history: Vec<Content>) -> Self {
        Self {
            history,
            tools: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_from_content_skips_non_text_parts() {
        let content = Content::new(
            Role::Model,
            vec![
                Segment::text("Hello, "),
                Segment::FunctionCall {
                    id: "call_1".into(),
                    name: "noop".into(),
                    args: FunctionArgs::new(),
                },
                Segment::text("world"),
            ],
        );
        assert_eq!(text_from_content(&content), "Hello, world");
        assert!(content.has_function_calls());
    }

    #[test]
    fn finish_reason_wire_names() {
        assert_eq!(FinishReason::ToolUse.to_string(), "tool_use");
        assert_eq!(
            serde_json::to_string(&FinishReason::MaxTokens).unwrap(),
            "\"max_tokens\""
        );
    }

    #[test]
    fn schema_serialization_omits_empty_fields() {
        let schema = Schema::new(SchemaType::Object)
            .with_property(
                "location",
                Schema::new(SchemaType::String).with_description("City name"),
            )
            .with_required("location");
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "City name"}
                },
                "required": ["location"]
            })
        );
    }
}
