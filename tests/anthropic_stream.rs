use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use coord::config::SoftCallConfig;
use coord::error::{CanonicalError, UpstreamErrorKind};
use coord::fc::SoftCallModel;
use coord::model::Model;
use coord::protocol::anthropic::stream::{assemble_anthropic_stream, parse_anthropic_sse};
use coord::protocol::anthropic::AnthropicStreamEvent;
use coord::protocol::canonical::{
    ChatContext, Content, FinishReason, FunctionDeclaration, Role, Segment, UsageData,
};
use coord::state::AnthropicCallIds;
use coord::stream::StreamContent;

fn sse(event_type: &str, data: &str) -> AnthropicStreamEvent {
    parse_anthropic_sse(event_type, data).expect("valid anthropic event")
}

fn message_start() -> AnthropicStreamEvent {
    sse(
        "message_start",
        r#"{"type":"message_start","message":{"id":"msg_1","type":"message","role":"assistant","content":[],"model":"claude","stop_reason":null,"usage":{"input_tokens":40,"output_tokens":1}}}"#,
    )
}

fn text_block(index: usize, deltas: &[&str]) -> Vec<AnthropicStreamEvent> {
    let mut events = vec![sse(
        "content_block_start",
        &format!(
            r#"{{"type":"content_block_start","index":{index},"content_block":{{"type":"text","text":""}}}}"#
        ),
    )];
    for delta in deltas {
        let text = serde_json::to_string(delta).expect("string encodes");
        events.push(sse(
            "content_block_delta",
            &format!(
                r#"{{"type":"content_block_delta","index":{index},"delta":{{"type":"text_delta","text":{text}}}}}"#
            ),
        ));
    }
    events.push(sse(
        "content_block_stop",
        &format!(r#"{{"type":"content_block_stop","index":{index}}}"#),
    ));
    events
}

fn message_end(stop_reason: &str, output_tokens: u64) -> Vec<AnthropicStreamEvent> {
    vec![
        sse(
            "message_delta",
            &format!(
                r#"{{"type":"message_delta","delta":{{"stop_reason":"{stop_reason}","stop_sequence":null}},"usage":{{"output_tokens":{output_tokens}}}}}"#
            ),
        ),
        sse("message_stop", r#"{"type":"message_stop"}"#),
    ]
}

fn text_response(deltas: &[&str]) -> Vec<AnthropicStreamEvent> {
    let mut events = vec![message_start()];
    events.extend(text_block(0, deltas));
    events.extend(message_end("end_turn", 12));
    events
}

fn replay(events: Vec<AnthropicStreamEvent>, cancel: CancellationToken) -> StreamContent {
    assemble_anthropic_stream(stream::iter(events.into_iter().map(Ok)), cancel, 8)
}

#[tokio::test]
async fn test_text_stream_is_assembled() {
    let (live, outcome) = replay(text_response(&["Hello", ", ", "world"]), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(
        live,
        [Segment::text("Hello"), Segment::text(", "), Segment::text("world")]
    );
    assert!(outcome.error.is_none());
    assert_eq!(outcome.content.parts, vec![Segment::text("Hello, world")]);
    assert_eq!(outcome.usage, Some(UsageData::new(40, 12)));
    assert_eq!(outcome.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn test_error_event_fails_the_stream() {
    let mut events = vec![message_start()];
    let mut block = text_block(0, &["Partial"]);
    block.pop();
    events.extend(block);
    events.push(sse(
        "error",
        r#"{"type":"error","error":{"type":"rate_limit_error","message":"Too many requests"}}"#,
    ));

    let (live, outcome) = replay(events, CancellationToken::new()).collect().await;
    assert_eq!(live, [Segment::text("Partial")]);
    assert_eq!(
        outcome.error,
        Some(CanonicalError::upstream(
            UpstreamErrorKind::RateLimit,
            "Too many requests"
        ))
    );
    assert_eq!(outcome.finish_reason, FinishReason::Error);
    assert_eq!(outcome.content.parts, vec![Segment::text("Partial")]);
}

#[tokio::test]
async fn test_out_of_sequence_block_is_invalid() {
    let mut events = vec![message_start()];
    events.extend(text_block(1, &["skipped index zero"]));

    let outcome = replay(events, CancellationToken::new()).finish().await;
    assert!(matches!(
        outcome.error,
        Some(CanonicalError::InvalidResponse(_))
    ));
    assert!(outcome.content.parts.is_empty());
}

#[tokio::test]
async fn test_transport_error_is_propagated() {
    let events = vec![
        Ok(message_start()),
        Err(CanonicalError::Decode("connection reset".into())),
    ];
    let outcome = assemble_anthropic_stream(stream::iter(events), CancellationToken::new(), 8)
        .finish()
        .await;
    assert_eq!(
        outcome.error,
        Some(CanonicalError::Decode("connection reset".into()))
    );
}

#[tokio::test]
async fn test_cancellation_while_waiting_for_events() {
    let cancel = CancellationToken::new();
    let head = stream::iter(text_block(0, &["waiting"]).into_iter().map(Ok));
    let events = stream::iter([Ok(message_start())]).chain(head).chain(stream::pending());
    let mut content = assemble_anthropic_stream(Box::pin(events), cancel.clone(), 8);

    assert_eq!(content.next_segment().await, Some(Segment::text("waiting")));
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), content.finish())
        .await
        .expect("stream must close after cancellation");
    assert_eq!(outcome.error, Some(CanonicalError::Cancelled));
    assert_eq!(outcome.content.parts, vec![Segment::text("waiting")]);
}

/// Text-only model backed by canned Anthropic events.
struct CannedAnthropic {
    deltas: Vec<&'static str>,
}

impl Model for CannedAnthropic {
    fn generate_stream(
        &self,
        cancel: CancellationToken,
        chat: ChatContext,
        _input: Content,
    ) -> StreamContent {
        assert!(chat.tools.is_empty(), "emulated upstream must not see tools");
        replay(text_response(&self.deltas), cancel)
    }

    fn name(&self) -> &str {
        "claude-canned"
    }
}

#[tokio::test]
async fn test_softcall_over_anthropic_events() {
    let upstream = CannedAnthropic {
        deltas: vec![
            "<reasoning>Need the time.</reasoning>\n\n<tool",
            "_call>\nname: current_time\nparameters:\n  zone: Asia/Seoul\n</tool_",
            "call>",
        ],
    };
    let model = SoftCallModel::new(upstream, SoftCallConfig::default())
        .with_call_ids(std::sync::Arc::new(AnthropicCallIds));
    let chat = ChatContext::new(Vec::new()).with_tools(vec![FunctionDeclaration {
        name: "current_time".into(),
        description: "Current time in a zone".into(),
        schema: None,
    }]);

    let outcome = model
        .generate_stream(
            CancellationToken::new(),
            chat,
            Content::text(Role::User, "What time is it in Seoul?"),
        )
        .finish()
        .await;

    assert!(outcome.error.is_none());
    assert_eq!(outcome.finish_reason, FinishReason::ToolUse);
    assert_eq!(outcome.usage, Some(UsageData::new(40, 12)));
    match outcome.content.parts.as_slice() {
        [Segment::FunctionCall { id, name, args }] => {
            assert!(id.starts_with("toolu_01"));
            assert_eq!(name, "current_time");
            assert_eq!(args["zone"], "Asia/Seoul");
        }
        other => panic!("expected a single function call, got {other:?}"),
    }
}
