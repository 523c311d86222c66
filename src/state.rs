//! Shared, thread-safe helpers used across generations.

mod call_id;

pub use call_id::{AnthropicCallIds, CallIdGenerator, OpenAiCallIds};
