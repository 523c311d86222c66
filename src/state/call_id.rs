const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of unique tool-call identifiers.
///
/// Shared between concurrent generations, so implementations must be safe to
/// call without external locking.
pub trait CallIdGenerator: Send + Sync + std::fmt::Debug {
    fn new_call_id(&self) -> String;
}

/// `call_` followed by 24 random alphanumerics.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiCallIds;

/// `toolu_01` followed by 21 random alphanumerics.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicCallIds;

impl CallIdGenerator for OpenAiCallIds {
    fn new_call_id(&self) -> String {
        random_id("call_", 24)
    }
}

impl CallIdGenerator for AnthropicCallIds {
    fn new_call_id(&self) -> String {
        random_id("toolu_01", 21)
    }
}

// fastrand keeps a thread-local generator, so concurrent callers never contend.
fn random_id(prefix: &str, len: usize) -> String {
    let mut id = String::with_capacity(prefix.len() + len);
    id.push_str(prefix);
    for _ in 0..len {
        let idx = fastrand::usize(..ALPHANUMERIC.len());
        id.push(char::from(ALPHANUMERIC[idx]));
    }
    id
}
