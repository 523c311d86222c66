use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::CanonicalError;
use crate::protocol::canonical::{ChatContext, Content};
use crate::stream::StreamContent;

/// The streaming generation contract.
///
/// Implemented by real upstream services and by wrappers such as the
/// tool-call emulator, which makes wrappers stackable.
pub trait Model: Send + Sync {
    /// Start a generation for `input` on top of `chat`.
    ///
    /// Returns immediately; output is delivered through the returned
    /// [`StreamContent`]. The worker observes `cancel` at every suspension
    /// point and records [`CanonicalError::Cancelled`] when it fires.
    fn generate_stream(
        &self,
        cancel: CancellationToken,
        chat: ChatContext,
        input: Content,
    ) -> StreamContent;

    /// Model identifier as reported to callers.
    fn name(&self) -> &str;

    /// Release provider resources.
    ///
    /// # Errors
    ///
    /// Returns a provider-specific error when shutdown fails.
    fn close(&self) -> Result<(), CanonicalError> {
        Ok(())
    }
}

impl<M: Model + ?Sized> Model for Arc<M> {
    fn generate_stream(
        &self,
        cancel: CancellationToken,
        chat: ChatContext,
        input: Content,
    ) -> StreamContent {
        (**self).generate_stream(cancel, chat, input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&self) -> Result<(), CanonicalError> {
        (**self).close()
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn generate_stream(
        &self,
        cancel: CancellationToken,
        chat: ChatContext,
        input: Content,
    ) -> StreamContent {
        (**self).generate_stream(cancel, chat, input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&self) -> Result<(), CanonicalError> {
        (**self).close()
    }
}
