//! CompletionProvider trait definition.
//!
//! The completion service is stateless: every call carries the full prior
//! transcript, a new prompt, and at most one attachment.

use lectern_types::error::CompletionError;
use lectern_types::transcript::{Attachment, Turn};

/// One completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    /// Prior turns in sequence order, hidden ones included.
    pub history: &'a [Turn],
    pub prompt: &'a str,
    pub attachment: Option<&'a Attachment>,
}

/// Model output for a completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReply {
    pub text: String,
}

/// Trait for completion backends.
///
/// Implementations live in lectern-infra (e.g., `AnthropicCompletionProvider`).
pub trait CompletionProvider: Send + Sync {
    /// Human-readable provider name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send the request and wait for the full reply.
    fn complete(
        &self,
        request: &CompletionRequest<'_>,
    ) -> impl std::future::Future<Output = Result<CompletionReply, CompletionError>> + Send;
}
