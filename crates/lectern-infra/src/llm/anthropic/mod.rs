//! Anthropic Messages API completion provider.

pub mod client;
pub mod types;

pub use client::AnthropicCompletionProvider;
