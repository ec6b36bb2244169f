//! Completion provider implementations.

pub mod anthropic;
