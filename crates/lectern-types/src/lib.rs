//! Shared domain types for Lectern.
//!
//! This crate contains the core domain types used across the chat session
//! engine: sessions, turns, annotations, deck cursors, configuration, and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod deck;
pub mod error;
pub mod session;
pub mod transcript;
