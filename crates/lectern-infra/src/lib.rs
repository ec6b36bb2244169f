//! Infrastructure layer for Lectern.
//!
//! Contains implementations of the ports defined in `lectern-core`: the SQLite
//! session repository, JSON transcript/annotation/cursor stores, the local
//! file store, the soffice/poppler deck tools, and the Anthropic completion
//! client.

pub mod config;
pub mod deck;
pub mod filesystem;
pub mod llm;
pub mod sqlite;
pub mod storage;
