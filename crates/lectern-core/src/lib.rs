//! Session coordination and port definitions for Lectern.
//!
//! This crate defines the "ports" (store, repository, completion, and deck
//! traits) that the infrastructure layer implements, plus the coordinator that
//! drives them. It depends only on `lectern-types` -- never on
//! `lectern-infra` or any database/IO crate.

pub mod chat;
pub mod completion;
pub mod deck;
pub mod repository;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
