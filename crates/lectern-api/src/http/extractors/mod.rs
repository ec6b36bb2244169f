//! Request extractors.

pub mod auth;
pub mod multipart;
