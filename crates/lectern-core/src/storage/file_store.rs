//! File store trait.
//!
//! Persists uploaded decks and chat attachments as standalone artifacts and
//! hands back stable references to them. Implementations live in
//! lectern-infra.

use lectern_types::error::StoreError;
use lectern_types::session::{DeckKind, DeckRef, SessionKey};
use lectern_types::transcript::{Attachment, MediaRef};

use std::path::Path;

/// Trait for session file storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait FileStore: Send + Sync {
    /// Store an uploaded deck inside `raster_dir`, creating the directory.
    ///
    /// The caller has already classified the deck from its extension.
    fn save_deck(
        &self,
        raster_dir: &Path,
        original_name: &str,
        kind: DeckKind,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<DeckRef, StoreError>> + Send;

    /// Store a chat attachment for a session and return it ready to be
    /// forwarded to the completion service.
    fn save_attachment(
        &self,
        key: SessionKey,
        original_name: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<Attachment, StoreError>> + Send;

    /// Delete one stored artifact. Missing artifacts are ignored.
    fn remove_media(
        &self,
        media_ref: &MediaRef,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete a directory tree. Missing directories are ignored.
    fn remove_dir(
        &self,
        dir: &Path,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete every deck generation and attachment a session owns.
    fn remove_session_files(
        &self,
        key: SessionKey,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
