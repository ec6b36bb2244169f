//! Transcript, annotation, and cursor store traits.
//!
//! The three stores are separate ports but are usually implemented by one
//! backing type. None of them provides cross-store atomicity: the coordinator
//! sequences their writes and compensates on failure.

use lectern_types::error::StoreError;
use lectern_types::transcript::{Annotation, Turn, TurnDraft};
use uuid::Uuid;

use std::collections::BTreeMap;
use std::path::Path;

/// Append-only, ordered log of turns per session.
pub trait TranscriptStore: Send + Sync {
    /// Create an empty transcript if none exists yet.
    fn provision_transcript(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Append turns in order as one unit and return them with their assigned
    /// sequence numbers. Either all drafts are appended or none are.
    fn append_many(
        &self,
        session_id: &Uuid,
        drafts: Vec<TurnDraft>,
    ) -> impl std::future::Future<Output = Result<Vec<Turn>, StoreError>> + Send;

    /// All turns in sequence order. A missing transcript reads as empty.
    fn read_all(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Turn>, StoreError>> + Send;

    /// Drop every turn with `sequence_no >= len`. Used only to roll back a
    /// failed commit.
    fn truncate(
        &self,
        session_id: &Uuid,
        len: u32,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Remove the transcript. Removing a missing transcript is not an error.
    fn remove_transcript(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Sparse side-index of display directives keyed by sequence number.
pub trait AnnotationStore: Send + Sync {
    /// Create an empty annotation index if none exists yet.
    fn provision_annotations(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Merge annotations into the index as one unit (see [`Annotation::merge`]).
    fn put_many(
        &self,
        session_id: &Uuid,
        annotations: Vec<Annotation>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Every annotation of the session keyed by sequence number.
    fn get_all(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<BTreeMap<u32, Annotation>, StoreError>> + Send;

    /// Overwrite the whole index. Used only to restore a snapshot.
    fn replace_all(
        &self,
        session_id: &Uuid,
        annotations: BTreeMap<u32, Annotation>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    fn remove_annotations(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Serialized slide cursors, colocated with the raster directory they describe.
pub trait CursorStore: Send + Sync {
    fn load_cursor(
        &self,
        raster_dir: &Path,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Replace the cursor atomically.
    fn save_cursor(
        &self,
        raster_dir: &Path,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
