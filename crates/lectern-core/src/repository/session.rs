//! SessionRepository trait definition.
//!
//! Persists the small session row (identity, course, title, slides mode, deck
//! reference, lifecycle state). Transcripts and annotations live elsewhere.

use lectern_types::error::RepositoryError;
use lectern_types::session::Session;
use uuid::Uuid;

/// Repository trait for session row persistence.
///
/// Implementations live in lectern-infra (e.g., `SqliteSessionRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait SessionRepository: Send + Sync {
    /// Insert a new session row. Fails with `Conflict` if the id exists.
    fn create(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a session by its unique ID.
    fn get(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    /// Overwrite the mutable columns of an existing session.
    fn update(
        &self,
        session: &Session,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a session row. Returns `true` if a row was removed.
    fn delete(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// List active sessions of a course, newest first.
    fn list_by_course(
        &self,
        course_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Session>, RepositoryError>> + Send;
}
