//! SQLite session repository implementation.
//!
//! Implements `SessionRepository` from `lectern-core` using sqlx with split
//! read/write pools: raw queries, a private Row struct, writes on the single
//! writer connection.

use chrono::{DateTime, Utc};
use lectern_core::repository::session::SessionRepository;
use lectern_types::error::RepositoryError;
use lectern_types::session::{DeckKind, DeckRef, Session, SessionState};
use sqlx::Row;
use uuid::Uuid;

use std::path::PathBuf;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct SessionRow {
    id: String,
    course_id: String,
    title: String,
    slides_mode: bool,
    deck_name: Option<String>,
    deck_path: Option<String>,
    deck_kind: Option<String>,
    state: String,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            course_id: row.try_get("course_id")?,
            title: row.try_get("title")?,
            slides_mode: row.try_get("slides_mode")?,
            deck_name: row.try_get("deck_name")?,
            deck_path: row.try_get("deck_path")?,
            deck_kind: row.try_get("deck_kind")?,
            state: row.try_get("state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let course_id = Uuid::parse_str(&self.course_id)
            .map_err(|e| RepositoryError::Query(format!("invalid course_id: {e}")))?;
        let state: SessionState = self
            .state
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        let deck = match (self.deck_name, self.deck_path, self.deck_kind) {
            (Some(original_name), Some(path), Some(kind)) => Some(DeckRef {
                original_name,
                stored_path: PathBuf::from(path),
                kind: kind
                    .parse::<DeckKind>()
                    .map_err(|e: String| RepositoryError::Query(e))?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(RepositoryError::Query(format!(
                    "session {id} has a partial deck reference"
                )));
            }
        };

        Ok(Session {
            id,
            course_id,
            title: self.title,
            slides_mode: self.slides_mode,
            deck,
            state,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn deck_columns(deck: Option<&DeckRef>) -> (Option<&str>, Option<String>, Option<String>) {
    match deck {
        Some(d) => (
            Some(d.original_name.as_str()),
            Some(d.stored_path.to_string_lossy().into_owned()),
            Some(d.kind.to_string()),
        ),
        None => (None, None, None),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ---------------------------------------------------------------------------
// SessionRepository implementation
// ---------------------------------------------------------------------------

impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        let (deck_name, deck_path, deck_kind) = deck_columns(session.deck.as_ref());

        sqlx::query(
            r#"INSERT INTO sessions (id, course_id, title, slides_mode, deck_name, deck_path, deck_kind, state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(session.course_id.to_string())
        .bind(&session.title)
        .bind(session.slides_mode)
        .bind(deck_name)
        .bind(deck_path)
        .bind(deck_kind)
        .bind(session.state.to_string())
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict(format!("session {} already exists", session.id))
            } else {
                RepositoryError::Query(e.to_string())
            }
        })?;

        Ok(())
    }

    async fn get(&self, session_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        let (deck_name, deck_path, deck_kind) = deck_columns(session.deck.as_ref());

        let result = sqlx::query(
            r#"UPDATE sessions
               SET title = ?, slides_mode = ?, deck_name = ?, deck_path = ?, deck_kind = ?,
                   state = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&session.title)
        .bind(session.slides_mode)
        .bind(deck_name)
        .bind(deck_path)
        .bind(deck_kind)
        .bind(session.state.to_string())
        .bind(format_datetime(&session.updated_at))
        .bind(session.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete(&self, session_id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_course(&self, course_id: &Uuid) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE course_id = ? AND state = 'active' ORDER BY created_at DESC, id DESC",
        )
        .bind(course_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row =
                SessionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }
}
