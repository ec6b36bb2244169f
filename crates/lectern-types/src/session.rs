//! Chat session types for Lectern.
//!
//! A session is one conversation about (optionally) one uploaded deck. The
//! session row itself is small; the transcript, annotations, and slide cursor
//! live in separate backing artifacts keyed by [`SessionKey`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Maximum length of a session title, in characters.
pub const MAX_TITLE_CHARS: usize = 150;

/// Lifecycle state of a chat session.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (state IN ('created', 'provisioned', 'active'))`.
/// `Deleted` is terminal and never persisted -- a deleted session has no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Provisioned,
    Active,
    Deleted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Provisioned => write!(f, "provisioned"),
            SessionState::Active => write!(f, "active"),
            SessionState::Deleted => write!(f, "deleted"),
        }
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(SessionState::Created),
            "provisioned" => Ok(SessionState::Provisioned),
            "active" => Ok(SessionState::Active),
            "deleted" => Ok(SessionState::Deleted),
            other => Err(format!("invalid session state: '{other}'")),
        }
    }
}

impl SessionState {
    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Provisioned)
                | (Provisioned, Active)
                | (Created, Deleted)
                | (Provisioned, Deleted)
                | (Active, Deleted)
        )
    }
}

/// Source kind of an uploaded deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeckKind {
    /// Already paginated (PDF); rendered directly.
    Document,
    /// Slide format; flattened to PDF by an external converter first.
    Slides,
}

impl DeckKind {
    /// Classify a lowercase file extension. Returns `None` for unsupported ones.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(DeckKind::Document),
            "pptx" | "ppt" | "odp" => Some(DeckKind::Slides),
            _ => None,
        }
    }
}

impl fmt::Display for DeckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckKind::Document => write!(f, "document"),
            DeckKind::Slides => write!(f, "slides"),
        }
    }
}

impl FromStr for DeckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document" => Ok(DeckKind::Document),
            "slides" => Ok(DeckKind::Slides),
            other => Err(format!("invalid deck kind: '{other}'")),
        }
    }
}

/// Split a file name into `(stem, lowercase extension)`.
///
/// `"Lecture 3.PPTX"` becomes `("Lecture 3", "pptx")`. Names without a dot,
/// or with an empty stem or extension, yield `None`.
pub fn split_extension(file_name: &str) -> Option<(&str, String)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some((stem, ext.to_lowercase()))
}

/// Reference to a deck stored for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckRef {
    /// File name as uploaded by the user.
    pub original_name: String,
    /// Where the uploaded bytes were stored.
    pub stored_path: PathBuf,
    pub kind: DeckKind,
}

/// A chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Opaque reference into the external course service.
    pub course_id: Uuid,
    pub title: String,
    /// True while there are unseen slides to walk through.
    pub slides_mode: bool,
    pub deck: Option<DeckRef>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Build a fresh session row in the `Created` state.
    pub fn new(course_id: Uuid, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            course_id,
            title,
            slides_mode: false,
            deck: None,
            state: SessionState::Created,
            created_at: now,
            updated_at: now,
        }
    }

    /// The per-session artifact key.
    pub fn key(&self) -> SessionKey {
        SessionKey(self.id)
    }
}

/// Reversible per-session identifier used to name backing artifacts.
///
/// Renders as `session_<uuid-simple>` and parses back from that form (with or
/// without a trailing artifact suffix such as `.transcript.json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(pub Uuid);

impl SessionKey {
    const PREFIX: &'static str = "session_";

    /// Recover the session key from an artifact file or directory name.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(Self::PREFIX)?;
        let simple = rest.split('.').next()?;
        Uuid::try_parse(simple).ok().map(SessionKey)
    }

    pub fn session_id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_roundtrip() {
        for state in [
            SessionState::Created,
            SessionState::Provisioned,
            SessionState::Active,
            SessionState::Deleted,
        ] {
            let parsed: SessionState = state.to_string().parse().unwrap();
            assert_eq!(state, parsed);
        }
    }

    #[test]
    fn test_session_state_transitions() {
        assert!(SessionState::Created.can_transition_to(SessionState::Provisioned));
        assert!(SessionState::Provisioned.can_transition_to(SessionState::Active));
        assert!(SessionState::Active.can_transition_to(SessionState::Deleted));
        assert!(!SessionState::Active.can_transition_to(SessionState::Created));
        assert!(!SessionState::Deleted.can_transition_to(SessionState::Active));
        assert!(!SessionState::Created.can_transition_to(SessionState::Active));
    }

    #[test]
    fn test_deck_kind_from_extension() {
        assert_eq!(DeckKind::from_extension("pdf"), Some(DeckKind::Document));
        assert_eq!(DeckKind::from_extension("pptx"), Some(DeckKind::Slides));
        assert_eq!(DeckKind::from_extension("odp"), Some(DeckKind::Slides));
        assert_eq!(DeckKind::from_extension("docx"), None);
        assert_eq!(DeckKind::from_extension("exe"), None);
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(
            split_extension("Lecture 3.PPTX"),
            Some(("Lecture 3", "pptx".to_string()))
        );
        assert_eq!(
            split_extension("archive.tar.gz"),
            Some(("archive.tar", "gz".to_string()))
        );
        assert_eq!(split_extension("README"), None);
        assert_eq!(split_extension(".pdf"), None);
        assert_eq!(split_extension("slides."), None);
    }

    #[test]
    fn test_session_key_is_reversible() {
        let id = Uuid::now_v7();
        let key = SessionKey(id);
        let name = key.to_string();
        assert!(name.starts_with("session_"));
        assert_eq!(SessionKey::parse(&name), Some(key));
        assert_eq!(
            SessionKey::parse(&format!("{name}.transcript.json")),
            Some(key)
        );
        assert_eq!(SessionKey::parse("chat_12.json"), None);
        assert_eq!(SessionKey::parse("session_nope"), None);
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new(Uuid::now_v7(), "Week 1".to_string());
        assert_eq!(session.state, SessionState::Created);
        assert!(!session.slides_mode);
        assert!(session.deck.is_none());
        assert_eq!(session.key().session_id(), session.id);
    }

    #[test]
    fn test_session_serialize() {
        let session = Session::new(Uuid::now_v7(), "Week 1".to_string());
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"state\":\"created\""));
        assert!(json.contains("\"slides_mode\":false"));
    }
}
