//! Transcript, annotation, and media types.
//!
//! A transcript is the ordered list of [`Turn`]s of a session. Annotations are
//! a sparse side-index over the same sequence numbers that control how a turn
//! is displayed (hidden, or carrying a media attachment).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Model => write!(f, "model"),
        }
    }
}

impl FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(TurnRole::User),
            "model" => Ok(TurnRole::Model),
            other => Err(format!("invalid turn role: '{other}'")),
        }
    }
}

/// Stable reference to a persisted media artifact (rasterized page or upload).
///
/// Stored relative to the data directory when possible so the whole data
/// directory can be moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One part of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPart {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<MediaRef>,
}

impl TurnPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media_ref: None,
        }
    }

    pub fn with_media(text: impl Into<String>, media_ref: MediaRef) -> Self {
        Self {
            text: text.into(),
            media_ref: Some(media_ref),
        }
    }
}

/// A turn that has not been appended yet (no sequence number).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnDraft {
    pub role: TurnRole,
    pub parts: Vec<TurnPart>,
}

impl TurnDraft {
    pub fn user(parts: Vec<TurnPart>) -> Self {
        Self {
            role: TurnRole::User,
            parts,
        }
    }

    pub fn model(parts: Vec<TurnPart>) -> Self {
        Self {
            role: TurnRole::Model,
            parts,
        }
    }

    /// Concatenated text of all parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// One appended, immutable message unit of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: Uuid,
    /// Position in the transcript; contiguous from 0.
    pub sequence_no: u32,
    pub role: TurnRole,
    pub parts: Vec<TurnPart>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Concatenated text of all parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Display directive for a single turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub session_id: Uuid,
    pub sequence_no: u32,
    /// Hide the turn from the caller-visible conversation.
    #[serde(default)]
    pub skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<MediaRef>,
}

impl Annotation {
    /// Annotation hiding a turn.
    pub fn hidden(session_id: Uuid, sequence_no: u32) -> Self {
        Self {
            session_id,
            sequence_no,
            skip: true,
            media_ref: None,
        }
    }

    /// Annotation attaching media to a turn.
    pub fn media(session_id: Uuid, sequence_no: u32, media_ref: MediaRef) -> Self {
        Self {
            session_id,
            sequence_no,
            skip: false,
            media_ref: Some(media_ref),
        }
    }

    /// Merge a newer annotation for the same turn into this one.
    ///
    /// `skip` is sticky; the newer media reference wins when present.
    pub fn merge(&mut self, newer: Annotation) {
        self.skip |= newer.skip;
        if newer.media_ref.is_some() {
            self.media_ref = newer.media_ref;
        }
    }
}

/// A caller-visible conversation entry produced by the transcript view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub sequence_no: u32,
    pub role: TurnRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<MediaRef>,
}

/// Bytes handed to the completion service alongside a prompt.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub media_ref: MediaRef,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_role_roundtrip() {
        for role in [TurnRole::User, TurnRole::Model] {
            let parsed: TurnRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("assistant".parse::<TurnRole>().is_err());
    }

    #[test]
    fn test_annotation_merge_keeps_skip_and_newest_media() {
        let sid = Uuid::now_v7();
        let mut ann = Annotation::hidden(sid, 3);
        ann.merge(Annotation::media(sid, 3, MediaRef("decks/p1.png".into())));
        assert!(ann.skip);
        assert_eq!(ann.media_ref, Some(MediaRef("decks/p1.png".into())));

        ann.merge(Annotation {
            session_id: sid,
            sequence_no: 3,
            skip: false,
            media_ref: None,
        });
        assert!(ann.skip);
        assert_eq!(ann.media_ref, Some(MediaRef("decks/p1.png".into())));
    }

    #[test]
    fn test_annotation_deserialize_defaults() {
        let json = format!(
            r#"{{"session_id":"{}","sequence_no":4}}"#,
            Uuid::now_v7()
        );
        let ann: Annotation = serde_json::from_str(&json).unwrap();
        assert!(!ann.skip);
        assert!(ann.media_ref.is_none());
    }

    #[test]
    fn test_media_ref_is_transparent() {
        let json = serde_json::to_string(&MediaRef("files/a.png".into())).unwrap();
        assert_eq!(json, "\"files/a.png\"");
    }

    #[test]
    fn test_draft_text_concatenates_parts() {
        let draft = TurnDraft::user(vec![TurnPart::text("Explain "), TurnPart::text("this")]);
        assert_eq!(draft.text(), "Explain this");
        assert_eq!(draft.role, TurnRole::User);
    }
}
