//! Deck rasterization and slide cursor types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::path::PathBuf;

use crate::session::DeckRef;
use crate::transcript::MediaRef;

/// Current on-disk format version of [`SlideCursorState`].
pub const CURSOR_FORMAT_VERSION: u32 = 1;

/// A deck that has been flattened to paginated form and counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedDeck {
    pub deck: DeckRef,
    /// Paginated (PDF) form of the deck. Equal to `deck.stored_path` for
    /// documents.
    pub paginated_path: PathBuf,
    pub page_count: u32,
}

/// Replayable position inside a deck.
///
/// Holds everything required to render the next unseen page again from
/// scratch: no execution state is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideCursorState {
    pub version: u32,
    pub session_id: Uuid,
    pub deck: DeckRef,
    pub paginated_path: PathBuf,
    pub page_count: u32,
    /// Index of the next unseen page (0-based). Equals `page_count` once
    /// every page has been emitted.
    pub position: u32,
    /// Directory holding this session's rasterized pages and `cursor.json`.
    pub raster_dir: PathBuf,
}

impl SlideCursorState {
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.page_count
    }
}

/// A rasterized page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A page emitted by the rasterizer, persisted as a standalone artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 0-based page index.
    pub index: u32,
    pub page_ref: MediaRef,
    pub path: PathBuf,
    pub image: PageImage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DeckKind;

    fn state(position: u32, page_count: u32) -> SlideCursorState {
        SlideCursorState {
            version: CURSOR_FORMAT_VERSION,
            session_id: Uuid::now_v7(),
            deck: DeckRef {
                original_name: "week1.pdf".to_string(),
                stored_path: PathBuf::from("/data/decks/s/deck.pdf"),
                kind: DeckKind::Document,
            },
            paginated_path: PathBuf::from("/data/decks/s/deck.pdf"),
            page_count,
            position,
            raster_dir: PathBuf::from("/data/decks/s"),
        }
    }

    #[test]
    fn test_cursor_exhaustion() {
        assert!(!state(0, 3).is_exhausted());
        assert!(!state(2, 3).is_exhausted());
        assert!(state(3, 3).is_exhausted());
        assert!(state(0, 0).is_exhausted());
    }

    #[test]
    fn test_cursor_state_serde_roundtrip() {
        let original = state(1, 3);
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"version\":1"));
        assert!(json.contains("\"kind\":\"document\""));
        let parsed: SlideCursorState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
