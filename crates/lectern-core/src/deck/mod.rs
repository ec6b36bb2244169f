//! Deck conversion and rasterization ports.
//!
//! Slide-format decks are flattened to a paginated document by a
//! [`DocumentConverter`]; a [`PageRenderer`] then counts and rasterizes the
//! pages of that document one at a time.

pub mod cursor;
pub mod rasterizer;

use lectern_types::error::DeckError;
use lectern_types::session::{DeckKind, DeckRef, split_extension};

use std::path::{Path, PathBuf};

pub use cursor::{CursorStep, SlideCursor};
pub use rasterizer::{DeckRasterizer, PageStream};

/// Converts slide-format decks into a paginated document.
pub trait DocumentConverter: Send + Sync {
    /// Write the paginated form of `deck` into `out_dir` and return its path.
    ///
    /// Fails with `DeckError::UnsupportedPlatform` when no converter exists
    /// on this host.
    fn to_paginated(
        &self,
        deck: &DeckRef,
        out_dir: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf, DeckError>> + Send;
}

/// Counts and rasterizes pages of a paginated document.
pub trait PageRenderer: Send + Sync + 'static {
    fn page_count(
        &self,
        document: &Path,
    ) -> impl std::future::Future<Output = Result<u32, DeckError>> + Send;

    /// Rasterize the 0-based page `index` to a PNG at `output` and return
    /// the encoded bytes.
    fn render_page(
        &self,
        document: &Path,
        index: u32,
        output: &Path,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, DeckError>> + Send;
}

/// Classify an uploaded deck by its file name.
pub fn classify_deck(file_name: &str) -> Result<DeckKind, DeckError> {
    let (_, ext) = split_extension(file_name)
        .ok_or_else(|| DeckError::UnsupportedExtension(file_name.to_string()))?;
    DeckKind::from_extension(&ext).ok_or(DeckError::UnsupportedExtension(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_deck() {
        assert_eq!(classify_deck("week1.PDF").unwrap(), DeckKind::Document);
        assert_eq!(classify_deck("intro.pptx").unwrap(), DeckKind::Slides);
        assert!(matches!(
            classify_deck("notes.docx"),
            Err(DeckError::UnsupportedExtension(ext)) if ext == "docx"
        ));
        assert!(classify_deck("README").is_err());
    }
}
