//! Replayable slide cursor.
//!
//! The cursor persists only its position and the inputs needed to rebuild
//! the page stream. Restoring re-creates the lazy stream starting at the next
//! unseen page, so restore-then-advance yields exactly what an uninterrupted
//! cursor would have yielded.

use std::path::PathBuf;

use futures_util::StreamExt;
use lectern_types::deck::{CURSOR_FORMAT_VERSION, RenderedPage, SlideCursorState};
use lectern_types::error::{DeckError, StoreError};
use lectern_types::session::DeckRef;
use uuid::Uuid;

use super::rasterizer::{DeckRasterizer, PageStream};
use super::{DocumentConverter, PageRenderer};

/// Outcome of [`SlideCursor::advance`].
#[derive(Debug)]
pub enum CursorStep {
    Page(RenderedPage),
    Exhausted,
}

pub struct SlideCursor {
    state: SlideCursorState,
    pages: PageStream,
    poisoned: bool,
}

impl SlideCursor {
    /// Prepare a freshly uploaded deck and position the cursor before its
    /// first page.
    pub async fn open<C: DocumentConverter, G: PageRenderer>(
        rasterizer: &DeckRasterizer<C, G>,
        session_id: Uuid,
        deck: DeckRef,
        raster_dir: PathBuf,
    ) -> Result<Self, DeckError> {
        let prepared = rasterizer.prepare(&deck, &raster_dir).await?;
        let state = SlideCursorState {
            version: CURSOR_FORMAT_VERSION,
            session_id,
            deck,
            paginated_path: prepared.paginated_path,
            page_count: prepared.page_count,
            position: 0,
            raster_dir,
        };
        Ok(Self::resume(rasterizer, state))
    }

    /// Rebuild a cursor from bytes produced by [`SlideCursor::serialize`].
    pub fn restore<C: DocumentConverter, G: PageRenderer>(
        rasterizer: &DeckRasterizer<C, G>,
        bytes: &[u8],
    ) -> Result<Self, StoreError> {
        let corrupted = |reason: String| StoreError::Corrupted {
            path: "cursor.json".to_string(),
            reason,
        };
        let state: SlideCursorState =
            serde_json::from_slice(bytes).map_err(|e| corrupted(e.to_string()))?;
        if state.version != CURSOR_FORMAT_VERSION {
            return Err(corrupted(format!(
                "unsupported cursor version {} (expected {CURSOR_FORMAT_VERSION})",
                state.version
            )));
        }
        if state.position > state.page_count {
            return Err(corrupted(format!(
                "position {} beyond page count {}",
                state.position, state.page_count
            )));
        }
        Ok(Self::resume(rasterizer, state))
    }

    fn resume<C: DocumentConverter, G: PageRenderer>(
        rasterizer: &DeckRasterizer<C, G>,
        state: SlideCursorState,
    ) -> Self {
        let pages = rasterizer.pages(
            state.paginated_path.clone(),
            state.page_count,
            state.raster_dir.clone(),
            state.position,
        );
        Self {
            state,
            pages,
            poisoned: false,
        }
    }

    /// Render the next unseen page, or report exhaustion.
    ///
    /// After an error the cursor refuses to move; restore it from its last
    /// serialized form to retry the same page.
    pub async fn advance(&mut self) -> Result<CursorStep, DeckError> {
        if self.poisoned {
            return Err(DeckError::Render(
                "cursor must be restored after a failed render".to_string(),
            ));
        }
        if self.state.is_exhausted() {
            return Ok(CursorStep::Exhausted);
        }
        match self.pages.next().await {
            Some(Ok(page)) => {
                self.state.position = page.index + 1;
                Ok(CursorStep::Page(page))
            }
            Some(Err(e)) => {
                self.poisoned = true;
                Err(e)
            }
            None => {
                self.state.position = self.state.page_count;
                Ok(CursorStep::Exhausted)
            }
        }
    }

    pub fn state(&self) -> &SlideCursorState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.is_exhausted()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(&self.state)
            .map_err(|e| StoreError::InvalidInput(format!("cursor serialization: {e}")))
    }
}

impl std::fmt::Debug for SlideCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideCursor")
            .field("state", &self.state)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}
