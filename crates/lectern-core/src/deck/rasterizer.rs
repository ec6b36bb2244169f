//! Lazy deck rasterization.
//!
//! `DeckRasterizer::pages` returns a stream that renders nothing until it is
//! polled, and renders exactly one page per item.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::Stream;
use lectern_types::config::DataLayout;
use lectern_types::deck::{PageImage, PreparedDeck, RenderedPage};
use lectern_types::error::DeckError;
use lectern_types::session::{DeckKind, DeckRef};
use tracing::debug;
use uuid::Uuid;

use super::{DocumentConverter, PageRenderer};

/// Stream of rendered pages in ascending index order.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<RenderedPage, DeckError>> + Send>>;

pub struct DeckRasterizer<C, G> {
    converter: C,
    renderer: Arc<G>,
    layout: DataLayout,
}

impl<C: DocumentConverter, G: PageRenderer> DeckRasterizer<C, G> {
    pub fn new(converter: C, renderer: G, layout: DataLayout) -> Self {
        Self {
            converter,
            renderer: Arc::new(renderer),
            layout,
        }
    }

    /// Flatten the deck if needed and count its pages.
    pub async fn prepare(&self, deck: &DeckRef, raster_dir: &Path) -> Result<PreparedDeck, DeckError> {
        let paginated_path = match deck.kind {
            DeckKind::Document => deck.stored_path.clone(),
            DeckKind::Slides => self.converter.to_paginated(deck, raster_dir).await?,
        };
        let page_count = self.renderer.page_count(&paginated_path).await?;
        debug!(deck = %deck.original_name, page_count, "deck prepared");

        Ok(PreparedDeck {
            deck: deck.clone(),
            paginated_path,
            page_count,
        })
    }

    /// Lazily render pages `start..page_count` of a paginated document into
    /// `raster_dir`, each under a fresh unique name.
    pub fn pages(
        &self,
        paginated_path: PathBuf,
        page_count: u32,
        raster_dir: PathBuf,
        start: u32,
    ) -> PageStream {
        Box::pin(render_pages(
            Arc::clone(&self.renderer),
            self.layout.clone(),
            paginated_path,
            page_count,
            raster_dir,
            start,
        ))
    }
}

fn render_pages<G: PageRenderer>(
    renderer: Arc<G>,
    layout: DataLayout,
    paginated_path: PathBuf,
    page_count: u32,
    raster_dir: PathBuf,
    start: u32,
) -> impl Stream<Item = Result<RenderedPage, DeckError>> + Send {
    try_stream! {
        for index in start..page_count {
            let path = raster_dir.join(format!("page-{}.png", Uuid::now_v7().simple()));
            let png = renderer.render_page(&paginated_path, index, &path).await?;
            let dimensions = png_dimensions(&png);
            if dimensions.is_err() {
                // Nothing will reference a page that failed to decode.
                let _ = tokio::fs::remove_file(&path).await;
            }
            let (width, height) = dimensions?;
            debug!(index, width, height, "page rendered");

            yield RenderedPage {
                index,
                page_ref: layout.media_ref(&path),
                path,
                image: PageImage { png, width, height },
            };
        }
    }
}

/// Read the dimensions of an encoded page, rejecting anything that is not a
/// decodable image.
fn png_dimensions(png: &[u8]) -> Result<(u32, u32), DeckError> {
    image::ImageReader::new(Cursor::new(png))
        .with_guessed_format()
        .map_err(|e| DeckError::Render(format!("unreadable page image: {e}")))?
        .into_dimensions()
        .map_err(|e| DeckError::Render(format!("invalid page image: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConverter, FakeRenderer, write_fake_deck};
    use futures_util::StreamExt;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_document_is_rendered_directly() {
        let dir = tempfile::tempdir().unwrap();
        let deck = write_fake_deck(dir.path(), "week1.pdf", 3).await;
        let rasterizer =
            DeckRasterizer::new(FakeConverter::supported(), FakeRenderer::new(), DataLayout::new(dir.path()));

        let prepared = rasterizer.prepare(&deck, dir.path()).await.unwrap();
        assert_eq!(prepared.page_count, 3);
        assert_eq!(prepared.paginated_path, deck.stored_path);
    }

    #[tokio::test]
    async fn test_slides_without_converter_is_unsupported_platform() {
        let dir = tempfile::tempdir().unwrap();
        let deck = write_fake_deck(dir.path(), "intro.pptx", 2).await;
        let rasterizer = DeckRasterizer::new(
            FakeConverter::unsupported(),
            FakeRenderer::new(),
            DataLayout::new(dir.path()),
        );

        let err = rasterizer.prepare(&deck, dir.path()).await.unwrap_err();
        assert!(matches!(err, DeckError::UnsupportedPlatform(_)));
    }

    #[tokio::test]
    async fn test_pages_render_lazily_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let deck = write_fake_deck(dir.path(), "intro.pptx", 4).await;
        let renderer = FakeRenderer::new();
        let renders = renderer.render_count();
        let rasterizer =
            DeckRasterizer::new(FakeConverter::supported(), renderer, DataLayout::new(dir.path()));

        let prepared = rasterizer.prepare(&deck, dir.path()).await.unwrap();
        let mut pages = rasterizer.pages(
            prepared.paginated_path.clone(),
            prepared.page_count,
            dir.path().to_path_buf(),
            0,
        );
        assert_eq!(renders.load(Ordering::SeqCst), 0);

        let first = pages.next().await.unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert!(first.path.exists());
        assert!(first.page_ref.as_str().starts_with("page-"));
        assert!(first.image.width > 0 && first.image.height > 0);

        let second = pages.next().await.unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_ne!(first.page_ref, second.page_ref);
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_pages_resume_from_start_index() {
        let dir = tempfile::tempdir().unwrap();
        let deck = write_fake_deck(dir.path(), "week1.pdf", 3).await;
        let rasterizer =
            DeckRasterizer::new(FakeConverter::supported(), FakeRenderer::new(), DataLayout::new(dir.path()));

        let indices: Vec<u32> = rasterizer
            .pages(deck.stored_path.clone(), 3, dir.path().to_path_buf(), 1)
            .map(|page| page.unwrap().index)
            .collect()
            .await;
        assert_eq!(indices, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_undecodable_page_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let raster_dir = dir.path().join("raster");
        tokio::fs::create_dir_all(&raster_dir).await.unwrap();
        let deck = write_fake_deck(dir.path(), "week2.pdf", 2).await;
        let renderer = FakeRenderer::new();
        renderer.write_garbage(true);
        let rasterizer =
            DeckRasterizer::new(FakeConverter::supported(), renderer, DataLayout::new(dir.path()));

        let mut pages = rasterizer.pages(deck.stored_path.clone(), 2, raster_dir.clone(), 0);
        let err = pages.next().await.unwrap().unwrap_err();
        assert!(matches!(err, DeckError::Render(_)));
        assert_eq!(std::fs::read_dir(&raster_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_png_dimensions_rejects_garbage() {
        assert!(matches!(
            png_dimensions(b"not an image"),
            Err(DeckError::Render(_))
        ));
    }
}
