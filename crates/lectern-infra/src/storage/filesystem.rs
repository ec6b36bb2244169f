//! Local filesystem file store implementation.
//!
//! Implements the `FileStore` trait from `lectern-core`. Decks are stored as
//! `deck.<ext>` inside the raster directory of their generation; attachments
//! are scaled down and re-encoded as PNG under the session's files directory.
//!
//! ```text
//! {data_dir}/decks/session_<id>/<generation>/deck.pptx
//! {data_dir}/files/session_<id>/<uuid>-diagram.png
//! ```

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use lectern_core::storage::file_store::FileStore;
use lectern_types::config::{DataLayout, FilesSection};
use lectern_types::error::StoreError;
use lectern_types::session::{DeckKind, DeckRef, SessionKey, split_extension};
use lectern_types::transcript::{Attachment, MediaRef};
use uuid::Uuid;

use super::{detect_mime, io_err, remove_file_if_exists, write_atomic};

/// Extensions accepted as chat attachments.
const ATTACHMENT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Local filesystem-backed file store.
pub struct LocalFileStore {
    layout: DataLayout,
    max_upload_bytes: u64,
    thumbnail_edge: u32,
}

impl LocalFileStore {
    pub fn new(layout: DataLayout, files: &FilesSection) -> Self {
        Self {
            layout,
            max_upload_bytes: files.max_upload_bytes,
            thumbnail_edge: files.thumbnail_edge,
        }
    }

    fn check_size(&self, data: &[u8]) -> Result<(), StoreError> {
        if data.len() as u64 > self.max_upload_bytes {
            return Err(StoreError::InvalidInput(format!(
                "File exceeds maximum size of {} bytes (got {} bytes)",
                self.max_upload_bytes,
                data.len()
            )));
        }
        Ok(())
    }

    /// Reject paths that would escape the data directory.
    fn guard(&self, path: &Path) -> Result<(), StoreError> {
        let escapes = path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
        if escapes || !path.starts_with(self.layout.root()) {
            return Err(StoreError::InvalidInput(format!(
                "path {} is outside the data directory",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Validate an uploaded file name and split off its lowercase extension.
fn validate_name(file_name: &str) -> Result<(&str, String), StoreError> {
    if file_name.contains("..") || file_name.contains('/') || file_name.contains('\\') {
        return Err(StoreError::InvalidInput(
            "Filename must not contain path separators or '..'".to_string(),
        ));
    }
    split_extension(file_name)
        .ok_or_else(|| StoreError::InvalidInput(format!("Invalid file name: '{file_name}'")))
}

/// Scale an image down to fit inside an `edge` x `edge` square and encode it
/// as PNG. Smaller images are re-encoded at their original size.
fn thumbnail_png(data: &[u8], edge: u32) -> Result<Vec<u8>, StoreError> {
    let img = image::load_from_memory(data)
        .map_err(|e| StoreError::InvalidInput(format!("Failed to decode image: {e}")))?;

    let longest = img.width().max(img.height());
    let img = if longest > edge {
        let scale = edge as f64 / longest as f64;
        let w = ((img.width() as f64 * scale).round() as u32).max(1);
        let h = ((img.height() as f64 * scale).round() as u32).max(1);
        DynamicImage::ImageRgba8(image::imageops::resize(
            &img,
            w,
            h,
            image::imageops::FilterType::Lanczos3,
        ))
    } else {
        img
    };

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| StoreError::InvalidInput(format!("Failed to encode image: {e}")))?;
    Ok(buffer.into_inner())
}

async fn remove_tree(dir: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(dir, e)),
    }
}

impl FileStore for LocalFileStore {
    async fn save_deck(
        &self,
        raster_dir: &Path,
        original_name: &str,
        kind: DeckKind,
        data: &[u8],
    ) -> Result<DeckRef, StoreError> {
        self.check_size(data)?;
        self.guard(raster_dir)?;
        let (_, ext) = validate_name(original_name)?;

        tokio::fs::create_dir_all(raster_dir)
            .await
            .map_err(|e| io_err(raster_dir, e))?;
        let stored_path = raster_dir.join(format!("deck.{ext}"));
        write_atomic(&stored_path, data).await?;

        tracing::debug!(
            path = %stored_path.display(),
            bytes = data.len(),
            mime = %detect_mime(original_name),
            "stored deck"
        );

        Ok(DeckRef {
            original_name: original_name.to_string(),
            stored_path,
            kind,
        })
    }

    async fn save_attachment(
        &self,
        key: SessionKey,
        original_name: &str,
        data: &[u8],
    ) -> Result<Attachment, StoreError> {
        self.check_size(data)?;
        let (stem, ext) = validate_name(original_name)?;
        if !ATTACHMENT_EXTENSIONS.contains(&ext.as_str()) {
            return Err(StoreError::InvalidInput(format!(
                "Invalid file extension: {ext}"
            )));
        }

        let edge = self.thumbnail_edge;
        let owned = data.to_vec();
        let png = tokio::task::spawn_blocking(move || thumbnail_png(&owned, edge))
            .await
            .map_err(|e| StoreError::InvalidInput(format!("image task failed: {e}")))??;

        let dir = self.layout.session_files_dir(key);
        let path: PathBuf = dir.join(format!("{}-{stem}.png", Uuid::now_v7().simple()));
        write_atomic(&path, &png).await?;

        Ok(Attachment {
            media_ref: self.layout.media_ref(&path),
            mime_type: "image/png".to_string(),
            bytes: png,
        })
    }

    async fn remove_media(&self, media_ref: &MediaRef) -> Result<(), StoreError> {
        let path = self.layout.resolve(media_ref);
        self.guard(&path)?;
        remove_file_if_exists(&path).await
    }

    async fn remove_dir(&self, dir: &Path) -> Result<(), StoreError> {
        self.guard(dir)?;
        remove_tree(dir).await
    }

    async fn remove_session_files(&self, key: SessionKey) -> Result<(), StoreError> {
        remove_tree(&self.layout.deck_root(key)).await?;
        remove_tree(&self.layout.session_files_dir(key)).await
    }
}
