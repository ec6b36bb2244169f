//! In-memory and temp-dir fakes shared by the unit tests of this crate.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use lectern_types::config::{DataLayout, EngineConfig};
use lectern_types::error::{CompletionError, DeckError, RepositoryError, StoreError};
use lectern_types::session::{DeckKind, DeckRef, Session, SessionKey};
use lectern_types::transcript::{Annotation, Attachment, MediaRef, Turn, TurnDraft};
use tempfile::TempDir;
use tokio::sync::{Barrier, Notify};
use uuid::Uuid;

use crate::chat::coordinator::{SessionCoordinator, Upload};
use crate::completion::{CompletionProvider, CompletionReply, CompletionRequest};
use crate::deck::{DeckRasterizer, DocumentConverter, PageRenderer, classify_deck};
use crate::repository::session::SessionRepository;
use crate::storage::chat_store::{AnnotationStore, CursorStore, TranscriptStore};
use crate::storage::file_store::FileStore;

// ----------------------------------------------------------------------
// Session repository
// ----------------------------------------------------------------------

#[derive(Clone, Default)]
pub(crate) struct MemorySessionRepository {
    rows: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl MemorySessionRepository {
    pub(crate) fn row(&self, session_id: &Uuid) -> Option<Session> {
        self.rows.lock().unwrap().get(session_id).cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl SessionRepository for MemorySessionRepository {
    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&session.id) {
            return Err(RepositoryError::Conflict(session.id.to_string()));
        }
        rows.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, session_id: &Uuid) -> Result<Option<Session>, RepositoryError> {
        Ok(self.row(session_id))
    }

    async fn update(&self, session: &Session) -> Result<(), RepositoryError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&session.id) {
            Some(row) => {
                *row = session.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn delete(&self, session_id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.rows.lock().unwrap().remove(session_id).is_some())
    }

    async fn list_by_course(&self, course_id: &Uuid) -> Result<Vec<Session>, RepositoryError> {
        let mut sessions: Vec<Session> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.course_id == *course_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }
}

// ----------------------------------------------------------------------
// Transcript / annotation / cursor stores
// ----------------------------------------------------------------------

#[derive(Clone, Default)]
pub(crate) struct MemoryChatStore {
    transcripts: Arc<Mutex<HashMap<Uuid, Vec<Turn>>>>,
    annotations: Arc<Mutex<HashMap<Uuid, BTreeMap<u32, Annotation>>>>,
    cursors: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    fail_annotation_writes: Arc<AtomicBool>,
    fail_cursor_writes: Arc<AtomicBool>,
    corrupt_annotations: Arc<AtomicBool>,
    append_pause: Arc<Mutex<Option<(Arc<Notify>, Arc<Notify>)>>>,
}

impl MemoryChatStore {
    pub(crate) fn turns(&self, session_id: &Uuid) -> Vec<Turn> {
        self.transcripts
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn annotations(&self, session_id: &Uuid) -> BTreeMap<u32, Annotation> {
        self.annotations
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn has_transcript(&self, session_id: &Uuid) -> bool {
        self.transcripts.lock().unwrap().contains_key(session_id)
    }

    pub(crate) fn has_annotations(&self, session_id: &Uuid) -> bool {
        self.annotations.lock().unwrap().contains_key(session_id)
    }

    pub(crate) fn cursor(&self, raster_dir: &Path) -> Option<Vec<u8>> {
        self.cursors.lock().unwrap().get(raster_dir).cloned()
    }

    pub(crate) fn cursor_count(&self) -> usize {
        self.cursors.lock().unwrap().len()
    }

    pub(crate) fn fail_annotation_writes(&self, fail: bool) {
        self.fail_annotation_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_cursor_writes(&self, fail: bool) {
        self.fail_cursor_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn corrupt_annotations(&self, corrupt: bool) {
        self.corrupt_annotations.store(corrupt, Ordering::SeqCst);
    }

    /// Make the next `append_many` signal `appended` once its turns are
    /// written, then wait for `resume` before returning.
    pub(crate) fn pause_after_append(&self, appended: Arc<Notify>, resume: Arc<Notify>) {
        *self.append_pause.lock().unwrap() = Some((appended, resume));
    }

    fn check_annotations_readable(&self, session_id: &Uuid) -> Result<(), StoreError> {
        if self.corrupt_annotations.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupted {
                path: format!("{}.annotations.json", SessionKey(*session_id)),
                reason: "expected value at line 1 column 1".to_string(),
            });
        }
        Ok(())
    }
}

impl TranscriptStore for MemoryChatStore {
    async fn provision_transcript(&self, session_id: &Uuid) -> Result<(), StoreError> {
        self.transcripts
            .lock()
            .unwrap()
            .entry(*session_id)
            .or_default();
        Ok(())
    }

    async fn append_many(
        &self,
        session_id: &Uuid,
        drafts: Vec<TurnDraft>,
    ) -> Result<Vec<Turn>, StoreError> {
        let appended = {
            let mut transcripts = self.transcripts.lock().unwrap();
            let log = transcripts.entry(*session_id).or_default();
            let mut appended = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let turn = Turn {
                    session_id: *session_id,
                    sequence_no: log.len() as u32,
                    role: draft.role,
                    parts: draft.parts,
                    created_at: Utc::now(),
                };
                log.push(turn.clone());
                appended.push(turn);
            }
            appended
        };
        let pause = self.append_pause.lock().unwrap().take();
        if let Some((written, resume)) = pause {
            written.notify_one();
            resume.notified().await;
        }
        Ok(appended)
    }

    async fn read_all(&self, session_id: &Uuid) -> Result<Vec<Turn>, StoreError> {
        Ok(self.turns(session_id))
    }

    async fn truncate(&self, session_id: &Uuid, len: u32) -> Result<(), StoreError> {
        if let Some(log) = self.transcripts.lock().unwrap().get_mut(session_id) {
            log.truncate(len as usize);
        }
        Ok(())
    }

    async fn remove_transcript(&self, session_id: &Uuid) -> Result<(), StoreError> {
        self.transcripts.lock().unwrap().remove(session_id);
        Ok(())
    }
}

impl AnnotationStore for MemoryChatStore {
    async fn provision_annotations(&self, session_id: &Uuid) -> Result<(), StoreError> {
        self.annotations
            .lock()
            .unwrap()
            .entry(*session_id)
            .or_default();
        Ok(())
    }

    async fn put_many(
        &self,
        session_id: &Uuid,
        annotations: Vec<Annotation>,
    ) -> Result<(), StoreError> {
        self.check_annotations_readable(session_id)?;
        if self.fail_annotation_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: "annotations".to_string(),
                reason: "disk full".to_string(),
            });
        }
        let mut all = self.annotations.lock().unwrap();
        let index = all.entry(*session_id).or_default();
        for annotation in annotations {
            match index.get_mut(&annotation.sequence_no) {
                Some(existing) => existing.merge(annotation),
                None => {
                    index.insert(annotation.sequence_no, annotation);
                }
            }
        }
        Ok(())
    }

    async fn get_all(&self, session_id: &Uuid) -> Result<BTreeMap<u32, Annotation>, StoreError> {
        self.check_annotations_readable(session_id)?;
        Ok(self.annotations(session_id))
    }

    async fn replace_all(
        &self,
        session_id: &Uuid,
        annotations: BTreeMap<u32, Annotation>,
    ) -> Result<(), StoreError> {
        self.annotations
            .lock()
            .unwrap()
            .insert(*session_id, annotations);
        Ok(())
    }

    async fn remove_annotations(&self, session_id: &Uuid) -> Result<(), StoreError> {
        self.annotations.lock().unwrap().remove(session_id);
        Ok(())
    }
}

impl CursorStore for MemoryChatStore {
    async fn load_cursor(&self, raster_dir: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.cursor(raster_dir))
    }

    async fn save_cursor(&self, raster_dir: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        if self.fail_cursor_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: raster_dir.join("cursor.json").display().to_string(),
                reason: "read-only file system".to_string(),
            });
        }
        self.cursors
            .lock()
            .unwrap()
            .insert(raster_dir.to_path_buf(), bytes.to_vec());
        Ok(())
    }
}

// ----------------------------------------------------------------------
// File store
// ----------------------------------------------------------------------

/// Writes decks and attachments under a temp data directory.
#[derive(Clone)]
pub(crate) struct DiskFileStore {
    layout: DataLayout,
}

impl DiskFileStore {
    pub(crate) fn new(layout: DataLayout) -> Self {
        Self { layout }
    }
}

async fn remove_tree(dir: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io {
            path: dir.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

fn io_err(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl FileStore for DiskFileStore {
    async fn save_deck(
        &self,
        raster_dir: &Path,
        original_name: &str,
        kind: DeckKind,
        data: &[u8],
    ) -> Result<DeckRef, StoreError> {
        tokio::fs::create_dir_all(raster_dir)
            .await
            .map_err(|e| io_err(raster_dir, e))?;
        let stored_path = raster_dir.join(original_name);
        tokio::fs::write(&stored_path, data)
            .await
            .map_err(|e| io_err(&stored_path, e))?;
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
        let dir = self.layout.session_files_dir(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;
        let path = dir.join(format!("{}_{original_name}", Uuid::now_v7().simple()));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| io_err(&path, e))?;
        Ok(Attachment {
            media_ref: self.layout.media_ref(&path),
            mime_type: "image/png".to_string(),
            bytes: data.to_vec(),
        })
    }

    async fn remove_media(&self, media_ref: &MediaRef) -> Result<(), StoreError> {
        let path = self.layout.resolve(media_ref);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn remove_dir(&self, dir: &Path) -> Result<(), StoreError> {
        remove_tree(dir).await
    }

    async fn remove_session_files(&self, key: SessionKey) -> Result<(), StoreError> {
        remove_tree(&self.layout.deck_root(key)).await?;
        remove_tree(&self.layout.session_files_dir(key)).await
    }
}

// ----------------------------------------------------------------------
// Deck conversion and rendering
// ----------------------------------------------------------------------

/// Fake deck bytes understood by [`FakeRenderer`].
pub(crate) fn fake_deck_bytes(pages: u32) -> Vec<u8> {
    format!("pages={pages}").into_bytes()
}

pub(crate) fn fake_deck_upload(file_name: &str, pages: u32) -> Upload {
    Upload::new(file_name, fake_deck_bytes(pages))
}

/// Write a fake deck into `dir` and return a reference to it.
pub(crate) async fn write_fake_deck(dir: &Path, file_name: &str, pages: u32) -> DeckRef {
    let stored_path = dir.join(file_name);
    tokio::fs::write(&stored_path, fake_deck_bytes(pages))
        .await
        .unwrap();
    DeckRef {
        original_name: file_name.to_string(),
        stored_path,
        kind: classify_deck(file_name).unwrap(),
    }
}

/// Copies the deck to `<stem>.pdf`, or refuses like a host without a
/// converter.
#[derive(Clone)]
pub(crate) struct FakeConverter {
    supported: bool,
}

impl FakeConverter {
    pub(crate) fn supported() -> Self {
        Self { supported: true }
    }

    pub(crate) fn unsupported() -> Self {
        Self { supported: false }
    }
}

impl DocumentConverter for FakeConverter {
    async fn to_paginated(&self, deck: &DeckRef, out_dir: &Path) -> Result<PathBuf, DeckError> {
        if !self.supported {
            return Err(DeckError::UnsupportedPlatform(
                "no slide converter on this host".to_string(),
            ));
        }
        let stem = deck
            .stored_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("deck");
        let output = out_dir.join(format!("{stem}.pdf"));
        tokio::fs::copy(&deck.stored_path, &output)
            .await
            .map_err(|e| DeckError::Conversion(e.to_string()))?;
        Ok(output)
    }
}

/// Reads `pages=N` decks and writes small but real PNG pages whose width
/// encodes the page index.
#[derive(Clone, Default)]
pub(crate) struct FakeRenderer {
    renders: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    garbage: Arc<AtomicBool>,
}

impl FakeRenderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn render_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.renders)
    }

    pub(crate) fn fail_renders(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Write bytes that are not an image in place of each page.
    pub(crate) fn write_garbage(&self, garbage: bool) {
        self.garbage.store(garbage, Ordering::SeqCst);
    }
}

impl PageRenderer for FakeRenderer {
    async fn page_count(&self, document: &Path) -> Result<u32, DeckError> {
        let content = tokio::fs::read_to_string(document)
            .await
            .map_err(|e| DeckError::Io(e.to_string()))?;
        content
            .trim()
            .strip_prefix("pages=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| DeckError::Conversion(format!("not a paginated document: {content}")))
    }

    async fn render_page(&self, _document: &Path, index: u32, output: &Path) -> Result<Vec<u8>, DeckError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeckError::Render("renderer crashed".to_string()));
        }
        let mut png = Vec::new();
        if self.garbage.load(Ordering::SeqCst) {
            png.extend_from_slice(b"not a png");
        } else {
            let page = image::RgbImage::from_pixel(8 + index, 6, image::Rgb([255, 255, 255]));
            image::DynamicImage::ImageRgb8(page)
                .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .map_err(|e| DeckError::Render(e.to_string()))?;
        }
        tokio::fs::write(output, &png)
            .await
            .map_err(|e| DeckError::Io(e.to_string()))?;
        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(png)
    }
}

// ----------------------------------------------------------------------
// Completion
// ----------------------------------------------------------------------

/// Replies `reply #n` to the n-th call (1-based), optionally after a delay
/// or a barrier.
#[derive(Clone, Default)]
pub(crate) struct ScriptedCompletion {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
    prompts: Arc<Mutex<Vec<(usize, String, bool)>>>,
}

impl ScriptedCompletion {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(history length, prompt, had attachment)` of every call.
    pub(crate) fn prompts(&self) -> Vec<(usize, String, bool)> {
        self.prompts.lock().unwrap().clone()
    }
}

impl CompletionProvider for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<CompletionReply, CompletionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push((
            request.history.len(),
            request.prompt.to_string(),
            request.attachment.is_some(),
        ));
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CompletionError::Unavailable("service overloaded".to_string()));
        }
        Ok(CompletionReply {
            text: format!("reply #{n}"),
        })
    }
}

// ----------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------

pub(crate) type TestCoordinator = SessionCoordinator<
    MemorySessionRepository,
    MemoryChatStore,
    DiskFileStore,
    ScriptedCompletion,
    FakeConverter,
    FakeRenderer,
>;

pub(crate) struct Harness {
    pub dir: TempDir,
    pub layout: DataLayout,
    pub coordinator: TestCoordinator,
    pub sessions: MemorySessionRepository,
    pub stores: MemoryChatStore,
    pub completion: ScriptedCompletion,
    pub renderer: FakeRenderer,
}

pub(crate) fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.lock_timeout_secs = 5;
    config.completion.timeout_secs = 1;
    config.completion.explain_slide_prompt = "Explain this slide".to_string();
    config
}

pub(crate) fn harness() -> Harness {
    harness_with(ScriptedCompletion::new(), FakeConverter::supported())
}

pub(crate) fn harness_with(completion: ScriptedCompletion, converter: FakeConverter) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let layout = DataLayout::new(dir.path());
    let sessions = MemorySessionRepository::default();
    let stores = MemoryChatStore::default();
    let renderer = FakeRenderer::new();

    let coordinator = SessionCoordinator::new(
        sessions.clone(),
        stores.clone(),
        DiskFileStore::new(layout.clone()),
        completion.clone(),
        DeckRasterizer::new(converter, renderer.clone(), layout.clone()),
        layout.clone(),
        Arc::new(test_config()),
    );

    Harness {
        dir,
        layout,
        coordinator,
        sessions,
        stores,
        completion,
        renderer,
    }
}
