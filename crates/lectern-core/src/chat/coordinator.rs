//! SessionCoordinator: orchestrates session lifecycle across the stores.
//!
//! The coordinator owns no per-session state between calls. Every operation
//! loads what it needs from the stores, and every mutating operation runs
//! under the session's write lock from its first read to its last write.
//!
//! Appends and slide advances commit in a fixed order (turns, annotations,
//! cursor). A failure at any step compensates the earlier steps so the
//! transcript and annotation index never drift apart. The commit runs on a
//! task of its own that owns the write lock, so it finishes even when the
//! caller stops waiting for it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lectern_types::config::{DataLayout, EngineConfig};
use lectern_types::deck::RenderedPage;
use lectern_types::error::ChatError;
use lectern_types::session::{
    DeckKind, DeckRef, MAX_TITLE_CHARS, Session, SessionKey, SessionState,
};
use lectern_types::transcript::{
    Annotation, Attachment, MediaRef, TranscriptEntry, Turn, TurnDraft, TurnPart,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::lock::{SessionLocks, SessionWriteGuard};
use super::view::build_transcript_view;
use crate::completion::{CompletionProvider, CompletionReply, CompletionRequest};
use crate::deck::{
    CursorStep, DeckRasterizer, DocumentConverter, PageRenderer, SlideCursor, classify_deck,
};
use crate::repository::session::SessionRepository;
use crate::storage::chat_store::{AnnotationStore, CursorStore, TranscriptStore};
use crate::storage::file_store::FileStore;

/// Raw bytes uploaded by a caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// The user turn and model turn committed by one `append_user_turn` call.
#[derive(Debug, Clone, Serialize)]
pub struct TurnExchange {
    pub user: Turn,
    pub model: Turn,
}

/// A page explained by `advance_slide`.
#[derive(Debug, Clone, Serialize)]
pub struct SlidePage {
    /// 0-based page index.
    pub index: u32,
    pub page_count: u32,
    pub page_ref: MediaRef,
    /// The caller-visible model turn explaining the page.
    pub explanation: TranscriptEntry,
}

impl SlidePage {
    /// 1-based page number for display.
    pub fn number(&self) -> u32 {
        self.index + 1
    }
}

/// Result of `advance_slide`.
#[derive(Debug, Clone)]
pub enum SlideAdvance {
    Page(SlidePage),
    /// Every page has been shown; slides mode is now off.
    Exhausted { session: Session },
}

/// A session together with its caller-visible history.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub session: Session,
    pub history: Vec<TranscriptEntry>,
}

pub struct SessionCoordinator<R, S, F, P, C, G> {
    sessions: R,
    stores: Arc<S>,
    files: F,
    completion: P,
    rasterizer: DeckRasterizer<C, G>,
    locks: SessionLocks,
    layout: DataLayout,
    config: Arc<EngineConfig>,
}

impl<R, S, F, P, C, G> SessionCoordinator<R, S, F, P, C, G>
where
    R: SessionRepository,
    S: TranscriptStore + AnnotationStore + CursorStore + 'static,
    F: FileStore,
    P: CompletionProvider,
    C: DocumentConverter,
    G: PageRenderer,
{
    pub fn new(
        sessions: R,
        stores: S,
        files: F,
        completion: P,
        rasterizer: DeckRasterizer<C, G>,
        layout: DataLayout,
        config: Arc<EngineConfig>,
    ) -> Self {
        let locks = SessionLocks::new(Duration::from_secs(config.engine.lock_timeout_secs));
        Self {
            sessions,
            stores: Arc::new(stores),
            files,
            completion,
            rasterizer,
            locks,
            layout,
            config,
        }
    }

    /// Swap the lock table, e.g. to show what happens without exclusion.
    #[cfg(test)]
    pub(crate) fn set_locks(&mut self, locks: SessionLocks) {
        self.locks = locks;
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn completion_provider(&self) -> &str {
        self.completion.name()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a session, optionally walking a deck.
    ///
    /// Any failure after the row is written rolls the whole session back:
    /// row, transcript, annotations, deck and raster directory.
    pub async fn create_session(
        &self,
        course_id: Uuid,
        title: &str,
        deck: Option<Upload>,
    ) -> Result<Session, ChatError> {
        let title = validate_title(title)?;
        let deck = match deck {
            Some(upload) => {
                let kind = classify_deck(&upload.file_name)?;
                Some((upload, kind))
            }
            None => None,
        };

        let mut session = Session::new(course_id, title);
        let guard = self.locks.write(session.id).await?;
        self.sessions.create(&session).await?;
        info!(session_id = %session.id, course_id = %course_id, "session created");

        match self.provision(&mut session, deck).await {
            Ok(()) => {
                info!(
                    session_id = %session.id,
                    slides_mode = session.slides_mode,
                    "session active"
                );
                Ok(session)
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "session setup failed, rolling back");
                self.rollback_creation(&session).await;
                drop(guard);
                Err(e)
            }
        }
    }

    async fn provision(
        &self,
        session: &mut Session,
        deck: Option<(Upload, DeckKind)>,
    ) -> Result<(), ChatError> {
        self.stores.provision_transcript(&session.id).await?;
        self.stores.provision_annotations(&session.id).await?;

        if let Some((upload, kind)) = deck {
            let raster_dir = self.layout.raster_dir(session.key(), Uuid::now_v7());
            let cursor = self.open_cursor(session.id, &raster_dir, upload, kind).await?;
            session.deck = Some(cursor.state().deck.clone());
            session.slides_mode = !cursor.is_exhausted();
        }
        transition(session, SessionState::Provisioned)?;
        self.sessions.update(session).await?;

        transition(session, SessionState::Active)?;
        self.sessions.update(session).await?;
        Ok(())
    }

    /// Store a deck in `raster_dir`, prepare it, and persist a cursor
    /// positioned before its first page.
    async fn open_cursor(
        &self,
        session_id: Uuid,
        raster_dir: &Path,
        upload: Upload,
        kind: DeckKind,
    ) -> Result<SlideCursor, ChatError> {
        let deck = self
            .files
            .save_deck(raster_dir, &upload.file_name, kind, &upload.bytes)
            .await?;
        let cursor =
            SlideCursor::open(&self.rasterizer, session_id, deck, raster_dir.to_path_buf()).await?;
        let bytes = cursor.serialize()?;
        self.stores.save_cursor(raster_dir, &bytes).await?;
        debug!(
            session_id = %session_id,
            page_count = cursor.state().page_count,
            "slide cursor ready"
        );
        Ok(cursor)
    }

    async fn rollback_creation(&self, session: &Session) {
        if let Err(e) = self.stores.remove_transcript(&session.id).await {
            error!(session_id = %session.id, error = %e, "rollback: failed to remove transcript");
        }
        if let Err(e) = self.stores.remove_annotations(&session.id).await {
            error!(session_id = %session.id, error = %e, "rollback: failed to remove annotations");
        }
        if let Err(e) = self.files.remove_session_files(session.key()).await {
            error!(session_id = %session.id, error = %e, "rollback: failed to remove session files");
        }
        if let Err(e) = self.sessions.delete(&session.id).await {
            error!(session_id = %session.id, error = %e, "rollback: failed to delete session row");
        }
    }

    /// Delete a session and every artifact it owns. Deleting a session that
    /// does not exist (or no longer exists) succeeds.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        let guard = self.locks.write(session_id).await?;

        self.stores.remove_transcript(&session_id).await?;
        self.stores.remove_annotations(&session_id).await?;
        self.files.remove_session_files(SessionKey(session_id)).await?;
        let removed = self.sessions.delete(&session_id).await?;

        drop(guard);
        info!(session_id = %session_id, removed, "session deleted");
        Ok(())
    }

    /// Replace the session's deck and restart the walk from its first page.
    ///
    /// The new deck gets a fresh raster directory; the old one is only
    /// removed once the session row points at the new deck.
    pub async fn replace_deck(&self, session_id: Uuid, upload: Upload) -> Result<Session, ChatError> {
        let kind = classify_deck(&upload.file_name)?;
        let _guard = self.locks.write(session_id).await?;
        let mut session = self.require_active(session_id).await?;

        let previous_dir = session.deck.as_ref().and_then(raster_dir_of);
        let raster_dir = self.layout.raster_dir(session.key(), Uuid::now_v7());

        let cursor = match self.open_cursor(session_id, &raster_dir, upload, kind).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.discard_dir(&raster_dir).await;
                return Err(e);
            }
        };

        session.deck = Some(cursor.state().deck.clone());
        session.slides_mode = !cursor.is_exhausted();
        session.updated_at = Utc::now();
        if let Err(e) = self.sessions.update(&session).await {
            self.discard_dir(&raster_dir).await;
            return Err(e.into());
        }

        if let Some(previous) = previous_dir {
            self.discard_dir(&previous).await;
        }
        info!(
            session_id = %session_id,
            page_count = cursor.state().page_count,
            "deck replaced"
        );
        Ok(session)
    }

    pub async fn rename_session(&self, session_id: Uuid, title: &str) -> Result<Session, ChatError> {
        let title = validate_title(title)?;
        let _guard = self.locks.write(session_id).await?;
        let mut session = self.require_active(session_id).await?;

        session.title = title;
        session.updated_at = Utc::now();
        self.sessions.update(&session).await?;
        debug!(session_id = %session_id, "session renamed");
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Conversation
    // ------------------------------------------------------------------

    /// Send a user message (with an optional attachment) and record the
    /// model's reply.
    ///
    /// If the completion service fails, nothing is appended and any stored
    /// attachment is discarded.
    pub async fn append_user_turn(
        &self,
        session_id: Uuid,
        text: &str,
        attachment: Option<Upload>,
    ) -> Result<TurnExchange, ChatError> {
        if text.trim().is_empty() && attachment.is_none() {
            return Err(ChatError::InvalidInput("message text is empty".to_string()));
        }
        let guard = self.locks.write(session_id).await?;
        let session = self.require_active(session_id).await?;

        let attachment = match attachment {
            Some(upload) => Some(
                self.files
                    .save_attachment(session.key(), &upload.file_name, &upload.bytes)
                    .await?,
            ),
            None => None,
        };

        let result = self
            .exchange(guard, session_id, text, attachment.as_ref())
            .await;
        if result.is_err() {
            if let Some(attachment) = &attachment {
                self.discard_media(&attachment.media_ref).await;
            }
        }
        result
    }

    async fn exchange(
        &self,
        guard: SessionWriteGuard,
        session_id: Uuid,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> Result<TurnExchange, ChatError> {
        let history = self.stores.read_all(&session_id).await?;
        let base = history.len() as u32;
        let reply = self.complete(session_id, &history, text, attachment).await?;

        let user_part = match attachment {
            Some(a) => TurnPart::with_media(text, a.media_ref.clone()),
            None => TurnPart::text(text),
        };
        let drafts = vec![
            TurnDraft::user(vec![user_part]),
            TurnDraft::model(vec![TurnPart::text(reply.text)]),
        ];
        let annotations = attachment
            .map(|a| Annotation::media(session_id, base, a.media_ref.clone()))
            .into_iter()
            .collect();

        let mut turns = self
            .commit(guard, session_id, base, drafts, annotations, None)
            .await?;
        match (turns.pop(), turns.pop()) {
            (Some(model), Some(user)) => Ok(TurnExchange { user, model }),
            _ => Err(ChatError::Storage(
                "transcript store returned fewer turns than appended".to_string(),
            )),
        }
    }

    /// Render and explain the next unseen slide.
    ///
    /// Exhaustion is reported as [`SlideAdvance::Exhausted`] and switches
    /// slides mode off; it is not an error.
    pub async fn advance_slide(&self, session_id: Uuid) -> Result<SlideAdvance, ChatError> {
        let guard = self.locks.write(session_id).await?;
        let mut session = self.require_active(session_id).await?;

        let raster_dir = session
            .deck
            .as_ref()
            .and_then(raster_dir_of)
            .ok_or(ChatError::NoSlidesUploaded)?;
        let bytes = self
            .stores
            .load_cursor(&raster_dir)
            .await?
            .ok_or(ChatError::NoSlidesUploaded)?;
        let mut cursor = SlideCursor::restore(&self.rasterizer, &bytes)?;

        let page = match cursor.advance().await? {
            CursorStep::Page(page) => page,
            CursorStep::Exhausted => {
                if session.slides_mode {
                    session.slides_mode = false;
                    session.updated_at = Utc::now();
                    self.sessions.update(&session).await?;
                }
                info!(
                    session_id = %session_id,
                    position = cursor.state().position,
                    "deck exhausted"
                );
                return Ok(SlideAdvance::Exhausted { session });
            }
        };

        // Only owned values cross the awaits below; the cursor's page
        // stream is not `Sync`.
        let advanced = AdvancedCursor {
            bytes: cursor.serialize()?,
            position: cursor.state().position,
            page_count: cursor.state().page_count,
        };
        drop(cursor);

        match self
            .explain_page(guard, session_id, raster_dir, advanced, &page)
            .await
        {
            Ok(explained) => Ok(SlideAdvance::Page(explained)),
            Err(e) => {
                self.discard_media(&page.page_ref).await;
                Err(e)
            }
        }
    }

    async fn explain_page(
        &self,
        guard: SessionWriteGuard,
        session_id: Uuid,
        raster_dir: PathBuf,
        cursor: AdvancedCursor,
        page: &RenderedPage,
    ) -> Result<SlidePage, ChatError> {
        let history = self.stores.read_all(&session_id).await?;
        let base = history.len() as u32;
        let prompt = self.config.completion.explain_slide_prompt.as_str();
        let attachment = Attachment {
            media_ref: page.page_ref.clone(),
            mime_type: "image/png".to_string(),
            bytes: page.image.png.clone(),
        };
        let reply = self
            .complete(session_id, &history, prompt, Some(&attachment))
            .await?;

        let drafts = vec![
            TurnDraft::user(vec![TurnPart::with_media(prompt, page.page_ref.clone())]),
            TurnDraft::model(vec![TurnPart::text(reply.text)]),
        ];
        let annotations = vec![
            Annotation::hidden(session_id, base),
            Annotation::media(session_id, base + 1, page.page_ref.clone()),
        ];
        let turns = self
            .commit(
                guard,
                session_id,
                base,
                drafts,
                annotations,
                Some((raster_dir, cursor.bytes)),
            )
            .await?;
        let model = turns.into_iter().last().ok_or_else(|| {
            ChatError::Storage("transcript store returned no turns".to_string())
        })?;

        info!(
            session_id = %session_id,
            position = cursor.position,
            sequence_no = model.sequence_no,
            "slide advanced"
        );
        Ok(SlidePage {
            index: page.index,
            page_count: cursor.page_count,
            page_ref: page.page_ref.clone(),
            explanation: TranscriptEntry {
                sequence_no: model.sequence_no,
                role: model.role,
                text: model.text(),
                media_ref: Some(page.page_ref.clone()),
            },
        })
    }

    async fn complete(
        &self,
        session_id: Uuid,
        history: &[Turn],
        prompt: &str,
        attachment: Option<&Attachment>,
    ) -> Result<CompletionReply, ChatError> {
        let request = CompletionRequest {
            system: &self.config.completion.system_prompt,
            history,
            prompt,
            attachment,
        };
        let limit = Duration::from_secs(self.config.completion.timeout_secs);

        match tokio::time::timeout(limit, self.completion.complete(&request)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                warn!(
                    session_id = %session_id,
                    provider = self.completion.name(),
                    error = %e,
                    "completion failed"
                );
                Err(e.into())
            }
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    provider = self.completion.name(),
                    timeout_secs = limit.as_secs(),
                    "completion timed out"
                );
                Err(ChatError::CompletionUnavailable(format!(
                    "completion timed out after {}s",
                    limit.as_secs()
                )))
            }
        }
    }

    /// Commit turns, then annotations, then (optionally) the cursor.
    ///
    /// `base` is the transcript length observed under `guard`. The writes run
    /// on a spawned task that keeps the guard until they are done or undone.
    async fn commit(
        &self,
        guard: SessionWriteGuard,
        session_id: Uuid,
        base: u32,
        drafts: Vec<TurnDraft>,
        annotations: Vec<Annotation>,
        cursor: Option<(PathBuf, Vec<u8>)>,
    ) -> Result<Vec<Turn>, ChatError> {
        let stores = Arc::clone(&self.stores);
        let task = tokio::spawn(async move {
            let result =
                commit_in_order(stores.as_ref(), session_id, base, drafts, annotations, cursor)
                    .await;
            drop(guard);
            result
        });
        task.await.map_err(|e| {
            error!(session_id = %session_id, error = %e, "commit task did not finish");
            ChatError::Storage(format!("commit task failed: {e}"))
        })?
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_session(&self, session_id: Uuid) -> Result<Session, ChatError> {
        let _guard = self.locks.read(session_id).await?;
        self.require_active(session_id).await
    }

    /// Active sessions of a course, newest first.
    pub async fn list_sessions(&self, course_id: Uuid) -> Result<Vec<Session>, ChatError> {
        let sessions = self.sessions.list_by_course(&course_id).await?;
        Ok(sessions
            .into_iter()
            .filter(|s| s.state == SessionState::Active)
            .collect())
    }

    pub async fn get_conversation(&self, session_id: Uuid) -> Result<Conversation, ChatError> {
        let _guard = self.locks.read(session_id).await?;
        let session = self.require_active(session_id).await?;
        let history = self.view(session_id).await?;
        Ok(Conversation { session, history })
    }

    /// Ordered caller-visible transcript, for downstream generators.
    pub async fn get_transcript(&self, session_id: Uuid) -> Result<Vec<TranscriptEntry>, ChatError> {
        let _guard = self.locks.read(session_id).await?;
        self.require_active(session_id).await?;
        self.view(session_id).await
    }

    async fn view(&self, session_id: Uuid) -> Result<Vec<TranscriptEntry>, ChatError> {
        let turns = self.stores.read_all(&session_id).await?;
        let annotations = self.stores.get_all(&session_id).await?;
        Ok(build_transcript_view(&turns, &annotations))
    }

    /// Sessions still being set up are invisible to callers.
    async fn require_active(&self, session_id: Uuid) -> Result<Session, ChatError> {
        match self.sessions.get(&session_id).await? {
            Some(session) if session.state == SessionState::Active => Ok(session),
            _ => Err(ChatError::NotFound),
        }
    }

    async fn discard_media(&self, media_ref: &MediaRef) {
        if let Err(e) = self.files.remove_media(media_ref).await {
            warn!(media_ref = %media_ref, error = %e, "failed to discard media");
        }
    }

    async fn discard_dir(&self, dir: &Path) {
        if let Err(e) = self.files.remove_dir(dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to discard directory");
        }
    }
}

/// What `advance_slide` keeps of the cursor after it moved.
struct AdvancedCursor {
    bytes: Vec<u8>,
    position: u32,
    page_count: u32,
}

async fn commit_in_order<S>(
    stores: &S,
    session_id: Uuid,
    base: u32,
    drafts: Vec<TurnDraft>,
    annotations: Vec<Annotation>,
    cursor: Option<(PathBuf, Vec<u8>)>,
) -> Result<Vec<Turn>, ChatError>
where
    S: TranscriptStore + AnnotationStore + CursorStore,
{
    let snapshot = if annotations.is_empty() {
        None
    } else {
        Some(stores.get_all(&session_id).await?)
    };

    let turns = stores.append_many(&session_id, drafts).await?;

    if !annotations.is_empty() {
        if let Err(e) = stores.put_many(&session_id, annotations).await {
            compensate(stores, session_id, base, None).await;
            return Err(e.into());
        }
    }

    if let Some((raster_dir, bytes)) = cursor {
        if let Err(e) = stores.save_cursor(&raster_dir, &bytes).await {
            compensate(stores, session_id, base, snapshot).await;
            return Err(e.into());
        }
    }

    debug!(
        session_id = %session_id,
        sequence_no = base,
        turns = turns.len(),
        "turns committed"
    );
    Ok(turns)
}

async fn compensate<S>(
    stores: &S,
    session_id: Uuid,
    base: u32,
    snapshot: Option<BTreeMap<u32, Annotation>>,
) where
    S: TranscriptStore + AnnotationStore,
{
    warn!(session_id = %session_id, sequence_no = base, "commit failed, compensating");
    if let Err(e) = stores.truncate(&session_id, base).await {
        error!(session_id = %session_id, error = %e, "failed to truncate transcript");
    }
    if let Some(snapshot) = snapshot {
        if let Err(e) = stores.replace_all(&session_id, snapshot).await {
            error!(session_id = %session_id, error = %e, "failed to restore annotations");
        }
    }
}

fn validate_title(title: &str) -> Result<String, ChatError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ChatError::InvalidInput("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ChatError::InvalidInput(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

fn transition(session: &mut Session, next: SessionState) -> Result<(), ChatError> {
    if !session.state.can_transition_to(next) {
        return Err(ChatError::Storage(format!(
            "illegal session transition {} -> {next}",
            session.state
        )));
    }
    session.state = next;
    session.updated_at = Utc::now();
    Ok(())
}

fn raster_dir_of(deck: &DeckRef) -> Option<PathBuf> {
    deck.stored_path.parent().map(Path::to_path_buf)
}
