//! JSON-file transcript, annotation, and cursor stores.
//!
//! One JSON array per session for the transcript and one for the annotation
//! index, both under `{data_dir}/chats/`. Every write replaces the whole file
//! atomically. A file that fails to parse is reported as corrupted and left
//! untouched so it can be inspected.
//!
//! Writers are not serialized here: the coordinator holds the session lock
//! across every read-modify-write.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use lectern_core::storage::chat_store::{AnnotationStore, CursorStore, TranscriptStore};
use lectern_types::config::DataLayout;
use lectern_types::error::StoreError;
use lectern_types::session::SessionKey;
use lectern_types::transcript::{Annotation, Turn, TurnDraft};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{read_optional, remove_file_if_exists, write_atomic};

/// JSON-file backed chat stores rooted at a data directory.
#[derive(Debug, Clone)]
pub struct JsonChatStore {
    layout: DataLayout,
}

impl JsonChatStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    async fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let Some(bytes) = read_optional(path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| corrupted(path, e.to_string()))
    }

    async fn store<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        write_atomic(path, &bytes).await
    }

    async fn load_turns(&self, session_id: &Uuid) -> Result<Vec<Turn>, StoreError> {
        let path = self.layout.transcript_path(SessionKey(*session_id));
        let turns: Vec<Turn> = self.load(&path).await?.unwrap_or_default();

        for (i, turn) in turns.iter().enumerate() {
            if turn.sequence_no as usize != i || turn.session_id != *session_id {
                return Err(corrupted(
                    &path,
                    format!("turn {i} has sequence number {}", turn.sequence_no),
                ));
            }
        }
        Ok(turns)
    }

    async fn load_annotations(
        &self,
        session_id: &Uuid,
    ) -> Result<BTreeMap<u32, Annotation>, StoreError> {
        let path = self.layout.annotations_path(SessionKey(*session_id));
        let entries: Vec<Annotation> = self.load(&path).await?.unwrap_or_default();
        Ok(entries.into_iter().map(|a| (a.sequence_no, a)).collect())
    }

    async fn store_annotations(
        &self,
        session_id: &Uuid,
        index: &BTreeMap<u32, Annotation>,
    ) -> Result<(), StoreError> {
        let path = self.layout.annotations_path(SessionKey(*session_id));
        let entries: Vec<&Annotation> = index.values().collect();
        self.store(&path, &entries).await
    }
}

fn corrupted(path: &Path, reason: String) -> StoreError {
    StoreError::Corrupted {
        path: path.display().to_string(),
        reason,
    }
}

impl TranscriptStore for JsonChatStore {
    async fn provision_transcript(&self, session_id: &Uuid) -> Result<(), StoreError> {
        let path = self.layout.transcript_path(SessionKey(*session_id));
        if read_optional(&path).await?.is_none() {
            self.store(&path, &Vec::<Turn>::new()).await?;
        }
        Ok(())
    }

    async fn append_many(
        &self,
        session_id: &Uuid,
        drafts: Vec<TurnDraft>,
    ) -> Result<Vec<Turn>, StoreError> {
        let mut turns = self.load_turns(session_id).await?;
        let base = turns.len() as u32;
        let now = Utc::now();

        let appended: Vec<Turn> = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| Turn {
                session_id: *session_id,
                sequence_no: base + i as u32,
                role: draft.role,
                parts: draft.parts,
                created_at: now,
            })
            .collect();
        turns.extend(appended.iter().cloned());

        let path = self.layout.transcript_path(SessionKey(*session_id));
        self.store(&path, &turns).await?;
        Ok(appended)
    }

    async fn read_all(&self, session_id: &Uuid) -> Result<Vec<Turn>, StoreError> {
        self.load_turns(session_id).await
    }

    async fn truncate(&self, session_id: &Uuid, len: u32) -> Result<(), StoreError> {
        let mut turns = self.load_turns(session_id).await?;
        if turns.len() <= len as usize {
            return Ok(());
        }
        turns.truncate(len as usize);
        let path = self.layout.transcript_path(SessionKey(*session_id));
        self.store(&path, &turns).await
    }

    async fn remove_transcript(&self, session_id: &Uuid) -> Result<(), StoreError> {
        remove_file_if_exists(&self.layout.transcript_path(SessionKey(*session_id))).await
    }
}

impl AnnotationStore for JsonChatStore {
    async fn provision_annotations(&self, session_id: &Uuid) -> Result<(), StoreError> {
        let path = self.layout.annotations_path(SessionKey(*session_id));
        if read_optional(&path).await?.is_none() {
            self.store(&path, &Vec::<Annotation>::new()).await?;
        }
        Ok(())
    }

    async fn put_many(
        &self,
        session_id: &Uuid,
        annotations: Vec<Annotation>,
    ) -> Result<(), StoreError> {
        let mut index = self.load_annotations(session_id).await?;
        for annotation in annotations {
            match index.get_mut(&annotation.sequence_no) {
                Some(existing) => existing.merge(annotation),
                None => {
                    index.insert(annotation.sequence_no, annotation);
                }
            }
        }
        self.store_annotations(session_id, &index).await
    }

    async fn get_all(&self, session_id: &Uuid) -> Result<BTreeMap<u32, Annotation>, StoreError> {
        self.load_annotations(session_id).await
    }

    async fn replace_all(
        &self,
        session_id: &Uuid,
        annotations: BTreeMap<u32, Annotation>,
    ) -> Result<(), StoreError> {
        self.store_annotations(session_id, &annotations).await
    }

    async fn remove_annotations(&self, session_id: &Uuid) -> Result<(), StoreError> {
        remove_file_if_exists(&self.layout.annotations_path(SessionKey(*session_id))).await
    }
}

impl CursorStore for JsonChatStore {
    async fn load_cursor(&self, raster_dir: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        read_optional(&DataLayout::cursor_path(raster_dir)).await
    }

    async fn save_cursor(&self, raster_dir: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        write_atomic(&DataLayout::cursor_path(raster_dir), bytes).await
    }
}
