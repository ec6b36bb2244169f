use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the chat session engine.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("session not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("this chat has no slides uploaded")]
    NoSlidesUploaded,

    #[error("store corrupted: {0}")]
    StoreCorrupted(String),

    #[error("completion service unavailable: {0}")]
    CompletionUnavailable(String),

    #[error("completion service rejected the request: {0}")]
    CompletionRejected(String),

    #[error("session {session_id} is busy, retry later")]
    SessionBusy { session_id: Uuid },

    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ChatError::CompletionUnavailable(_) | ChatError::SessionBusy { .. }
        )
    }
}

/// Errors from repository operations (used by trait definitions in lectern-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the file-backed transcript, annotation, and cursor stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("corrupted artifact {path}: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors from deck conversion and rasterization.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("unsupported deck extension: '{0}'")]
    UnsupportedExtension(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Errors from the completion-service collaborator.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Transient: timeouts, rate limits, overload, transport errors.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Permanent: authentication or request errors.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => ChatError::NotFound,
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupted { .. } => ChatError::StoreCorrupted(e.to_string()),
            StoreError::InvalidInput(msg) => ChatError::InvalidInput(msg),
            StoreError::Io { .. } => ChatError::Storage(e.to_string()),
        }
    }
}

impl From<DeckError> for ChatError {
    fn from(e: DeckError) -> Self {
        match e {
            DeckError::UnsupportedExtension(ext) => {
                ChatError::InvalidInput(format!("Invalid file extension: {ext}"))
            }
            DeckError::UnsupportedPlatform(msg) => ChatError::UnsupportedPlatform(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<CompletionError> for ChatError {
    fn from(e: CompletionError) -> Self {
        match e {
            CompletionError::Unavailable(msg) => ChatError::CompletionUnavailable(msg),
            CompletionError::Rejected(msg) => ChatError::CompletionRejected(msg),
        }
    }
}
