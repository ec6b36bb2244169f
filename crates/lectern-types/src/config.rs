//! Engine configuration types for Lectern.
//!
//! `EngineConfig` represents the top-level `config.toml`. It is built once at
//! process start and passed by reference into the coordinator and stores.
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::path::{Path, PathBuf};

use crate::session::SessionKey;
use crate::transcript::MediaRef;

/// Top-level configuration for the chat session engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub deck: DeckSection,
    #[serde(default)]
    pub completion: CompletionSection,
    #[serde(default)]
    pub files: FilesSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// Coordinator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// How long a request waits for the per-session lock before giving up.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_lock_timeout_secs() -> u64 {
    10
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

/// External tools used to flatten and rasterize decks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSection {
    #[serde(default = "default_soffice_path")]
    pub soffice_path: String,
    #[serde(default = "default_pdftoppm_path")]
    pub pdftoppm_path: String,
    #[serde(default = "default_pdfinfo_path")]
    pub pdfinfo_path: String,
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    #[serde(default = "default_conversion_timeout_secs")]
    pub conversion_timeout_secs: u64,
}

fn default_soffice_path() -> String {
    "soffice".to_string()
}

fn default_pdftoppm_path() -> String {
    "pdftoppm".to_string()
}

fn default_pdfinfo_path() -> String {
    "pdfinfo".to_string()
}

fn default_render_dpi() -> u32 {
    110
}

fn default_conversion_timeout_secs() -> u64 {
    120
}

impl Default for DeckSection {
    fn default() -> Self {
        Self {
            soffice_path: default_soffice_path(),
            pdftoppm_path: default_pdftoppm_path(),
            pdfinfo_path: default_pdfinfo_path(),
            render_dpi: default_render_dpi(),
            conversion_timeout_secs: default_conversion_timeout_secs(),
        }
    }
}

/// Completion-service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on a single completion call. Elapsing releases the
    /// session lock and surfaces a retriable error.
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Hidden prompt sent with every rasterized slide.
    #[serde(default = "default_explain_slide_prompt")]
    pub explain_slide_prompt: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_completion_timeout_secs() -> u64 {
    120
}

fn default_system_prompt() -> String {
    "You are a patient teaching assistant. Students share lecture slides and \
     documents with you and ask questions about them. Explain clearly, use \
     examples, and stay grounded in the material they provide."
        .to_string()
}

fn default_explain_slide_prompt() -> String {
    "Explain the content of this slide in detail. Cover every concept it \
     introduces and how it connects to what we discussed before."
        .to_string()
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout_secs(),
            system_prompt: default_system_prompt(),
            explain_slide_prompt: default_explain_slide_prompt(),
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesSection {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Image attachments are scaled down to fit in a square of this edge.
    #[serde(default = "default_thumbnail_edge")]
    pub thumbnail_edge: u32,
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_thumbnail_edge() -> u32 {
    256
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            thumbnail_edge: default_thumbnail_edge(),
        }
    }
}

/// REST server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    /// API key required on every `/api/v1` request. `LECTERN_API_KEY`
    /// overrides it.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Directory layout under the data directory.
///
/// ```text
/// {data_dir}/
///   lectern.db
///   config.toml
///   chats/session_<id>.transcript.json
///   chats/session_<id>.annotations.json
///   decks/session_<id>/<generation>/{deck, page-*.png, cursor.json}
///   files/session_<id>/<uploads>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("lectern.db")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn chats_dir(&self) -> PathBuf {
        self.root.join("chats")
    }

    pub fn decks_dir(&self) -> PathBuf {
        self.root.join("decks")
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    pub fn transcript_path(&self, key: SessionKey) -> PathBuf {
        self.chats_dir().join(format!("{key}.transcript.json"))
    }

    pub fn annotations_path(&self, key: SessionKey) -> PathBuf {
        self.chats_dir().join(format!("{key}.annotations.json"))
    }

    /// Parent of every deck generation a session has had.
    pub fn deck_root(&self, key: SessionKey) -> PathBuf {
        self.decks_dir().join(key.to_string())
    }

    /// Rasterized-page directory for one uploaded deck. Replacing a deck
    /// allocates a new generation so the old one can be dropped wholesale.
    pub fn raster_dir(&self, key: SessionKey, generation: Uuid) -> PathBuf {
        self.deck_root(key).join(generation.simple().to_string())
    }

    /// Upload directory for a session's attachments.
    pub fn session_files_dir(&self, key: SessionKey) -> PathBuf {
        self.files_dir().join(key.to_string())
    }

    /// The cursor artifact sits inside the raster directory it describes.
    pub fn cursor_path(raster_dir: &Path) -> PathBuf {
        raster_dir.join("cursor.json")
    }

    /// Build a media reference for a path, relative to the data directory
    /// when the path lives under it.
    pub fn media_ref(&self, path: &Path) -> MediaRef {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        MediaRef(rel.to_string_lossy().replace('\\', "/"))
    }

    /// Resolve a media reference back to a filesystem path.
    pub fn resolve(&self, media_ref: &MediaRef) -> PathBuf {
        let path = Path::new(media_ref.as_str());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.engine.lock_timeout_secs, 10);
        assert_eq!(config.deck.soffice_path, "soffice");
        assert_eq!(config.deck.render_dpi, 110);
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(config.files.max_upload_bytes, 52_428_800);
        assert_eq!(config.files.thumbnail_edge, 256);
        assert!(config.server.api_key.is_none());
    }

    #[test]
    fn test_engine_config_deserialize_empty() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.completion.timeout_secs, 120);
        assert_eq!(config.deck.pdftoppm_path, "pdftoppm");
    }

    #[test]
    fn test_engine_config_deserialize_partial_sections() {
        let toml_str = r#"
[engine]
lock_timeout_secs = 3

[deck]
soffice_path = "/usr/bin/soffice"

[completion]
model = "claude-haiku"
timeout_secs = 30

[server]
api_key = "secret"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.lock_timeout_secs, 3);
        assert_eq!(config.deck.soffice_path, "/usr/bin/soffice");
        assert_eq!(config.deck.pdfinfo_path, "pdfinfo");
        assert_eq!(config.completion.model, "claude-haiku");
        assert_eq!(config.completion.timeout_secs, 30);
        assert_eq!(config.completion.max_tokens, 2048);
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_layout_paths_use_session_key() {
        let layout = DataLayout::new("/srv/lectern");
        let key = SessionKey(Uuid::now_v7());
        let transcript = layout.transcript_path(key);
        let name = transcript.file_name().unwrap().to_str().unwrap();
        assert_eq!(SessionKey::parse(name), Some(key));
        assert!(transcript.starts_with("/srv/lectern/chats"));

        let raster = layout.raster_dir(key, Uuid::now_v7());
        assert!(raster.starts_with(layout.deck_root(key)));
        assert_eq!(DataLayout::cursor_path(&raster), raster.join("cursor.json"));
    }

    #[test]
    fn test_media_ref_roundtrip() {
        let layout = DataLayout::new("/srv/lectern");
        let page = Path::new("/srv/lectern/decks/session_x/page-1.png");
        let media = layout.media_ref(page);
        assert_eq!(media.as_str(), "decks/session_x/page-1.png");
        assert_eq!(layout.resolve(&media), page);

        let outside = Path::new("/tmp/elsewhere.png");
        let media = layout.media_ref(outside);
        assert_eq!(layout.resolve(&media), outside);
    }
}
