//! Application state wiring all services together.
//!
//! AppState holds the concrete coordinator used by both CLI and REST API.
//! The coordinator is generic over its stores and collaborators; AppState
//! pins it to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use lectern_core::chat::SessionCoordinator;
use lectern_core::deck::DeckRasterizer;
use lectern_infra::config::load_engine_config;
use lectern_infra::deck::{PopplerRenderer, SofficeConverter};
use lectern_infra::filesystem::{ensure_layout, resolve_data_dir};
use lectern_infra::llm::anthropic::AnthropicCompletionProvider;
use lectern_infra::sqlite::pool::DatabasePool;
use lectern_infra::sqlite::session::SqliteSessionRepository;
use lectern_infra::storage::filesystem::LocalFileStore;
use lectern_infra::storage::json_store::JsonChatStore;
use lectern_types::config::{DataLayout, EngineConfig};

use crate::http::extractors::auth::hash_api_key;

/// Concrete coordinator pinned to the infra implementations.
pub type ConcreteCoordinator = SessionCoordinator<
    SqliteSessionRepository,
    JsonChatStore,
    LocalFileStore,
    AnthropicCompletionProvider,
    SofficeConverter,
    PopplerRenderer,
>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ConcreteCoordinator>,
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
    /// Closed once the command or server is done with it.
    pub db: DatabasePool,
    /// SHA-256 of the REST API key. `None` until one is configured.
    pub api_key_hash: Option<String>,
}

impl AppState {
    /// Initialize the application state: load config, connect to the DB,
    /// wire the coordinator.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let layout = DataLayout::new(&data_dir);
        ensure_layout(&layout).await?;

        let config = Arc::new(load_engine_config(&layout).await);

        let db_pool = DatabasePool::open(&layout.database_path()).await?;

        let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
            tracing::warn!("ANTHROPIC_API_KEY is not set; completion calls will be rejected");
            String::new()
        });
        let completion =
            AnthropicCompletionProvider::new(SecretString::from(api_key), &config.completion)?;

        let rasterizer = DeckRasterizer::new(
            SofficeConverter::new(&config.deck),
            PopplerRenderer::new(&config.deck),
            layout.clone(),
        );

        let coordinator = SessionCoordinator::new(
            SqliteSessionRepository::new(db_pool.clone()),
            JsonChatStore::new(layout.clone()),
            LocalFileStore::new(layout.clone(), &config.files),
            completion,
            rasterizer,
            layout,
            config.clone(),
        );

        let api_key_hash = config
            .server
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(hash_api_key);

        Ok(Self {
            coordinator: Arc::new(coordinator),
            config,
            data_dir,
            db: db_pool,
            api_key_hash,
        })
    }
}
