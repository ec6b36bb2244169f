//! Loads `config.toml` from the data directory, then layers `LECTERN_*`
//! environment overrides on top.
//!
//! A missing file is normal. A broken file is logged and ignored so the
//! engine still starts with defaults.

use lectern_types::config::{DataLayout, EngineConfig};

/// Environment variables that override individual settings.
const ENV_OVERRIDES: &[&str] = &[
    "LECTERN_API_KEY",
    "LECTERN_MODEL",
    "LECTERN_COMPLETION_URL",
    "LECTERN_SOFFICE_PATH",
    "LECTERN_PDFTOPPM_PATH",
    "LECTERN_PDFINFO_PATH",
];

/// Build the engine configuration for `layout`.
pub async fn load_engine_config(layout: &DataLayout) -> EngineConfig {
    let mut config = read_config_file(layout).await;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

async fn read_config_file(layout: &DataLayout) -> EngineConfig {
    let path = layout.config_path();
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "ignoring malformed config file");
            EngineConfig::default()
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            EngineConfig::default()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "config file unreadable, using defaults");
            EngineConfig::default()
        }
    }
}

/// Apply overrides found through `lookup`. Empty values are ignored.
fn apply_env_overrides(config: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) {
    for name in ENV_OVERRIDES {
        let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        tracing::debug!(var = *name, "config override from environment");
        match *name {
            "LECTERN_API_KEY" => config.server.api_key = Some(value),
            "LECTERN_MODEL" => config.completion.model = value,
            "LECTERN_COMPLETION_URL" => config.completion.base_url = value,
            "LECTERN_SOFFICE_PATH" => config.deck.soffice_path = value,
            "LECTERN_PDFTOPPM_PATH" => config.deck.pdftoppm_path = value,
            "LECTERN_PDFINFO_PATH" => config.deck.pdfinfo_path = value,
            _ => {}
        }
    }
}
