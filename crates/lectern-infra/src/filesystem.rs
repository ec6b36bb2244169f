//! Data directory resolution and layout bootstrap.

use std::path::PathBuf;

use lectern_types::config::DataLayout;

/// Resolve the Lectern data directory.
///
/// Priority:
/// 1. `LECTERN_DATA_DIR` environment variable
/// 2. `~/.lectern`
/// 3. `./.lectern` when no home directory is known
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LECTERN_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".lectern");
    }

    PathBuf::from(".lectern")
}

/// Create the data directory and its top-level subdirectories.
pub async fn ensure_layout(layout: &DataLayout) -> std::io::Result<()> {
    for dir in [
        layout.root().to_path_buf(),
        layout.chats_dir(),
        layout.decks_dir(),
        layout.files_dir(),
    ] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var("LECTERN_DATA_DIR", "/tmp/test-lectern");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-lectern"));
        unsafe {
            std::env::remove_var("LECTERN_DATA_DIR");
        }
    }

    #[tokio::test]
    async fn test_ensure_layout_creates_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path().join("data"));

        ensure_layout(&layout).await.unwrap();
        ensure_layout(&layout).await.unwrap();

        assert!(layout.chats_dir().is_dir());
        assert!(layout.decks_dir().is_dir());
        assert!(layout.files_dir().is_dir());
    }
}
