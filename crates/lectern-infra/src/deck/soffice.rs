//! Slide deck to PDF conversion with a headless office suite.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use lectern_core::deck::DocumentConverter;
use lectern_types::config::DeckSection;
use lectern_types::error::DeckError;
use lectern_types::session::DeckRef;

use super::{ToolFailure, run_tool};

/// Runs `soffice --headless --convert-to pdf`.
///
/// Each conversion gets a throwaway user profile so concurrent conversions
/// do not contend for the suite's profile lock.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: String,
    timeout_secs: u64,
}

impl SofficeConverter {
    pub fn new(deck: &DeckSection) -> Self {
        Self {
            program: deck.soffice_path.clone(),
            timeout_secs: deck.conversion_timeout_secs,
        }
    }
}

/// Path soffice writes the converted document to.
fn converted_path(input: &Path, out_dir: &Path) -> Result<PathBuf, DeckError> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| DeckError::Conversion(format!("bad deck path {}", input.display())))?;
    Ok(out_dir.join(format!("{stem}.pdf")))
}

impl DocumentConverter for SofficeConverter {
    async fn to_paginated(&self, deck: &DeckRef, out_dir: &Path) -> Result<PathBuf, DeckError> {
        if !cfg!(any(target_os = "linux", target_os = "macos")) {
            return Err(DeckError::UnsupportedPlatform(format!(
                "slide conversion is not supported on {}",
                std::env::consts::OS
            )));
        }

        let output = converted_path(&deck.stored_path, out_dir)?;
        let profile = out_dir.join(".soffice-profile");
        let profile_arg = format!("-env:UserInstallation=file://{}", profile.display());

        let started = std::time::Instant::now();
        let args: [&OsStr; 7] = [
            OsStr::new(&profile_arg),
            OsStr::new("--headless"),
            OsStr::new("--convert-to"),
            OsStr::new("pdf"),
            OsStr::new("--outdir"),
            out_dir.as_os_str(),
            deck.stored_path.as_os_str(),
        ];
        let result = run_tool(&self.program, args, self.timeout_secs).await;
        let _ = tokio::fs::remove_dir_all(&profile).await;

        match result {
            Ok(_) => {}
            Err(ToolFailure::Missing(msg)) => {
                return Err(DeckError::UnsupportedPlatform(format!(
                    "no slide converter on this host ({msg})"
                )));
            }
            Err(other) => return Err(DeckError::Conversion(other.to_string())),
        }

        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(DeckError::Conversion(format!(
                "{} produced no output for {}",
                self.program, deck.original_name
            )));
        }

        tracing::info!(
            deck = %deck.original_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "converted slide deck to pdf"
        );
        Ok(output)
    }
}
