//! PDF page counting and rasterization with the poppler utilities.

use std::ffi::OsStr;
use std::path::Path;

use lectern_core::deck::PageRenderer;
use lectern_types::config::DeckSection;
use lectern_types::error::DeckError;

use super::{ToolFailure, run_tool};

/// Counts pages with `pdfinfo` and renders single pages with `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PopplerRenderer {
    pdfinfo: String,
    pdftoppm: String,
    dpi: u32,
    timeout_secs: u64,
}

impl PopplerRenderer {
    pub fn new(deck: &DeckSection) -> Self {
        Self {
            pdfinfo: deck.pdfinfo_path.clone(),
            pdftoppm: deck.pdftoppm_path.clone(),
            dpi: deck.render_dpi,
            timeout_secs: deck.conversion_timeout_secs,
        }
    }
}

/// Extract the page count from `pdfinfo` output.
fn parse_page_count(info: &str) -> Option<u32> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
}

fn tool_error(failure: ToolFailure, wrap: fn(String) -> DeckError) -> DeckError {
    match failure {
        ToolFailure::Missing(msg) => {
            DeckError::UnsupportedPlatform(format!("no pdf rasterizer on this host ({msg})"))
        }
        other => wrap(other.to_string()),
    }
}

impl PageRenderer for PopplerRenderer {
    async fn page_count(&self, document: &Path) -> Result<u32, DeckError> {
        let stdout = run_tool(&self.pdfinfo, [document.as_os_str()], self.timeout_secs)
            .await
            .map_err(|e| tool_error(e, DeckError::Conversion))?;

        let info = String::from_utf8_lossy(&stdout);
        parse_page_count(&info).ok_or_else(|| {
            DeckError::Conversion(format!(
                "{} reported no page count for {}",
                self.pdfinfo,
                document.display()
            ))
        })
    }

    async fn render_page(
        &self,
        document: &Path,
        index: u32,
        output: &Path,
    ) -> Result<Vec<u8>, DeckError> {
        // pdftoppm pages are 1-based and -singlefile appends ".png" itself.
        let page = (index + 1).to_string();
        let dpi = self.dpi.to_string();
        let prefix = output.with_extension("");
        let args: [&OsStr; 10] = [
            OsStr::new("-f"),
            OsStr::new(&page),
            OsStr::new("-l"),
            OsStr::new(&page),
            OsStr::new("-r"),
            OsStr::new(&dpi),
            OsStr::new("-png"),
            OsStr::new("-singlefile"),
            document.as_os_str(),
            prefix.as_os_str(),
        ];

        run_tool(&self.pdftoppm, args, self.timeout_secs)
            .await
            .map_err(|e| tool_error(e, DeckError::Render))?;

        let written = prefix.with_extension("png");
        if written != output {
            tokio::fs::rename(&written, output)
                .await
                .map_err(|e| DeckError::Io(e.to_string()))?;
        }

        tokio::fs::read(output)
            .await
            .map_err(|e| DeckError::Render(format!("page {page} was not written: {e}")))
    }
}
