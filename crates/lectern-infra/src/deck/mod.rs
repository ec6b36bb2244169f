//! External deck tools.
//!
//! `SofficeConverter` flattens slide decks to PDF with a headless office
//! suite; `PopplerRenderer` counts and rasterizes PDF pages with the poppler
//! utilities. Both shell out through [`run_tool`].

pub mod poppler;
pub mod soffice;

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::time::Duration;

pub use poppler::PopplerRenderer;
pub use soffice::SofficeConverter;

/// Why an external tool invocation failed.
#[derive(Debug)]
pub(crate) enum ToolFailure {
    /// The binary could not be found or executed.
    Missing(String),
    TimedOut(u64),
    /// Non-zero exit, or an I/O error while waiting.
    Failed(String),
}

/// Run `program` with `args`, capture its output, and kill it if it runs
/// longer than `timeout_secs`. Returns stdout on a zero exit status.
pub(crate) async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout_secs: u64,
) -> Result<Vec<u8>, ToolFailure>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                ToolFailure::Missing(format!("{program}: {e}"))
            }
            _ => ToolFailure::Failed(format!("failed to spawn {program}: {e}")),
        })?;

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| ToolFailure::TimedOut(timeout_secs))?
        .map_err(|e| ToolFailure::Failed(format!("failed to wait for {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolFailure::Failed(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(output.stdout)
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolFailure::Missing(msg) => write!(f, "tool not available: {msg}"),
            ToolFailure::TimedOut(secs) => write!(f, "timed out after {secs}s"),
            ToolFailure::Failed(msg) => f.write_str(msg),
        }
    }
}
