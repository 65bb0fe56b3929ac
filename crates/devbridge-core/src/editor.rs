//! File lookup and launch for `openInEditor`.
//!
//! Input is a path optionally suffixed with `:line` or `:line:column`. The
//! literal path is tried first, then the path with each of
//! [`EditorConfig::EXTENSION_FALLBACKS`] appended.

use crate::config::EditorConfig;
use crate::error::{BridgeError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// A file position to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorTarget {
    pub path: PathBuf,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl EditorTarget {
    /// `path[:line[:column]]`, the form most editors accept on the command line.
    pub fn location(&self) -> String {
        let mut location = self.path.display().to_string();
        if let Some(line) = self.line {
            location.push_str(&format!(":{}", line));
            if let Some(column) = self.column {
                location.push_str(&format!(":{}", column));
            }
        }
        location
    }
}

/// Split a trailing `:line` / `:line:column` off `input`.
pub fn parse_location(input: &str) -> (&str, Option<u32>, Option<u32>) {
    let Some((rest, last)) = input.rsplit_once(':') else {
        return (input, None, None);
    };
    let Ok(last) = last.parse::<u32>() else {
        return (input, None, None);
    };

    if let Some((path, middle)) = rest.rsplit_once(':') {
        if let Ok(line) = middle.parse::<u32>() {
            return (path, Some(line), Some(last));
        }
    }
    (rest, Some(last), None)
}

/// Find the first existing candidate for `input`, relative paths taken from `root`.
pub fn resolve(input: &str, root: &Path) -> Option<EditorTarget> {
    let (path, line, column) = parse_location(input);
    if path.is_empty() {
        return None;
    }
    let base = root.join(path);

    std::iter::once(String::new())
        .chain(EditorConfig::EXTENSION_FALLBACKS.iter().map(|s| s.to_string()))
        .map(|suffix| {
            let mut candidate = base.clone().into_os_string();
            candidate.push(&suffix);
            PathBuf::from(candidate)
        })
        .find(|candidate| candidate.exists())
        .map(|path| EditorTarget { path, line, column })
}

/// Launch `command` with the target location as its only argument.
///
/// The editor process is detached; only spawn failures are reported.
pub async fn spawn_editor(command: &str, target: &EditorTarget) -> Result<()> {
    let mut parts = command.split_whitespace();
    let program = parts.next().ok_or_else(|| BridgeError::InvalidParams {
        message: "editor command is empty".to_string(),
    })?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(parts);
    if program.ends_with("code") || program.ends_with("codium") {
        cmd.arg("--goto");
    }
    cmd.arg(target.location());

    cmd.spawn()
        .map_err(|e| BridgeError::io_with_path(e, program))?;
    info!("Opened {} with {}", target.location(), program);
    Ok(())
}
