//! Hand a draft to the user's editor and read it back.
//!
//! The caller is responsible for leaving the alternate screen first.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("no editor found; set $EDITOR")]
    NotFound,
    #[error("temporary file: {0}")]
    TempFile(#[source] std::io::Error),
    #[error("could not start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Failed { program: String, status: std::process::ExitStatus },
}

#[cfg(windows)]
const FALLBACKS: &[&str] = &["notepad"];
#[cfg(not(windows))]
const FALLBACKS: &[&str] = &["vim", "vi", "nano"];

/// `$EDITOR`, then `$VISUAL`, then the first fallback found on `PATH`.
///
/// The value may carry arguments (`code --wait`).
pub fn resolve_editor() -> Option<Vec<String>> {
    ["EDITOR", "VISUAL"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|value| split_command(&value))
        .find(|parts| !parts.is_empty())
        .or_else(|| {
            FALLBACKS
                .iter()
                .find(|candidate| on_path(candidate))
                .map(|candidate| vec![candidate.to_string()])
        })
}

/// Edit `text` in an external editor and return the saved contents.
pub fn open(text: &str) -> Result<String, EditorError> {
    let command = resolve_editor().ok_or(EditorError::NotFound)?;
    let (program, args) = command.split_first().ok_or(EditorError::NotFound)?;

    let mut file = tempfile::Builder::new()
        .prefix("schemacast-")
        .suffix(".json")
        .tempfile()
        .map_err(EditorError::TempFile)?;
    file.write_all(text.as_bytes()).map_err(EditorError::TempFile)?;
    file.flush().map_err(EditorError::TempFile)?;

    info!(editor = %program, path = %file.path().display(), "opening external editor");
    let status = Command::new(program)
        .args(args)
        .arg(file.path())
        .status()
        .map_err(|source| EditorError::Spawn {
            program: program.clone(),
            source,
        })?;
    if !status.success() {
        return Err(EditorError::Failed {
            program: program.clone(),
            status,
        });
    }

    std::fs::read_to_string(file.path()).map_err(EditorError::TempFile)
}

fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn on_path(program: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(program)))
}

fn is_executable(candidate: &Path) -> bool {
    if candidate.is_file() {
        return true;
    }
    // Windows lookups go through PATHEXT; `.exe` covers the fallbacks we ship.
    cfg!(windows) && PathBuf::from(candidate).with_extension("exe").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_value_may_carry_arguments() {
        assert_eq!(split_command("code --wait"), vec!["code", "--wait"]);
        assert!(split_command("   ").is_empty());
    }
}
