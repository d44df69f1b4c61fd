//! Executable lookup for the runtime CLI.

use std::path::{Path, PathBuf};

/// Per-user install locations checked when the executable is not on `PATH`.
const USER_BIN_DIRS: &[&str] = &[".local/bin", ".claude/local", ".npm-global/bin"];

/// Resolve an executable by name.
///
/// The search order is:
/// 1. Explicit paths (absolute or containing a separator).
/// 2. The current process PATH via `which`.
/// 3. Per-user install directories under the home directory.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    let executable = executable.trim();
    if executable.is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() || executable.contains(std::path::MAIN_SEPARATOR) {
        return path.is_file().then(|| path.to_path_buf());
    }

    if let Some(found) = which_async(executable).await {
        return Some(found);
    }

    let home = dirs::home_dir()?;
    let found = USER_BIN_DIRS
        .iter()
        .map(|dir| home.join(dir).join(executable))
        .find(|candidate| candidate.is_file());
    if let Some(found) = &found {
        tracing::debug!(path = %found.display(), "Resolved executable outside PATH");
    }
    found
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_name() {
        assert!(resolve_executable_path("  ").await.is_none());
    }

    #[tokio::test]
    async fn test_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("claude");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();

        assert_eq!(resolve_executable_path(exe.to_str().unwrap()).await, Some(exe.clone()));
        let missing = dir.path().join("missing");
        assert!(resolve_executable_path(missing.to_str().unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_executable() {
        assert!(
            resolve_executable_path("skillflow-definitely-not-installed")
                .await
                .is_none()
        );
    }
}
