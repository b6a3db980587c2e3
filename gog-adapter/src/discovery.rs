//! Locates the gog binary on the host system.

use crate::error::GogError;
use std::path::{Path, PathBuf};
use which::which;

/// Environment variable that overrides the default gog binary path.
pub const GOG_BIN_ENV_VAR: &str = "GOG_ADAPTER_BIN";

/// Locates the gog executable.
///
/// Resolution order:
/// 1. `explicit_path` if provided and the file exists.
/// 2. The path in the `GOG_ADAPTER_BIN` environment variable.
/// 3. `gog` resolved via `$PATH`.
/// 4. Common install location fallbacks (platform-specific).
///
/// # Errors
///
/// Returns `GogError::ExecutableNotFound` when no valid executable can be
/// located. Callers holding an installer capability fall back to it then.
pub fn discover_gog(explicit_path: Option<&Path>) -> Result<PathBuf, GogError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(GogError::ExecutableNotFound(format!(
            "Explicit path does not exist: {}",
            path.display()
        )));
    }

    if let Ok(path_str) = std::env::var(GOG_BIN_ENV_VAR) {
        let path = PathBuf::from(path_str);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            path = %path.display(),
            "{GOG_BIN_ENV_VAR} points to a missing file, ignoring"
        );
    }

    if let Ok(path) = which("gog") {
        return Ok(path);
    }

    for location in fallback_locations() {
        if location.exists() {
            return Ok(location);
        }
    }

    Err(GogError::ExecutableNotFound(
        "gog not found. Install from https://github.com/steipete/gogcli/releases\n\
         Searched: PATH, ~/.local/bin, ~/go/bin, /usr/local/bin."
            .to_string(),
    ))
}

#[cfg(unix)]
fn fallback_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(".local/bin/gog"));
        locations.push(home.join("go/bin/gog"));
    }
    locations.push(PathBuf::from("/usr/local/bin/gog"));
    locations.push(PathBuf::from("/opt/homebrew/bin/gog"));
    locations
}

#[cfg(windows)]
fn fallback_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join("go/bin/gog.exe"));
    }
    if let Some(local) = dirs::data_local_dir() {
        locations.push(local.join("Programs/gog/gog.exe"));
    }
    locations
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gog");

        let err = discover_gog(Some(&missing)).unwrap_err();
        assert!(matches!(err, GogError::ExecutableNotFound(msg) if msg.contains("Explicit path")));

        std::fs::write(&missing, b"").unwrap();
        assert_eq!(discover_gog(Some(&missing)).unwrap(), missing);
    }
}
