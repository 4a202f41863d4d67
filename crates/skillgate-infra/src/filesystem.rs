//! Data directory and path helpers.

use std::path::{Path, PathBuf};

/// Resolve the SkillGate data directory.
///
/// Priority:
/// 1. `SKILLGATE_DATA_DIR` environment variable
/// 2. `~/.skillgate`
/// 3. `.skillgate` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SKILLGATE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".skillgate");
    }

    PathBuf::from(".skillgate")
}

/// Expand a leading `~` to the home directory. Other paths are returned as-is.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Expand `~` and resolve relative paths against `base`.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    let expanded = expand_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
