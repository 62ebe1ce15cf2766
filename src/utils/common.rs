//! Common utility functions used across the application

use path_clean::PathClean;
use std::path::{Path, PathBuf};

/// Resolve a path against a base directory.
///
/// Absolute paths are kept as-is; relative paths are joined onto `base`
/// and, if the result is still relative, onto the current working
/// directory. The result is lexically cleaned (`.`/`..` components
/// folded). The target is not required to exist.
pub fn resolve_path(base: &Path, value: &Path) -> PathBuf {
    let joined = if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    };

    let absolute = if joined.is_absolute() {
        joined
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(joined),
            Err(_) => joined,
        }
    };

    absolute.clean()
}

/// Check if a file exists and has valid content (non-zero size)
pub async fn check_file_exists_and_valid(path: &Path) -> bool {
    if let Ok(metadata) = tokio::fs::metadata(path).await {
        if metadata.is_file() && metadata.len() > 0 {
            return true;
        }
    }
    false
}
