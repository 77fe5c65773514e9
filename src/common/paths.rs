//! Configuration and data paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/ctrltest/` and `~/.local/share/ctrltest/`
//! - macOS: `~/Library/Application Support/ctrltest/`
//! - Windows: `%APPDATA%\ctrltest\`

use std::io;
use std::path::{Path, PathBuf};

/// Application name used for directory lookup
const APP_NAME: &str = "ctrltest";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Get the default directory for run snapshots
pub fn runs_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("runs"))
}

/// Resolve `path` relative to the directory containing `base`
///
/// Absolute paths are returned unchanged.
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    base.parent().unwrap_or(Path::new(".")).join(path)
}

/// Create `dir` (and parents) if it does not exist yet
pub fn ensure_dir(dir: &Path) -> io::Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_resolve_relative_to_script() {
        let script = Path::new("/tests/ahu/sequence.yaml");
        assert_eq!(
            resolve_relative(script, Path::new("points.json")),
            PathBuf::from("/tests/ahu/points.json")
        );
        assert_eq!(
            resolve_relative(script, Path::new("/etc/points.json")),
            PathBuf::from("/etc/points.json")
        );
    }

    #[test]
    fn test_resolve_relative_bare_file_name() {
        let resolved = resolve_relative(Path::new("script.yaml"), Path::new("points.json"));
        assert_eq!(resolved, PathBuf::from("points.json"));
    }
}
