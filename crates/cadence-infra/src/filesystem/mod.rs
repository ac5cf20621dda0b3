//! Filesystem adapters for Cadence.
//!
//! The flat-file state backend and data directory resolution.

pub mod state;

use std::path::PathBuf;

pub use state::FileStateRepository;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CADENCE_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CADENCE_DATA_DIR` environment variable
/// 2. `~/.cadence`
/// 3. `.cadence` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".cadence");
    }

    PathBuf::from(".cadence")
}

/// Root of the flat-file state backend inside a data directory.
pub fn state_root(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_data_dir_from_env() {
        // SAFETY: This test is single-threaded and restores the env var immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-cadence");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-cadence"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }

    #[test]
    fn state_root_is_nested_in_data_dir() {
        assert_eq!(
            state_root(std::path::Path::new("/data")),
            PathBuf::from("/data/state")
        );
    }
}
