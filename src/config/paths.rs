//! Path resolution for tapline configuration and data files.
//!
//! All tapline data is stored in `~/.tapline/`:
//! - `config.yaml` - Main configuration file
//! - `tapline.db` - SQLite database holding the outbox

use std::path::PathBuf;

use crate::error::TaplineError;

/// Paths to tapline configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.tapline/`
    pub root: PathBuf,
    /// Config file: `~/.tapline/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.tapline/tapline.db`
    pub database: PathBuf,
}

impl Paths {
    /// Create paths based on the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, TaplineError> {
        let home = std::env::var("HOME")
            .map_err(|_| TaplineError::Config("Could not determine home directory".to_string()))?;

        let root = PathBuf::from(home).join(".tapline");

        Ok(Self {
            config_file: root.join("config.yaml"),
            database: root.join("tapline.db"),
            root,
        })
    }

    /// Create paths with a custom root directory (useful for testing).
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("tapline.db"),
            root,
        }
    }

    /// Ensure the root directory exists, creating it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), TaplineError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                TaplineError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }

        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| {
            // Fallback to current directory if home cannot be determined
            Self::with_root(PathBuf::from(".tapline"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-tapline");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("tapline.db"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested"));

        paths.ensure_dirs().unwrap();

        assert!(paths.root.exists());
    }
}
