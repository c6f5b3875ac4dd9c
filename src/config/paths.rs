//! Path management for history-trail
//!
//! ## Path Resolution Order
//!
//! 1. `HISTORY_TRAIL_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/history-trail` or `~/.config/history-trail`
//! 3. Windows: `%APPDATA%\history-trail`

use std::path::PathBuf;

use crate::error::TrailError;

/// Environment variable overriding the base directory
pub const DIR_ENV: &str = "HISTORY_TRAIL_DIR";

/// Manages all paths used by history-trail
#[derive(Debug, Clone)]
pub struct TrailPaths {
    base_dir: PathBuf,
}

impl TrailPaths {
    /// Resolve the base directory from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, TrailError> {
        let base_dir = match std::env::var(DIR_ENV) {
            Ok(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Use a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the default JSONL audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    pub fn ensure_directories(&self) -> Result<(), TrailError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| TrailError::Io(format!("Failed to create base directory: {}", e)))
    }

    /// Check if a settings file has been written
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, TrailError> {
    let config_base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => {
            let home = std::env::var("HOME")
                .map_err(|_| TrailError::Config("HOME environment variable not set".into()))?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(config_base.join("history-trail"))
}

#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, TrailError> {
    let appdata = std::env::var("APPDATA")
        .map_err(|_| TrailError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("history-trail"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TrailPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(paths.audit_log(), temp_dir.path().join("audit.log"));
    }

    #[test]
    fn test_env_var_override() {
        let temp_dir = TempDir::new().unwrap();
        env::set_var(DIR_ENV, temp_dir.path());

        let paths = TrailPaths::new().unwrap();
        assert_eq!(paths.base_dir(), temp_dir.path());

        env::remove_var(DIR_ENV);
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TrailPaths::with_base_dir(temp_dir.path().join("nested"));

        assert!(!paths.is_initialized());
        paths.ensure_directories().unwrap();
        assert!(paths.base_dir().exists());
    }
}
