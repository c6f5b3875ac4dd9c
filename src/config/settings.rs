//! Engine settings for history-trail
//!
//! Global audit policy (ignored keys, soft-delete column, criteria
//! interception) and query defaults, persisted as JSON.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::TrailPaths;
use crate::error::TrailError;

/// Settings for the audit engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Columns left out of every payload unless a type includes them.
    /// Empty by default; list timestamp columns here to keep them out.
    #[serde(default)]
    pub ignored_keys: Vec<String>,

    /// Boolean column whose false -> true flip turns an UPDATE into a DELETE
    #[serde(default = "default_soft_delete_field")]
    pub soft_delete_field: String,

    /// Whether criteria-based updates and deletes are audited
    #[serde(default = "default_true")]
    pub intercept_criteria: bool,

    /// Page size used when a query gives none
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,

    /// JSONL audit log location; defaults to `audit.log` in the base directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_file: Option<PathBuf>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_soft_delete_field() -> String {
    "is_deleted".to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_limit() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            ignored_keys: Vec::new(),
            soft_delete_field: default_soft_delete_field(),
            intercept_criteria: true,
            default_page_limit: default_page_limit(),
            audit_log_file: None,
        }
    }
}

impl Settings {
    /// Ignored keys as a lookup set
    pub fn ignored_set(&self) -> HashSet<String> {
        self.ignored_keys.iter().cloned().collect()
    }

    /// Where the JSONL audit log lives
    pub fn audit_log_path(&self, paths: &TrailPaths) -> PathBuf {
        self.audit_log_file
            .clone()
            .unwrap_or_else(|| paths.audit_log())
    }

    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &TrailPaths) -> Result<Self, TrailError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| TrailError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents)
                .map_err(|e| TrailError::Config(format!("Failed to parse settings file: {}", e)))?;

            if settings.default_page_limit == 0 {
                return Err(TrailError::Config(
                    "default_page_limit must be greater than zero".into(),
                ));
            }

            Ok(settings)
        } else {
            // Not persisted until the caller saves
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &TrailPaths) -> Result<(), TrailError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| TrailError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| TrailError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.soft_delete_field, "is_deleted");
        assert!(settings.intercept_criteria);
        assert_eq!(settings.default_page_limit, 10);
        assert!(settings.ignored_keys.is_empty());
    }

    #[test]
    fn test_no_columns_ignored_unless_configured() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TrailPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"intercept_criteria": true}"#).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert!(loaded.ignored_set().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TrailPaths::with_base_dir(temp_dir.path().to_path_buf());

        let settings = Settings {
            intercept_criteria: false,
            ignored_keys: vec!["password".into()],
            ..Settings::default()
        };
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TrailPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"soft_delete_field": "archived"}"#).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.soft_delete_field, "archived");
        assert_eq!(loaded.default_page_limit, 10);
        assert_eq!(loaded.audit_log_path(&paths), temp_dir.path().join("audit.log"));
    }

    #[test]
    fn test_zero_page_limit_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TrailPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"default_page_limit": 0}"#).unwrap();

        assert!(matches!(
            Settings::load_or_create(&paths),
            Err(TrailError::Config(_))
        ));
    }
}
