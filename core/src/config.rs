//! Database configuration.
//!
//! [`DatabaseConfig`] is serializable and can be kept in a YAML file next to
//! the application's other settings. Every field has a default, so a file
//! only needs the fields it changes.
//!
//! # Example YAML
//!
//! ```yaml
//! name: vaults
//! path: /var/lib/app/vaults.db
//! template: /usr/share/app/vaults-template.db
//! busy_timeout_ms: 5000
//! statement_cache_capacity: 16
//! allow_data_loss_on_recovery: false
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings for opening one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Logical name used in logs.
    pub name: String,
    /// Database file; `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    /// Prepackaged database copied to `path` when that file does not exist.
    pub template: Option<PathBuf>,
    /// How long to wait on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Capacity of the engine's prepared-statement cache.
    pub statement_cache_capacity: usize,
    /// Delete the file after a successful corruption recovery so the next
    /// open starts from an empty store.
    pub allow_data_loss_on_recovery: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            path: None,
            template: None,
            busy_timeout_ms: 5000,
            statement_cache_capacity: 16,
            allow_data_loss_on_recovery: false,
        }
    }
}

impl DatabaseConfig {
    /// Configuration for the database file at `path`.
    ///
    /// The name defaults to the file stem.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlguard_core::DatabaseConfig;
    ///
    /// let config = DatabaseConfig::file("/tmp/vaults.db");
    /// assert_eq!(config.name, "vaults");
    /// assert!(!config.allow_data_loss_on_recovery);
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string());
        Self {
            name,
            path: Some(path),
            ..Self::default()
        }
    }

    /// Configuration for an in-memory database.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::Error::Io) if the file cannot be read, or
    /// [`Yaml`](crate::Error::Yaml) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::Error::Io) if the file cannot be written, or
    /// [`Yaml`](crate::Error::Yaml) if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_complete() {
        let yaml = r#"
name: vaults
path: /data/vaults.db
template: /assets/vaults.db
busy_timeout_ms: 250
statement_cache_capacity: 4
allow_data_loss_on_recovery: true
"#;
        let config: DatabaseConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "vaults");
        assert_eq!(config.path, Some(PathBuf::from("/data/vaults.db")));
        assert_eq!(config.template, Some(PathBuf::from("/assets/vaults.db")));
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.statement_cache_capacity, 4);
        assert!(config.allow_data_loss_on_recovery);
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: DatabaseConfig = serde_yaml::from_str("name: partial\n").unwrap();
        assert_eq!(config.name, "partial");
        assert_eq!(config.path, None);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.statement_cache_capacity, 16);
        assert!(!config.allow_data_loss_on_recovery);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("db.yml");

        let mut config = DatabaseConfig::file(dir.path().join("vaults.db"));
        config.busy_timeout_ms = 1234;
        config.save(&file).unwrap();

        let loaded = DatabaseConfig::load(&file).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let err = DatabaseConfig::load("/nonexistent/sqlguard.yml").unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.yml");
        std::fs::write(&file, "busy_timeout_ms: [not, a, number]\n").unwrap();
        let err = DatabaseConfig::load(&file).unwrap_err();
        assert!(matches!(err, crate::Error::Yaml(_)));
    }
}
