//! AuditDB Configuration Module
//! Handles loading and validating auditdb.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub form: FormConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backing XML file, relative to the project directory
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Destination directory, relative to the project directory. `None`
    /// puts backups next to the database file.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Schema document, relative to the project directory
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
}

/// Field names the generated default schema marks as required
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default)]
    pub required_fields: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database/audits.xml")
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema/audit.schema.json")
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schema_path: default_schema_path(),
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            required_fields: vec![
                "patient-id".to_string(),
                "data-collector".to_string(),
                "collection-date".to_string(),
                "age".to_string(),
                "gender".to_string(),
                "first-visit".to_string(),
                "primary-diagnosis".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join("auditdb.config.json");
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join("auditdb.config.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig {
                path: default_database_path(),
            },
            backup: BackupConfig::default(),
            validation: ValidationConfig::default(),
            form: FormConfig::default(),
        }
    }

    /// Absolute database path for a project directory
    pub fn database_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.database.path)
    }

    /// Absolute schema path for a project directory
    pub fn schema_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.validation.schema_path)
    }

    /// Configured backup directory, absolute. `None` when backups go next
    /// to the database file.
    pub fn backup_dir(&self, project_dir: &Path) -> Option<PathBuf> {
        self.backup.dir.as_ref().map(|d| project_dir.join(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let config = Config::default_for_project();
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.database.path, PathBuf::from("database/audits.xml"));
        assert!(loaded.validation.enabled);
        assert!(loaded.form.required_fields.contains(&"gender".to_string()));
        assert_eq!(loaded.backup.dir, None);
    }

    #[test]
    fn test_backup_dir_resolves_against_project() {
        let dir = tempdir().unwrap();
        let mut config = Config::default_for_project();
        assert_eq!(config.backup_dir(dir.path()), None);

        config.backup.dir = Some(PathBuf::from("backups"));
        assert_eq!(
            config.backup_dir(dir.path()),
            Some(dir.path().join("backups"))
        );
    }

    #[test]
    fn test_missing_config_is_not_found() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(ConfigError::NotFound(_))
        ));
    }
}
