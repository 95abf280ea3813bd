//! Configuration file loading.
//!
//! The configuration is a JSON document; every key is optional. A relative
//! `databaseDirectory` is resolved against the configuration file's own
//! directory.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Supervisor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Where snapshots and startup sources live
    pub database_directory: String,
    /// Seconds between periodic checkpoints; 0 disables them
    pub checkpoint_interval: f64,
    /// Directory size ceiling in megabytes; absent disables retention
    pub checkpoint_max_directory_size: Option<f64>,
    /// Minimum number of snapshots retention must keep
    pub checkpoint_min_files: usize,
    /// Whether shutdown takes a final snapshot
    pub checkpoint_at_shutdown: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_directory: "./".to_string(),
            checkpoint_interval: 600.0,
            checkpoint_max_directory_size: None,
            checkpoint_min_files: 0,
            checkpoint_at_shutdown: true,
        }
    }
}

impl Config {
    /// Loads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Config, CliError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| CliError::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// The database directory, resolved against the configuration file's
    /// location when relative.
    pub fn database_dir(&self, config_path: &Path) -> PathBuf {
        let dir = Path::new(&self.database_directory);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(dir)
        }
    }

    /// The size ceiling in bytes, when retention is enabled.
    pub fn max_directory_bytes(&self) -> Option<u64> {
        self.checkpoint_max_directory_size
            .map(|mb| (mb * 1024.0 * 1024.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.database_directory, "./");
        assert_eq!(config.checkpoint_interval, 600.0);
        assert_eq!(config.checkpoint_max_directory_size, None);
        assert_eq!(config.checkpoint_min_files, 0);
        assert!(config.checkpoint_at_shutdown);
    }

    #[test]
    fn test_parse_all_keys() {
        let config: Config = serde_json::from_str(
            r#"{
                "databaseDirectory": "world",
                "checkpointInterval": 60,
                "checkpointMaxDirectorySize": 128,
                "checkpointMinFiles": 4,
                "checkpointAtShutdown": false
            }"#,
        )
        .unwrap();
        assert_eq!(config.database_directory, "world");
        assert_eq!(config.checkpoint_interval, 60.0);
        assert_eq!(config.max_directory_bytes(), Some(128 * 1024 * 1024));
        assert_eq!(config.checkpoint_min_files, 4);
        assert!(!config.checkpoint_at_shutdown);
    }

    #[test]
    fn test_relative_directory_resolution() {
        let config = Config {
            database_directory: "data".to_string(),
            ..Config::default()
        };
        let resolved = config.database_dir(Path::new("/etc/city/config.json"));
        assert_eq!(resolved, PathBuf::from("/etc/city/data"));

        let absolute = Config {
            database_directory: "/var/city".to_string(),
            ..Config::default()
        };
        assert_eq!(
            absolute.database_dir(Path::new("/etc/city/config.json")),
            PathBuf::from("/var/city")
        );
    }
}
