//! Configuration for the accounts store

use crate::contract::{AccountsError, Result};
use crate::domain::validation::DEFAULT_MAX_KEY_LENGTH;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Accounts store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Upper bound on each load/save/remove call against storage
    #[serde(
        default = "default_persistence_timeout",
        with = "humantime_serde"
    )]
    pub persistence_timeout: Duration,

    /// Flush dirty accounts when the store shuts down
    #[serde(default = "default_true")]
    pub flush_on_shutdown: bool,

    /// Maximum settings key length in bytes
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,

    /// Directory for file-backed storage; in-memory when unset
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// YAML file with provider and service template definitions
    #[serde(default)]
    pub providers_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persistence_timeout: default_persistence_timeout(),
            flush_on_shutdown: true,
            max_key_length: default_max_key_length(),
            storage_dir: None,
            providers_file: None,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| AccountsError::config(format!("invalid store config: {}", e)))?;
        if config.persistence_timeout.is_zero() {
            return Err(AccountsError::config("persistence_timeout must be positive"));
        }
        if config.max_key_length == 0 {
            return Err(AccountsError::config("max_key_length must be positive"));
        }
        Ok(config)
    }
}

fn default_persistence_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

fn default_max_key_length() -> usize {
    DEFAULT_MAX_KEY_LENGTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config.persistence_timeout, Duration::from_secs(5));
        assert!(config.flush_on_shutdown);
        assert_eq!(config.max_key_length, 256);
        assert!(config.storage_dir.is_none());
        assert!(config.providers_file.is_none());
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
persistence_timeout: 250ms
flush_on_shutdown: false
max_key_length: 64
storage_dir: /var/lib/accounts
providers_file: providers.yaml
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.persistence_timeout, Duration::from_millis(250));
        assert!(!config.flush_on_shutdown);
        assert_eq!(config.max_key_length, 64);
        assert_eq!(config.storage_dir, Some(PathBuf::from("/var/lib/accounts")));
        assert_eq!(config.providers_file, Some(PathBuf::from("providers.yaml")));
    }

    #[test]
    fn test_rejects_bad_documents() {
        for yaml in [
            "unknown_field: 1",
            "persistence_timeout: soon",
            "persistence_timeout: 0s",
            "max_key_length: 0",
        ] {
            assert!(
                matches!(Config::from_yaml_str(yaml), Err(AccountsError::Config { .. })),
                "accepted {}",
                yaml
            );
        }
    }
}
