//! Configuration module for Roost

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::paths;

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Page size for timeline and message fetches
    #[serde(default = "default_load_item_limit")]
    pub load_item_limit: usize,

    /// Refresh mentions on refresh-all
    #[serde(default = "default_true")]
    pub refresh_mentions: bool,

    /// Refresh received and sent direct messages on refresh-all
    #[serde(default = "default_true")]
    pub refresh_direct_messages: bool,

    /// Refresh local trends on refresh-all
    #[serde(default)]
    pub refresh_trends: bool,

    /// Region id for local trends
    #[serde(default = "default_woeid")]
    pub local_trends_woeid: i64,

    /// Auto-refresh interval in seconds (0 = manual only)
    #[serde(default)]
    pub refresh_interval_secs: u64,

    /// Upper bound on concurrently running background tasks
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

const fn default_load_item_limit() -> usize {
    20
}

const fn default_true() -> bool {
    true
}

const fn default_woeid() -> i64 {
    1
}

const fn default_max_concurrent_tasks() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            load_item_limit: default_load_item_limit(),
            refresh_mentions: true,
            refresh_direct_messages: true,
            refresh_trends: false,
            local_trends_woeid: default_woeid(),
            refresh_interval_secs: 0,
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

impl Config {
    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = paths::config_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = paths::config_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.load_item_limit, 20);
        assert!(config.refresh_mentions);
        assert!(!config.refresh_trends);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "load_item_limit = 40\nrefresh_trends = true\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.load_item_limit, 40);
        assert!(config.refresh_trends);
        assert_eq!(config.local_trends_woeid, 1);
        assert_eq!(config.max_concurrent_tasks, 4);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            refresh_interval_secs: 90,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
