//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Statistics endpoint used when nothing else is configured
pub const DEFAULT_STATS_URL: &str = "http://autopilot:8080/stats";

/// CLI configuration stored in `~/.config/rightsize/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Statistics snapshot endpoint
    pub stats_url: Option<String>,
}

impl Config {
    /// Load configuration from the default location, if present
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Pick the stats URL: explicit value, then this file, then the default
    pub fn resolve_stats_url(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.stats_url.clone())
            .unwrap_or_else(|| DEFAULT_STATS_URL.to_string())
    }

    fn config_path() -> Option<PathBuf> {
        let home = dirs_next::home_dir()?;
        Some(home.join(".config").join("rightsize").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.stats_url.is_none());
        assert_eq!(config.resolve_stats_url(None), DEFAULT_STATS_URL);
    }

    #[test]
    fn test_url_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"stats_url": "http://stats.local/stats"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.resolve_stats_url(None), "http://stats.local/stats");
        assert_eq!(
            config.resolve_stats_url(Some("http://flag/stats".to_string())),
            "http://flag/stats"
        );
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "stats_url = nope").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
