//! Daemon-specific configuration: storage directories and sweep cadence.
//! Shape follows `disclosure_core::config::Config`: an optional-everywhere
//! `Deserialize` struct read from TOML, overlaid with environment
//! variables, with accessor methods supplying defaults.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub storage: Option<StorageConfig>,
    pub retention: Option<RetentionConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RetentionConfig {
    pub sweep_interval_secs: Option<u64>,
}

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let contents = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file: {}", p.display()))?;
                toml::from_str(&contents).context("failed to parse config file as toml")?
            }
            _ => Config::default(),
        };
        config.overlay_env();
        Ok(config)
    }

    fn overlay_env(&mut self) {
        let storage = self.storage.get_or_insert_with(StorageConfig::default);
        if let Ok(v) = env::var("DISCLOSURE_STORAGE_DIR") {
            storage.base_dir = Some(PathBuf::from(v));
        }

        let retention = self.retention.get_or_insert_with(RetentionConfig::default);
        if let Ok(v) = env::var("DISCLOSURE_SWEEP_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                retention.sweep_interval_secs = Some(n);
            }
        }
    }

    /// Base storage directory, holding `documents/`, `comparisons/`,
    /// `progress/`, and `pdfs/` subdirectories. Defaults to the
    /// platform's project data directory.
    pub fn base_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = self.storage.as_ref().and_then(|s| s.base_dir.clone()) {
            return Ok(dir);
        }
        let dirs = ProjectDirs::from("", "", "disclosure-daemon")
            .context("could not determine platform data directory")?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        let secs = self
            .retention
            .as_ref()
            .and_then(|r| r.sweep_interval_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        std::time::Duration::from_secs(secs)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "disclosure-daemon")
        .context("could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_and_no_env() {
        let config = Config::default();
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS));
    }

    #[test]
    fn base_dir_honors_explicit_setting() {
        let config = Config {
            storage: Some(StorageConfig {
                base_dir: Some(PathBuf::from("/tmp/disclosure-test")),
            }),
            ..Default::default()
        };
        assert_eq!(config.base_dir().unwrap(), PathBuf::from("/tmp/disclosure-test"));
    }

    #[test]
    fn sweep_interval_honors_explicit_setting() {
        let config = Config {
            retention: Some(RetentionConfig {
                sweep_interval_secs: Some(120),
            }),
            ..Default::default()
        };
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(120));
    }

    #[test]
    fn missing_file_path_yields_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.sweep_interval(), std::time::Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS));
    }
}
