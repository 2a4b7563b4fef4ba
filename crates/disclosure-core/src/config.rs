//! Configuration loading, following `sg-daemon::config`'s shape: an
//! optional-everywhere `Deserialize` struct read from a TOML file, layered
//! under environment variables, with accessor methods supplying the
//! documented defaults from spec §6.

use crate::error::{CoreError, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub model: Option<ModelConfig>,
    pub upload: Option<UploadConfig>,
    pub retention: Option<RetentionConfig>,
    pub classification: Option<ClassificationConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ModelConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_timeout_seconds: Option<u64>,
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_api_version: Option<String>,
    pub openai_provider: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct UploadConfig {
    pub max_files: Option<usize>,
    pub max_file_size_mb: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RetentionConfig {
    pub hours: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ClassificationConfig {
    pub use_llm: Option<bool>,
    pub max_prompt_chars: Option<usize>,
}

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_FILES: usize = 10;
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 50;
pub const DEFAULT_RETENTION_HOURS: u64 = 24 * 30;
pub const DEFAULT_CLASSIFICATION_MAX_PROMPT_CHARS: usize = 4_000;

impl Config {
    /// Load from an optional TOML file, then overlay environment variables
    /// (env wins). Matches the teacher's `load_config`: a missing file is
    /// not an error, it just yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let contents = std::fs::read_to_string(p)?;
                toml::from_str(&contents)
                    .map_err(|e| CoreError::Config(format!("invalid config file: {e}")))?
            }
            _ => Config::default(),
        };
        config.overlay_env();
        Ok(config)
    }

    fn overlay_env(&mut self) {
        let model = self.model.get_or_insert_with(ModelConfig::default);
        if let Ok(v) = env::var("OPENAI_API_KEY") {
            model.openai_api_key = Some(v);
        }
        if let Ok(v) = env::var("OPENAI_MODEL") {
            model.openai_model = Some(v);
        }
        if let Ok(v) = env::var("OPENAI_TIMEOUT_SECONDS") {
            if let Ok(secs) = v.parse() {
                model.openai_timeout_seconds = Some(secs);
            }
        }
        if let Ok(v) = env::var("AZURE_OPENAI_ENDPOINT") {
            model.azure_openai_endpoint = Some(v);
        }
        if let Ok(v) = env::var("AZURE_OPENAI_API_VERSION") {
            model.azure_openai_api_version = Some(v);
        }
        if let Ok(v) = env::var("OPENAI_PROVIDER") {
            model.openai_provider = Some(v);
        }

        let upload = self.upload.get_or_insert_with(UploadConfig::default);
        if let Ok(v) = env::var("DOCUMENT_UPLOAD_MAX_FILES") {
            if let Ok(n) = v.parse() {
                upload.max_files = Some(n);
            }
        }
        if let Ok(v) = env::var("DOCUMENT_UPLOAD_MAX_FILE_SIZE_MB") {
            if let Ok(n) = v.parse() {
                upload.max_file_size_mb = Some(n);
            }
        }

        let retention = self.retention.get_or_insert_with(RetentionConfig::default);
        if let Ok(v) = env::var("DOCUMENT_RETENTION_HOURS") {
            if let Ok(n) = v.parse() {
                retention.hours = Some(n);
            }
        }

        let classification = self
            .classification
            .get_or_insert_with(ClassificationConfig::default);
        if let Ok(v) = env::var("DOCUMENT_CLASSIFICATION_USE_LLM") {
            classification.use_llm = Some(v == "1" || v.eq_ignore_ascii_case("true"));
        }
        if let Ok(v) = env::var("DOCUMENT_CLASSIFICATION_MAX_PROMPT_CHARS") {
            if let Ok(n) = v.parse() {
                classification.max_prompt_chars = Some(n);
            }
        }
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        self.model.as_ref()?.openai_api_key.as_deref()
    }

    pub fn openai_model(&self) -> &str {
        self.model
            .as_ref()
            .and_then(|m| m.openai_model.as_deref())
            .unwrap_or(DEFAULT_OPENAI_MODEL)
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .model
            .as_ref()
            .and_then(|m| m.openai_timeout_seconds)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn azure_endpoint(&self) -> Option<&str> {
        self.model.as_ref()?.azure_openai_endpoint.as_deref()
    }

    pub fn max_upload_files(&self) -> usize {
        self.upload
            .as_ref()
            .and_then(|u| u.max_files)
            .unwrap_or(DEFAULT_MAX_UPLOAD_FILES)
    }

    pub fn max_upload_file_size_bytes(&self) -> u64 {
        self.upload
            .as_ref()
            .and_then(|u| u.max_file_size_mb)
            .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB)
            .saturating_mul(1024 * 1024)
    }

    pub fn retention_duration(&self) -> chrono::Duration {
        let hours = self
            .retention
            .as_ref()
            .and_then(|r| r.hours)
            .unwrap_or(DEFAULT_RETENTION_HOURS);
        chrono::Duration::hours(hours as i64)
    }

    pub fn classification_uses_llm(&self) -> bool {
        self.classification
            .as_ref()
            .and_then(|c| c.use_llm)
            .unwrap_or(true)
    }

    pub fn classification_max_prompt_chars(&self) -> usize {
        self.classification
            .as_ref()
            .and_then(|c| c.max_prompt_chars)
            .unwrap_or(DEFAULT_CLASSIFICATION_MAX_PROMPT_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_and_no_env() {
        let config = Config {
            model: Some(ModelConfig::default()),
            ..Default::default()
        };
        assert_eq!(config.openai_model(), DEFAULT_OPENAI_MODEL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_upload_files(), DEFAULT_MAX_UPLOAD_FILES);
        assert_eq!(
            config.max_upload_file_size_bytes(),
            DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024
        );
    }

    #[test]
    fn retention_duration_from_hours() {
        let config = Config {
            retention: Some(RetentionConfig { hours: Some(48) }),
            ..Default::default()
        };
        assert_eq!(config.retention_duration(), chrono::Duration::hours(48));
    }

    #[test]
    fn missing_file_path_yields_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.openai_model(), DEFAULT_OPENAI_MODEL);
    }
}
