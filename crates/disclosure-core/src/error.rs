//! Typed error taxonomy for the structuring and comparison pipelines.
//!
//! Mirrors the teacher workspace's `ProcessingError` shape (see
//! `video_audio_extracts::common`): one `thiserror`-derived enum per
//! logical boundary, `anyhow` only at the outermost glue. Every stage in
//! the structuring and comparison orchestrators classifies its failures
//! into one of these variants before recording them.

use thiserror::Error;

/// Errors surfaced by `disclosure-core`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed upload, unsupported media type, size overflow. Never retried.
    #[error("input error: {0}")]
    Input(String),

    /// A stage failed irrecoverably (corrupt PDF, missing file, ...).
    #[error("extraction error in stage {stage}: {message}")]
    Extraction { stage: String, message: String },

    /// An LLM or embedding call failed or returned malformed output after
    /// the single retry allowed by the error taxonomy.
    #[error("model error calling {operation}: {message}")]
    Model { operation: String, message: String },

    /// Missing required settings at startup. Fatal to the process.
    #[error("configuration error: {0}")]
    Config(String),

    /// Lock acquisition timeout, after the single jittered retry.
    #[error("concurrency error acquiring lock for {key}")]
    Concurrency { key: String },

    /// Per-request deadline exceeded. Treated as a `Model` error by callers
    /// that catch it, kept distinct here so call sites can tell a slow
    /// provider from a malformed response.
    #[error("timeout after {0:?} waiting for model response")]
    Timeout(std::time::Duration),

    /// A read against a document or comparison past its retention deadline.
    #[error("retention expired for {0}")]
    RetentionExpired(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn extraction(stage: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Extraction {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn model(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Model {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether this error represents a recoverable model failure that the
    /// caller should substitute an empty/default result for, per §7's
    /// "never fatal to the enclosing stage unless the stage's entire
    /// output depends on the call" rule.
    pub fn is_model_error(&self) -> bool {
        matches!(self, CoreError::Model { .. } | CoreError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
