//! Progress Reporter (§4.12): a single keyed store of `Progress` records,
//! poll-only, monotonic on `progress` unless the status moves to
//! `failed`. Durable because it is backed by the same per-key JSON file
//! discipline as the other stores.

use crate::locks::LockRegistry;
use disclosure_core::error::Result;
use disclosure_core::model::Progress;
use std::path::PathBuf;
use tracing::instrument;

pub struct ProgressReporter {
    dir: PathBuf,
    locks: LockRegistry,
}

impl ProgressReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: LockRegistry::new(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(key)))
    }

    /// Merges `update` into the stored progress for `key` via
    /// `Progress::apply_update`, creating the record if absent.
    #[instrument(skip(self, update))]
    pub async fn update(&self, key: &str, update: Progress) -> Result<()> {
        let _guard = self.locks.acquire(key).await;
        let mut current = self.read(key)?.unwrap_or_else(|| Progress::queued("queued"));
        current.apply_update(update);
        let serialized = serde_json::to_string_pretty(&current)?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Progress>> {
        let _guard = self.locks.acquire(key).await;
        self.read(key)
    }

    fn read(&self, key: &str) -> Result<Option<Progress>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}

/// Progress keys are `document:<id>` or `comparison:<id>`; `:` is not
/// portable in every filesystem, so it is mapped to `_` on disk only.
fn sanitize(key: &str) -> String {
    key.replace(':', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use disclosure_core::model::ProgressStatus;

    #[tokio::test]
    async fn update_creates_then_merges() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = ProgressReporter::new(dir.path()).unwrap();

        reporter
            .update(
                "document:doc-1",
                Progress {
                    status: ProgressStatus::Running,
                    progress: 10,
                    step: "extracting_text".into(),
                    current_section: None,
                    total_sections: None,
                    completed_sections: None,
                    error: None,
                },
            )
            .await
            .unwrap();

        reporter
            .update(
                "document:doc-1",
                Progress {
                    status: ProgressStatus::Running,
                    progress: 50,
                    step: "detecting_sections".into(),
                    current_section: None,
                    total_sections: None,
                    completed_sections: None,
                    error: None,
                },
            )
            .await
            .unwrap();

        let progress = reporter.get("document:doc-1").await.unwrap().unwrap();
        assert_eq!(progress.progress, 50);
        assert_eq!(progress.step, "detecting_sections");
    }

    #[tokio::test]
    async fn progress_never_regresses_unless_failed() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = ProgressReporter::new(dir.path()).unwrap();

        reporter
            .update(
                "document:doc-1",
                Progress {
                    status: ProgressStatus::Running,
                    progress: 80,
                    step: "structured".into(),
                    current_section: None,
                    total_sections: None,
                    completed_sections: None,
                    error: None,
                },
            )
            .await
            .unwrap();

        reporter
            .update(
                "document:doc-1",
                Progress {
                    status: ProgressStatus::Running,
                    progress: 20,
                    step: "stale_retry".into(),
                    current_section: None,
                    total_sections: None,
                    completed_sections: None,
                    error: None,
                },
            )
            .await
            .unwrap();

        let progress = reporter.get("document:doc-1").await.unwrap().unwrap();
        assert_eq!(progress.progress, 80);
    }

    #[tokio::test]
    async fn failed_status_overrides_monotonic_progress() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = ProgressReporter::new(dir.path()).unwrap();

        reporter
            .update(
                "document:doc-1",
                Progress {
                    status: ProgressStatus::Running,
                    progress: 80,
                    step: "structured".into(),
                    current_section: None,
                    total_sections: None,
                    completed_sections: None,
                    error: None,
                },
            )
            .await
            .unwrap();

        reporter
            .update(
                "document:doc-1",
                Progress {
                    status: ProgressStatus::Failed,
                    progress: 0,
                    step: "failed".into(),
                    current_section: None,
                    total_sections: None,
                    completed_sections: None,
                    error: Some("corrupt pdf".into()),
                },
            )
            .await
            .unwrap();

        let progress = reporter.get("document:doc-1").await.unwrap().unwrap();
        assert_eq!(progress.status, ProgressStatus::Failed);
        assert_eq!(progress.progress, 0);
    }
}
