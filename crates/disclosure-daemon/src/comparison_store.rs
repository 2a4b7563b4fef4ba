//! Comparison Result Store (§4.11): file-backed `Comparison` artifacts,
//! same per-identifier lock discipline as the Metadata Store.

use crate::locks::LockRegistry;
use chrono::{DateTime, Utc};
use disclosure_core::error::Result;
use disclosure_core::model::{Comparison, ComparisonId, ComparisonMode};
use std::path::{Path, PathBuf};
use tracing::instrument;

const SCHEMA_VERSION: u32 = 1;

#[derive(serde::Serialize, serde::Deserialize)]
struct ComparisonRecord {
    schema_version: u32,
    comparison: Comparison,
}

/// Lightweight descriptor returned by `list`, matching the spec's
/// "id, timestamp, mode, filenames, section count" (§4.11).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComparisonDescriptor {
    pub id: ComparisonId,
    pub created_at: DateTime<Utc>,
    pub mode: ComparisonMode,
    pub filenames: Vec<String>,
    pub section_count: usize,
}

pub struct ComparisonStore {
    dir: PathBuf,
    locks: LockRegistry,
}

impl ComparisonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: LockRegistry::new(),
        })
    }

    fn record_path(&self, id: &ComparisonId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    #[instrument(skip(self, comparison), fields(id = %comparison.id))]
    pub async fn save(&self, comparison: &Comparison) -> Result<()> {
        let _guard = self.locks.acquire(&comparison.id).await;
        let record = ComparisonRecord {
            schema_version: SCHEMA_VERSION,
            comparison: comparison.clone(),
        };
        let serialized = serde_json::to_string_pretty(&record)?;
        let path = self.record_path(&comparison.id);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub async fn load(&self, id: &ComparisonId) -> Result<Option<Comparison>> {
        let _guard = self.locks.acquire(id).await;
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let record: ComparisonRecord = serde_json::from_str(&contents)?;
        Ok(Some(record.comparison))
    }

    pub async fn list(&self) -> Result<Vec<ComparisonDescriptor>> {
        let mut out = Vec::new();
        if !self.dir.exists() {
            return Ok(out);
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();
        for path in entries {
            let contents = std::fs::read_to_string(&path)?;
            let record: ComparisonRecord = serde_json::from_str(&contents)?;
            out.push(describe(&record.comparison));
        }
        Ok(out)
    }

    /// Rewrites a comparison's record, dropping the detailed payload
    /// bodies for its expired side while keeping identifiers and
    /// `DocumentInfo` snapshots (§4.13 retention sweep support).
    #[instrument(skip(self))]
    pub async fn drop_payload_for_expired(&self, id: &ComparisonId) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(&path)?;
        let mut record: ComparisonRecord = serde_json::from_str(&contents)?;
        record.comparison.section_detailed_comparisons.clear();
        record.comparison.numerical_differences.clear();
        record.comparison.text_differences.clear();
        let serialized = serde_json::to_string_pretty(&record)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub async fn delete(&self, id: &ComparisonId) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let path = self.record_path(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn describe(comparison: &Comparison) -> ComparisonDescriptor {
    ComparisonDescriptor {
        id: comparison.id.clone(),
        created_at: comparison.created_at,
        mode: comparison.mode,
        filenames: comparison.document_info.iter().map(|d| d.filename.clone()).collect(),
        section_count: comparison.section_detailed_comparisons.len(),
    }
}

pub fn default_comparisons_dir(base: &Path) -> PathBuf {
    base.join("comparisons")
}

#[cfg(test)]
mod tests {
    use super::*;
    use disclosure_core::model::{ComparisonMode, DocumentInfo, DocumentType};

    fn sample_comparison(id: &str) -> Comparison {
        Comparison::new(
            id.to_string(),
            ComparisonMode::DiffAnalysisYear,
            vec![DocumentInfo {
                document_id: "d1".into(),
                filename: "d1.pdf".into(),
                document_type: DocumentType::SecuritiesReport,
                company_name: Some("Acme".into()),
                fiscal_year: Some("2024".into()),
                extraction_confidence: 1.0,
            }],
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ComparisonStore::new(dir.path()).unwrap();
        let comparison = sample_comparison("cmp-1");
        store.save(&comparison).await.unwrap();

        let loaded = store.load(&"cmp-1".to_string()).await.unwrap().unwrap();
        assert_eq!(loaded.id, comparison.id);
    }

    #[tokio::test]
    async fn list_returns_lightweight_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let store = ComparisonStore::new(dir.path()).unwrap();
        store.save(&sample_comparison("cmp-1")).await.unwrap();

        let descriptors = store.list().await.unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].filenames, vec!["d1.pdf".to_string()]);
    }

    #[tokio::test]
    async fn drop_payload_clears_bodies_but_keeps_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let store = ComparisonStore::new(dir.path()).unwrap();
        store.save(&sample_comparison("cmp-1")).await.unwrap();

        store.drop_payload_for_expired(&"cmp-1".to_string()).await.unwrap();
        let loaded = store.load(&"cmp-1".to_string()).await.unwrap().unwrap();
        assert!(loaded.section_detailed_comparisons.is_empty());
        assert_eq!(loaded.id, "cmp-1");
        assert_eq!(loaded.document_info[0].filename, "d1.pdf");
    }
}
