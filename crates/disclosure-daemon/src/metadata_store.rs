//! Metadata Store (§4.7): file-backed `Document` records, one file per
//! document, individually rewritable so concurrent updates to different
//! documents never contend.

use crate::locks::LockRegistry;
use chrono::{DateTime, Utc};
use disclosure_core::error::{CoreError, Result};
use disclosure_core::model::{
    Document, DocumentId, DocumentStatus, ExtractionMetadata, ExtractionMethod, StructuredData,
};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Bumped whenever the on-disk `Document` shape changes incompatibly.
const SCHEMA_VERSION: u32 = 1;

/// What lives at a document's record path: either the document itself,
/// or a tombstone left by the retention sweeper so `load` can still tell
/// "expired" apart from "never existed" after the sweep deletes the PDF
/// and `StructuredData`.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StoredRecord {
    Document { schema_version: u32, document: Document },
    Expired { schema_version: u32, expired_at: DateTime<Utc> },
}

pub struct MetadataStore {
    dir: PathBuf,
    locks: LockRegistry,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: LockRegistry::new(),
        })
    }

    fn record_path(&self, id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    #[instrument(skip(self, document), fields(id = %document.id))]
    pub async fn create(&self, document: Document) -> Result<()> {
        let _guard = self.locks.acquire(&document.id).await;
        self.write_record(&document)
    }

    #[instrument(skip(self))]
    pub async fn load(&self, id: &DocumentId) -> Result<Option<Document>> {
        let _guard = self.locks.acquire(id).await;
        match self.read_stored(id)? {
            None => Ok(None),
            Some(StoredRecord::Document { document, .. }) => Ok(Some(document)),
            Some(StoredRecord::Expired { .. }) => Err(CoreError::RetentionExpired(id.clone())),
        }
    }

    pub async fn list(&self) -> Result<Vec<Document>> {
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
            if let StoredRecord::Document { document, .. } = serde_json::from_str(&contents)? {
                out.push(document);
            }
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: &DocumentId,
        status: DocumentStatus,
        step: Option<String>,
    ) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut document = self
            .read_record(id)?
            .ok_or_else(|| CoreError::Input(format!("no such document: {id}")))?;
        document.status = status;
        document.current_step = step;
        self.write_record(&document)
    }

    #[instrument(skip(self, payload, metadata))]
    pub async fn save_structured(
        &self,
        id: &DocumentId,
        payload: StructuredData,
        method: ExtractionMethod,
        metadata: ExtractionMetadata,
    ) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut document = self
            .read_record(id)?
            .ok_or_else(|| CoreError::Input(format!("no such document: {id}")))?;
        document.structured_data = Some(payload);
        document.extraction_method = Some(method);
        document.extraction_metadata = Some(metadata);
        document.status = DocumentStatus::Structured;
        document
            .check_invariants()
            .map_err(|e| CoreError::Extraction {
                stage: "save_structured".into(),
                message: e,
            })?;
        self.write_record(&document)
    }

    /// Persists structured data gathered before a cooperative cancel or a
    /// mid-pipeline failure, preserving `status`/`current_step` as set by
    /// the orchestrator rather than forcing `Structured`.
    #[instrument(skip(self, payload, metadata))]
    pub async fn save_partial(
        &self,
        id: &DocumentId,
        payload: StructuredData,
        method: Option<ExtractionMethod>,
        metadata: ExtractionMetadata,
        status: DocumentStatus,
        current_step: Option<String>,
    ) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let mut document = self
            .read_record(id)?
            .ok_or_else(|| CoreError::Input(format!("no such document: {id}")))?;
        document.structured_data = Some(payload);
        document.extraction_method = method;
        document.extraction_metadata = Some(metadata);
        document.status = status;
        document.current_step = current_step;
        self.write_record(&document)
    }

    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<DocumentId>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|d| d.is_expired(now))
            .map(|d| d.id)
            .collect())
    }

    /// Replaces a swept document's record with a tombstone, so a later
    /// `load` returns a typed `RetentionExpired` failure rather than
    /// `Ok(None)`, distinguishing "expired" from "never existed".
    #[instrument(skip(self))]
    pub async fn mark_expired(&self, id: &DocumentId, expired_at: DateTime<Utc>) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let record = StoredRecord::Expired {
            schema_version: SCHEMA_VERSION,
            expired_at,
        };
        self.write_stored(id, &record)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &DocumentId) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let path = self.record_path(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn read_record(&self, id: &DocumentId) -> Result<Option<Document>> {
        match self.read_stored(id)? {
            Some(StoredRecord::Document { document, .. }) => Ok(Some(document)),
            Some(StoredRecord::Expired { .. }) | None => Ok(None),
        }
    }

    fn read_stored(&self, id: &DocumentId) -> Result<Option<StoredRecord>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write_record(&self, document: &Document) -> Result<()> {
        let record = StoredRecord::Document {
            schema_version: SCHEMA_VERSION,
            document: document.clone(),
        };
        self.write_stored(&document.id, &record)
    }

    fn write_stored(&self, id: &DocumentId, record: &StoredRecord) -> Result<()> {
        let serialized = serde_json::to_string_pretty(record)?;
        let path = self.record_path(id);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

pub fn default_documents_dir(base: &Path) -> PathBuf {
    base.join("documents")
}

#[cfg(test)]
mod tests {
    use super::*;
    use disclosure_core::model::DocumentType;

    fn new_document(id: &str) -> Document {
        Document::new(id.to_string(), format!("{id}.pdf"), 100, 24)
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path()).unwrap();
        let document = new_document("doc-1");
        store.create(document.clone()).await.unwrap();

        let loaded = store.load(&"doc-1".to_string()).await.unwrap().unwrap();
        assert_eq!(loaded.id, document.id);
        assert_eq!(loaded.filename, document.filename);
    }

    #[tokio::test]
    async fn update_status_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path()).unwrap();
        store.create(new_document("doc-1")).await.unwrap();

        store
            .update_status(&"doc-1".to_string(), DocumentStatus::ExtractingText, Some("text".into()))
            .await
            .unwrap();

        let loaded = store.load(&"doc-1".to_string()).await.unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::ExtractingText);
        assert_eq!(loaded.current_step.as_deref(), Some("text"));
    }

    #[tokio::test]
    async fn list_returns_every_record_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path()).unwrap();
        store.create(new_document("b")).await.unwrap();
        store.create(new_document("a")).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert_eq!(all[1].id, "b");
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path()).unwrap();
        store.create(new_document("doc-1")).await.unwrap();
        store.delete(&"doc-1".to_string()).await.unwrap();
        assert!(store.load(&"doc-1".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_expired_distinguishes_swept_from_never_existed() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path()).unwrap();
        store.create(new_document("doc-1")).await.unwrap();
        store.mark_expired(&"doc-1".to_string(), Utc::now()).await.unwrap();

        let swept = store.load(&"doc-1".to_string()).await;
        assert!(matches!(swept, Err(CoreError::RetentionExpired(id)) if id == "doc-1"));

        let never_existed = store.load(&"no-such-doc".to_string()).await.unwrap();
        assert!(never_existed.is_none());
    }

    #[tokio::test]
    async fn save_structured_on_unknown_type_document_fails_invariant() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path()).unwrap();
        let mut document = new_document("doc-1");
        document.document_type = DocumentType::Unknown;
        store.create(document).await.unwrap();

        let result = store
            .save_structured(
                &"doc-1".to_string(),
                StructuredData::default(),
                ExtractionMethod::Text,
                ExtractionMetadata::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
