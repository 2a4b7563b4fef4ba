//! Retention Sweeper (§4.13): on a configurable cadence, deletes source
//! PDFs and `StructuredData` for expired documents, leaving a tombstone
//! in place of the document record so a later `load` can report
//! `RetentionExpired` rather than "not found", and trims comparisons
//! down to identifiers once every document they reference has expired.

use crate::comparison_store::ComparisonStore;
use crate::metadata_store::MetadataStore;
use chrono::Utc;
use disclosure_core::error::Result;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

pub struct RetentionSweeper {
    metadata: MetadataStore,
    comparisons: ComparisonStore,
    pdfs_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub documents_deleted: usize,
    pub comparisons_deleted: usize,
    pub comparisons_trimmed: usize,
}

impl RetentionSweeper {
    pub fn new(metadata: MetadataStore, comparisons: ComparisonStore, pdfs_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata,
            comparisons,
            pdfs_dir: pdfs_dir.into(),
        }
    }

    /// Runs one sweep pass. Expired documents have their source PDF
    /// removed and their record replaced with a tombstone; comparisons
    /// referencing only expired documents are deleted, while comparisons
    /// with at least one surviving document are trimmed in place.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let expired = self.metadata.list_expired(now).await?;
        if expired.is_empty() {
            return Ok(SweepReport::default());
        }
        info!(count = expired.len(), "sweeping expired documents");

        let mut report = SweepReport::default();
        let expired_set: std::collections::HashSet<_> = expired.iter().cloned().collect();

        for id in &expired {
            let pdf_path = self.pdfs_dir.join(format!("{id}.pdf"));
            if pdf_path.exists() {
                if let Err(err) = std::fs::remove_file(&pdf_path) {
                    warn!(%id, error = %err, "failed to delete source pdf");
                }
            }
            self.metadata.mark_expired(id, now).await?;
            report.documents_deleted += 1;
        }

        for descriptor in self.comparisons.list().await? {
            let Some(comparison) = self.comparisons.load(&descriptor.id).await? else {
                continue;
            };
            let all_expired = comparison
                .document_ids
                .iter()
                .all(|doc_id| expired_set.contains(doc_id));
            let any_expired = comparison
                .document_ids
                .iter()
                .any(|doc_id| expired_set.contains(doc_id));

            if all_expired {
                self.comparisons.delete(&descriptor.id).await?;
                report.comparisons_deleted += 1;
            } else if any_expired {
                self.comparisons.drop_payload_for_expired(&descriptor.id).await?;
                report.comparisons_trimmed += 1;
            }
        }

        Ok(report)
    }
}
