//! Concrete `JobRunnerAdapter` wiring the file-backed stores
//! (`disclosure-daemon`) to the structuring/comparison orchestrators
//! (`disclosure-core`). This is what a real background job runner would
//! call into; the CLI subcommands invoke it directly in-process.

use anyhow::{bail, Context, Result};
use disclosure_core::model::{
    ComparisonId, DocumentId, DocumentStatus, IterativeSearchMode, Progress, ProgressStatus,
};
use disclosure_core::{
    ComparisonOptions, ComparisonOrchestrator, ComparisonRunOptions, CoreError, JobRunnerAdapter,
    LlmClient, StructuringOrchestrator, TemplateRegistry,
};
use disclosure_daemon::{ComparisonStore, MetadataStore, ProgressReporter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct DiskJobRunner {
    pub metadata: MetadataStore,
    pub comparisons: ComparisonStore,
    pub progress: ProgressReporter,
    pub structuring: StructuringOrchestrator,
    pub comparator: ComparisonOrchestrator,
    pub pdfs_dir: PathBuf,
}

impl DiskJobRunner {
    pub fn new(base_dir: PathBuf, templates: TemplateRegistry, llm: Arc<dyn LlmClient>) -> Result<Self> {
        let metadata = MetadataStore::new(disclosure_daemon::metadata_store::default_documents_dir(&base_dir))?;
        let comparisons = ComparisonStore::new(disclosure_daemon::comparison_store::default_comparisons_dir(&base_dir))?;
        let progress = ProgressReporter::new(base_dir.join("progress"))?;
        let pdfs_dir = base_dir.join("pdfs");
        std::fs::create_dir_all(&pdfs_dir)?;
        Ok(Self {
            metadata,
            comparisons,
            progress,
            structuring: StructuringOrchestrator::new(templates, llm.clone()),
            comparator: ComparisonOrchestrator::new(llm),
            pdfs_dir,
        })
    }

    pub fn pdf_path(&self, document_id: &DocumentId) -> PathBuf {
        self.pdfs_dir.join(format!("{document_id}.pdf"))
    }
}

#[async_trait::async_trait]
impl JobRunnerAdapter for DiskJobRunner {
    async fn structure_document(&self, document_id: DocumentId) -> Result<(), CoreError> {
        let document = self
            .metadata
            .load(&document_id)
            .await?
            .ok_or_else(|| CoreError::Input(format!("no such document: {document_id}")))?;
        if document.status == DocumentStatus::Structured {
            return Ok(());
        }

        let pdf_path = self.pdf_path(&document_id);
        let cancel = CancellationToken::new();
        let structured = self.structuring.structure(document, &pdf_path, &cancel).await?;

        let is_structured = structured.status == DocumentStatus::Structured;
        match (
            is_structured,
            structured.structured_data.clone(),
            structured.extraction_metadata.clone(),
        ) {
            // Fully structured: promote to `Structured` (`save_structured`
            // enforces the model invariant that this status carries data).
            (true, Some(payload), Some(metadata)) => {
                let method = structured
                    .extraction_method
                    .ok_or_else(|| CoreError::Input("structured document missing extraction_method".into()))?;
                self.metadata
                    .save_structured(&document_id, payload, method, metadata)
                    .await?;
            }
            // Cancelled or failed partway: keep whatever stage the
            // orchestrator left `status` at, never promoting to `Structured`.
            (false, Some(payload), Some(metadata)) => {
                self.metadata
                    .save_partial(
                        &document_id,
                        payload,
                        structured.extraction_method,
                        metadata,
                        structured.status,
                        structured.current_step.clone(),
                    )
                    .await?;
            }
            _ => {
                self.metadata
                    .update_status(&document_id, structured.status, structured.current_step.clone())
                    .await?;
            }
        }

        let key = format!("document:{document_id}");
        let progress_update = if structured.status == DocumentStatus::Failed {
            Progress {
                status: ProgressStatus::Failed,
                progress: 0,
                step: structured.current_step.clone().unwrap_or_else(|| "failed".into()),
                current_section: None,
                total_sections: None,
                completed_sections: None,
                error: structured.error.clone(),
            }
        } else {
            Progress {
                status: if is_structured { ProgressStatus::Completed } else { ProgressStatus::Running },
                progress: if is_structured { 100 } else { 50 },
                step: structured.current_step.clone().unwrap_or_else(|| "processing".into()),
                current_section: None,
                total_sections: None,
                completed_sections: None,
                error: None,
            }
        };
        self.progress.update(&key, progress_update).await.map_err(|e| {
            CoreError::Extraction {
                stage: "progress_update".into(),
                message: e.to_string(),
            }
        })?;

        info!(%document_id, "structuring complete");
        Ok(())
    }

    async fn run_comparison(
        &self,
        comparison_id: ComparisonId,
        document_ids: Vec<DocumentId>,
        iterative_mode: IterativeSearchMode,
        _options: ComparisonRunOptions,
    ) -> Result<(), CoreError> {
        if let Some(existing) = self.comparisons.load(&comparison_id).await? {
            if !existing.section_detailed_comparisons.is_empty() {
                return Ok(());
            }
        }

        let mut documents = Vec::with_capacity(document_ids.len());
        for id in &document_ids {
            let doc = self
                .metadata
                .load(id)
                .await?
                .ok_or_else(|| CoreError::Input(format!("no such document: {id}")))?;
            documents.push(doc);
        }

        let options = ComparisonOptions {
            iterative_search_mode: iterative_mode,
            ..Default::default()
        };
        let comparison = self.comparator.run(comparison_id.clone(), &documents, options).await?;
        self.comparisons.save(&comparison).await?;

        let key = format!("comparison:{comparison_id}");
        self.progress
            .update(
                &key,
                Progress {
                    status: ProgressStatus::Completed,
                    progress: 100,
                    step: "done".into(),
                    current_section: None,
                    total_sections: Some(comparison.section_detailed_comparisons.len() as u32),
                    completed_sections: Some(comparison.section_detailed_comparisons.len() as u32),
                    error: None,
                },
            )
            .await
            .map_err(|e| CoreError::Extraction {
                stage: "progress_update".into(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Registers a newly uploaded PDF: copies it into the runner's storage
/// directory and creates its `Document` record.
pub async fn ingest_pdf(runner: &DiskJobRunner, source: &std::path::Path, retention_hours: i64) -> Result<DocumentId> {
    if !source.exists() {
        bail!("no such file: {}", source.display());
    }
    let size_bytes = std::fs::metadata(source)?.len();
    let filename = source
        .file_name()
        .context("source path has no filename")?
        .to_string_lossy()
        .to_string();
    let document_id = uuid::Uuid::new_v4().to_string();
    let document = disclosure_core::model::Document::new(document_id.clone(), filename, size_bytes, retention_hours);

    std::fs::copy(source, runner.pdf_path(&document_id))?;
    runner.metadata.create(document).await?;
    Ok(document_id)
}
