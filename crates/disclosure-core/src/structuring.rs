//! Structuring Orchestrator (§4.8): sequences text/vision/table
//! extraction and section detection/content extraction for one document,
//! writing status transitions after each step and preserving partial
//! results on failure.

use crate::error::Result;
use crate::extract::sections::SectionDetector;
use crate::extract::tables::TableExtractor;
use crate::extract::text::TextExtractor;
use crate::extract::vision::{outcome_stage_annotation, VisionExtractor};
use crate::extract::SectionContentExtractor;
use crate::llm::LlmClient;
use crate::model::{
    Document, DocumentStatus, DocumentTemplate, ExtractedContent, ExtractionMetadata,
    ExtractionMethod, Page, SectionInfo, StageOutcome, StructuredData,
};
use crate::template::TemplateRegistry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Distinguishes a cooperative cancel from a clean finish so `structure`
/// knows whether to promote `document.status` to `Structured` or leave it
/// at whatever the last completed stage set it to.
enum StageProgress {
    Completed,
    Cancelled,
}

pub struct StructuringOrchestrator {
    text_extractor: TextExtractor,
    vision_extractor: VisionExtractor,
    table_extractor: TableExtractor,
    section_detector: SectionDetector,
    content_extractor: SectionContentExtractor,
    templates: TemplateRegistry,
    llm: Arc<dyn LlmClient>,
}

impl StructuringOrchestrator {
    pub fn new(templates: TemplateRegistry, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            text_extractor: TextExtractor::default(),
            vision_extractor: VisionExtractor::default(),
            table_extractor: TableExtractor::default(),
            section_detector: SectionDetector::default(),
            content_extractor: SectionContentExtractor::default(),
            templates,
            llm,
        }
    }

    /// Runs the six-step sequence for `document` against its source file
    /// at `pdf_path`, returning the updated document. Idempotent callers
    /// (the job runner adapter) are expected to skip this entirely when
    /// `document.status == Structured`.
    #[instrument(skip(self, document, cancel), fields(id = %document.id))]
    pub async fn structure(
        &self,
        mut document: Document,
        pdf_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Document> {
        if document.status == DocumentStatus::Structured {
            return Ok(document);
        }
        if document.document_type == crate::model::DocumentType::Unknown {
            document.status = DocumentStatus::PendingClassification;
            return Ok(document);
        }

        document.status = DocumentStatus::Processing;
        let mut stages = HashMap::new();
        let mut vision_tokens_used = 0u64;

        let outcome = self.run_stages(&mut document, pdf_path, cancel, &mut stages, &mut vision_tokens_used).await;

        document.extraction_metadata = Some(ExtractionMetadata {
            stages,
            vision_tokens_used,
        });

        match outcome {
            // A cooperative cancel leaves `document.status` at whatever the
            // last completed stage set it to; it must never be promoted to
            // `Structured`.
            Ok(StageProgress::Cancelled) => {}
            Ok(StageProgress::Completed) => {
                document.status = DocumentStatus::Structured;
                document.error = None;
            }
            Err(e) => {
                document.status = DocumentStatus::Failed;
                document.error = Some(e.to_string());
            }
        }
        Ok(document)
    }

    async fn run_stages(
        &self,
        document: &mut Document,
        pdf_path: &Path,
        cancel: &CancellationToken,
        stages: &mut HashMap<String, StageOutcome>,
        vision_tokens_used: &mut u64,
    ) -> Result<StageProgress> {
        // Step 1: text extraction.
        document.status = DocumentStatus::ExtractingText;
        let text_outcome = self.text_extractor.extract(pdf_path)?;
        stages.insert("text_extraction".into(), StageOutcome::ok());

        let mut pages = text_outcome.pages;
        let mut extraction_method = ExtractionMethod::Text;

        // Step 2: vision fallback only when the text-quality gate failed.
        if !text_outcome.success {
            if cancel.is_cancelled() {
                self.save_partial(document, &pages, Vec::new(), HashMap::new());
                return Ok(StageProgress::Cancelled);
            }
            document.status = DocumentStatus::ExtractingVision;
            let vision_outcome = self.vision_extractor.extract(pdf_path, self.llm.clone()).await?;
            stages.insert("vision_extraction".into(), outcome_stage_annotation(&vision_outcome));
            *vision_tokens_used += vision_outcome.tokens_used;
            if vision_outcome.success {
                pages = vision_outcome.pages;
                extraction_method = if pages.is_empty() {
                    ExtractionMethod::Text
                } else {
                    ExtractionMethod::Vision
                };
            }
        }
        document.extraction_method = Some(extraction_method);

        if cancel.is_cancelled() {
            self.save_partial(document, &pages, Vec::new(), HashMap::new());
            return Ok(StageProgress::Cancelled);
        }

        // Step 3: tables, regardless of which text path succeeded.
        document.status = DocumentStatus::ExtractingTables;
        let tables = self.table_extractor.extract(pdf_path);
        stages.insert("table_extraction".into(), StageOutcome::ok());

        if cancel.is_cancelled() {
            self.save_partial(document, &pages, tables, HashMap::new());
            return Ok(StageProgress::Cancelled);
        }

        let mut sections: HashMap<String, SectionInfo> = HashMap::new();

        // Step 4: section detection, only for a known document type.
        if document.document_type != crate::model::DocumentType::Unknown {
            document.status = DocumentStatus::DetectingSections;
            let template: DocumentTemplate = self.templates.load(document.document_type.as_str());
            sections = self
                .section_detector
                .detect(&pages, &template, self.llm.clone())
                .await?;
            stages.insert("section_detection".into(), StageOutcome::ok());

            if cancel.is_cancelled() {
                self.save_partial(document, &pages, tables, sections);
                return Ok(StageProgress::Cancelled);
            }

            // Step 5: section content, only when sections were found.
            if !sections.is_empty() {
                document.status = DocumentStatus::ExtractingSectionContent;
                let inputs: HashMap<String, (SectionInfo, String)> = sections
                    .iter()
                    .map(|(name, info)| {
                        let text = section_text(&pages, info);
                        (name.clone(), (info.clone(), text))
                    })
                    .collect();
                let contents = self.content_extractor.extract_all(&inputs, self.llm.clone()).await;
                stages.insert("section_content_extraction".into(), StageOutcome::ok());
                for (name, content) in contents {
                    if let Some(info) = sections.get_mut(&name) {
                        info.content = Some(content);
                    }
                }
            }
        }

        self.save_partial(document, &pages, tables, sections);
        info!(id = %document.id, "structuring completed");
        Ok(StageProgress::Completed)
    }

    fn save_partial(
        &self,
        document: &mut Document,
        pages: &[Page],
        tables: Vec<crate::model::Table>,
        sections: HashMap<String, SectionInfo>,
    ) {
        document.structured_data = Some(StructuredData {
            pages: pages.to_vec(),
            tables,
            sections,
        });
    }
}

fn section_text(pages: &[Page], info: &SectionInfo) -> String {
    pages
        .iter()
        .filter(|p| p.number >= info.start_page && p.number <= info.end_page)
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
