//! Comparison Orchestrator (§4.10): mode selection, section mapping,
//! per-section analysis with importance promotion and iterative
//! re-exploration, numerical diffing, and coarse text diffing, all
//! assembled into one `Comparison` artifact.

use super::analysis::{apply_importance_promotion, analyze_section, run_iterative_rounds, should_iterate};
use super::identify::{resolve_document_info, ManualOverride};
use super::mapping::map_sections;
use super::mode::select_mode;
use super::numeric::diff_financial_facts;
use super::textdiff::diff_text;
use crate::embedding::EmbeddingService;
use crate::error::{CoreError, Result};
use crate::llm::LlmClient;
use crate::model::{
    Comparison, ComparisonId, Document, ExtractedContent, FinancialFact, Importance,
    IterativeSearchMode, SectionDetailedComparison, SectionInfo,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

pub struct ComparisonOptions {
    pub iterative_search_mode: IterativeSearchMode,
    pub manual_overrides: HashMap<String, ManualOverride>,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            iterative_search_mode: IterativeSearchMode::Off,
            manual_overrides: HashMap::new(),
        }
    }
}

pub struct ComparisonOrchestrator {
    llm: Arc<dyn LlmClient>,
    embeddings: EmbeddingService,
}

impl ComparisonOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let embeddings = EmbeddingService::new(llm.clone());
        Self { llm, embeddings }
    }

    #[instrument(skip(self, documents, options), fields(id = %comparison_id))]
    pub async fn run(
        &self,
        comparison_id: ComparisonId,
        documents: &[Document],
        options: ComparisonOptions,
    ) -> Result<Comparison> {
        if documents.len() < 2 {
            return Err(CoreError::Input(
                "a comparison requires at least two documents".into(),
            ));
        }

        let mut document_info = Vec::with_capacity(documents.len());
        for doc in documents {
            let manual = options.manual_overrides.get(&doc.id);
            document_info.push(resolve_document_info(doc, manual, self.llm.clone()).await?);
        }

        let mode = select_mode(&document_info);
        let mut comparison = Comparison::new(comparison_id, mode, document_info);

        // Only the first two documents are paired for section-level
        // analysis; `multi_document` mode still anchors on this pair and
        // additional documents contribute identification only.
        let doc_a = &documents[0];
        let doc_b = &documents[1];
        let sections_a = sections_of(doc_a);
        let sections_b = sections_of(doc_b);

        let content_map = |sections: &HashMap<String, SectionInfo>| -> HashMap<String, Option<ExtractedContent>> {
            sections
                .iter()
                .map(|(name, info)| (name.clone(), info.content.clone()))
                .collect()
        };
        let mappings = map_sections(
            &content_map(&sections_a),
            &content_map(&sections_b),
            &self.embeddings,
        )
        .await?;
        comparison.section_mappings = mappings.clone();

        let facts_a = financial_facts_by_section(&sections_a);
        let facts_b = financial_facts_by_section(&sections_b);
        comparison.numerical_differences = diff_financial_facts(&mappings, &facts_a, &facts_b);

        let structured_text_a = doc_a
            .structured_data
            .as_ref()
            .map(|d| d.full_text())
            .unwrap_or_default();
        let structured_text_b = doc_b
            .structured_data
            .as_ref()
            .map(|d| d.full_text())
            .unwrap_or_default();

        let mut detailed = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            let info_a = sections_a.get(&mapping.doc1_section);
            let info_b = sections_b.get(&mapping.doc2_section);

            let raw_text_a = section_text(doc_a, info_a);
            let raw_text_b = section_text(doc_b, info_b);

            let mut analysis = analyze_section(
                mode,
                info_a.and_then(|i| i.content.as_ref()),
                info_b.and_then(|i| i.content.as_ref()),
                &raw_text_a,
                &raw_text_b,
                self.llm.clone(),
            )
            .await?;

            let section_diffs: Vec<_> = comparison
                .numerical_differences
                .iter()
                .filter(|d| d.section == mapping.doc1_section)
                .cloned()
                .collect();
            apply_importance_promotion(&mut analysis, mode, &section_diffs);

            let (additional_searches, has_additional_context) =
                if should_iterate(options.iterative_search_mode, analysis.importance) {
                    run_iterative_rounds(
                        &mapping.doc1_section,
                        &analysis,
                        &structured_text_a,
                        &structured_text_b,
                        self.llm.clone(),
                        &self.embeddings,
                        super::analysis::DEFAULT_MAX_ITERATIVE_ROUNDS,
                    )
                    .await?
                } else {
                    (Vec::new(), false)
                };

            let text_diff = diff_text(&raw_text_a, &raw_text_b);
            comparison.text_differences.push(text_diff);

            detailed.push(SectionDetailedComparison {
                section_name: mapping.doc1_section.clone(),
                doc1_page_range: info_a.map(|i| (i.start_page, i.end_page)).unwrap_or((0, 0)),
                doc2_page_range: info_b.map(|i| (i.start_page, i.end_page)).unwrap_or((0, 0)),
                doc1_section_name: mapping.doc1_section.clone(),
                doc2_section_name: mapping.doc2_section.clone(),
                mapping_confidence: mapping.confidence_score,
                mapping_method: mapping.mapping_method,
                text_changes: analysis.text_changes,
                numerical_changes: section_diffs,
                tone_analysis: analysis.tone_analysis,
                importance: analysis.importance,
                importance_reason: analysis.importance_reason,
                summary: analysis.summary,
                additional_searches: if additional_searches.is_empty() {
                    None
                } else {
                    Some(additional_searches)
                },
                has_additional_context,
            });
        }

        comparison.section_detailed_comparisons = detailed;
        comparison.sort_detailed_comparisons();
        comparison.recompute_priority();
        Ok(comparison)
    }
}

fn sections_of(document: &Document) -> HashMap<String, SectionInfo> {
    document
        .structured_data
        .as_ref()
        .map(|d| d.sections.clone())
        .unwrap_or_default()
}

fn financial_facts_by_section(sections: &HashMap<String, SectionInfo>) -> HashMap<String, Vec<FinancialFact>> {
    sections
        .iter()
        .filter_map(|(name, info)| info.content.as_ref().map(|c| (name.clone(), c.financial_data.clone())))
        .collect()
}

fn section_text(document: &Document, info: Option<&SectionInfo>) -> String {
    let Some(info) = info else {
        return String::new();
    };
    document
        .structured_data
        .as_ref()
        .map(|d| {
            d.pages
                .iter()
                .filter(|p| p.number >= info.start_page && p.number <= info.end_page)
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentStatus, DocumentType};
    use chrono::Utc;

    fn blank_document(id: &str) -> Document {
        Document {
            id: id.to_string(),
            filename: format!("{id}.pdf"),
            size_bytes: 0,
            uploaded_at: Utc::now(),
            retention_deadline: Utc::now(),
            document_type: DocumentType::SecuritiesReport,
            classification_reason: None,
            status: DocumentStatus::Structured,
            current_step: None,
            extraction_method: None,
            structured_data: None,
            extraction_metadata: None,
            error: None,
        }
    }

    #[test]
    fn sections_of_missing_structured_data_is_empty() {
        let doc = blank_document("a");
        assert!(sections_of(&doc).is_empty());
    }

    #[test]
    fn section_text_without_structured_data_is_empty_string() {
        let doc = blank_document("a");
        let info = SectionInfo {
            start_page: 1,
            end_page: 2,
            char_count: 0,
            confidence: 0.5,
            content: None,
        };
        assert_eq!(section_text(&doc, Some(&info)), "");
    }
}
