//! Data model shared by the structuring and comparison pipelines (§3).
//!
//! Every type here is `serde`-round-trippable: these are exactly the
//! records that get written to disk by the metadata and comparison
//! stores, and exactly the records a UI or CLI renders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable opaque document identifier.
pub type DocumentId = String;

/// Stable opaque comparison identifier.
pub type ComparisonId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Queued,
    Processing,
    PendingClassification,
    ExtractingText,
    ExtractingVision,
    ExtractingTables,
    DetectingSections,
    ExtractingSectionContent,
    Structured,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Text,
    Vision,
    Hybrid,
}

/// One of the four supported disclosure document types, or `Unknown`
/// while classification is pending/overridden away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    SecuritiesReport,
    EarningsReport,
    IntegratedReport,
    FinancialStatements,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::SecuritiesReport => "securities_report",
            DocumentType::EarningsReport => "earnings_report",
            DocumentType::IntegratedReport => "integrated_report",
            DocumentType::FinancialStatements => "financial_statements",
            DocumentType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> DocumentType {
        match s {
            "securities_report" => DocumentType::SecuritiesReport,
            "earnings_report" => DocumentType::EarningsReport,
            "integrated_report" => DocumentType::IntegratedReport,
            "financial_statements" => DocumentType::FinancialStatements,
            _ => DocumentType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub filename: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub retention_deadline: DateTime<Utc>,
    pub document_type: DocumentType,
    pub classification_reason: Option<String>,
    pub status: DocumentStatus,
    pub current_step: Option<String>,
    pub extraction_method: Option<ExtractionMethod>,
    pub structured_data: Option<StructuredData>,
    pub extraction_metadata: Option<ExtractionMetadata>,
    pub error: Option<String>,
}

impl Document {
    pub fn new(id: DocumentId, filename: String, size_bytes: u64, retention_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename,
            size_bytes,
            uploaded_at: now,
            retention_deadline: now + chrono::Duration::hours(retention_hours),
            document_type: DocumentType::Unknown,
            classification_reason: None,
            status: DocumentStatus::Queued,
            current_step: None,
            extraction_method: None,
            structured_data: None,
            extraction_metadata: None,
            error: None,
        }
    }

    /// Invariant from §3: a document with status `structured` must carry a
    /// non-empty `StructuredData`, and a document whose type is `unknown`
    /// must never be `structured`.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status == DocumentStatus::Structured {
            if self.structured_data.is_none() {
                return Err("structured document missing StructuredData".into());
            }
            if self.document_type == DocumentType::Unknown {
                return Err("unknown-typed document cannot be structured".into());
            }
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.retention_deadline <= now
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Per-stage success/failure annotations, keyed by stage name
    /// (`text_extraction`, `vision_extraction`, `table_extraction`,
    /// `section_detection`, `section_content_extraction`).
    pub stages: HashMap<String, StageOutcome>,
    pub vision_tokens_used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
    pub char_count: usize,
    pub has_images: bool,
}

impl Page {
    pub fn new(number: u32, text: String, has_images: bool) -> Self {
        let char_count = text.chars().count();
        Self {
            number,
            text,
            char_count,
            has_images,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub page: u32,
    pub index_on_page: usize,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Each row, keyed by header cell (best-effort; ragged rows keep what
    /// they have).
    pub rows_as_records: Vec<HashMap<String, String>>,
    pub row_count: usize,
    pub column_count: usize,
    pub is_numerical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionInfo {
    pub start_page: u32,
    pub end_page: u32,
    pub char_count: usize,
    pub confidence: f32,
    pub content: Option<ExtractedContent>,
}

/// A scalar or a nested period -> scalar mapping, exactly as the source
/// text expressed it. No bucket ever computes a derived value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueOrMap {
    Scalar(String),
    Map(HashMap<String, String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialFact {
    pub item: String,
    pub value: ValueOrMap,
    pub unit: Option<String>,
    pub period: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingNote {
    pub topic: String,
    pub content: String,
    #[serde(rename = "type")]
    pub note_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactualInfo {
    pub category: String,
    pub item: String,
    pub value: ValueOrMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: String,
    pub content: String,
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub financial_data: Vec<FinancialFact>,
    pub accounting_notes: Vec<AccountingNote>,
    pub factual_info: Vec<FactualInfo>,
    pub messages: Vec<Message>,
}

impl ExtractedContent {
    pub fn is_empty(&self) -> bool {
        self.financial_data.is_empty()
            && self.accounting_notes.is_empty()
            && self.factual_info.is_empty()
            && self.messages.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredData {
    pub pages: Vec<Page>,
    pub tables: Vec<Table>,
    pub sections: HashMap<String, SectionInfo>,
}

impl StructuredData {
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn total_pages(&self) -> u32 {
        self.pages.len() as u32
    }

    /// §8: page numbers must be 1..N dense and strictly increasing.
    pub fn pages_are_dense(&self) -> bool {
        self.pages
            .iter()
            .enumerate()
            .all(|(i, p)| p.number == (i as u32) + 1)
    }
}

// ---- Template Registry types (§4.1, §6 schema) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub alternative_names: Vec<String>,
    #[serde(default)]
    pub subsections: Vec<TemplateSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTemplate {
    pub document_type: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<TemplateSection>,
    #[serde(default)]
    pub important_sections: Vec<String>,
    #[serde(default)]
    pub keywords_for_detection: Vec<String>,
}

impl DocumentTemplate {
    /// The degenerate template returned for an unrecognized document type.
    pub fn empty(document_type: &str) -> Self {
        Self {
            document_type: document_type.to_string(),
            display_name: document_type.to_string(),
            description: String::new(),
            sections: Vec::new(),
            important_sections: Vec::new(),
            keywords_for_detection: Vec::new(),
        }
    }
}

// ---- Comparison types (§3, §4.10) ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    ConsistencyCheck,
    DiffAnalysisYear,
    DiffAnalysisCompany,
    MultiDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMethod {
    Exact,
    Embedding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterativeSearchMode {
    Off,
    HighOnly,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: DocumentId,
    pub filename: String,
    pub document_type: DocumentType,
    pub company_name: Option<String>,
    pub fiscal_year: Option<String>,
    pub extraction_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMapping {
    pub doc1_section: String,
    pub doc2_section: String,
    pub confidence_score: f32,
    pub mapping_method: MappingMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericalDifference {
    pub section: String,
    pub item_name: String,
    pub value1: f64,
    pub value2: f64,
    pub difference: f64,
    pub difference_pct: Option<f64>,
    pub unit1: Option<String>,
    pub unit2: Option<String>,
    pub normalized_unit: Option<String>,
    pub is_significant: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextDifferences {
    pub added_text: Vec<String>,
    pub removed_text: Vec<String>,
    pub changed_text: Vec<String>,
    pub match_ratio: f32,
}

/// Mode-dependent narrative diff payload (§4.6, §4.10). Only the fields
/// relevant to the comparison's mode are populated by the analysis stage;
/// the others default empty so a single struct can serialize every mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextChanges {
    #[serde(default)]
    pub contradictions: Vec<String>,
    #[serde(default)]
    pub normal_differences: Vec<String>,
    #[serde(default)]
    pub complementary_info: Vec<String>,
    pub consistency_score: Option<u8>,
    pub consistency_reason: Option<String>,

    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<ModifiedItem>,

    #[serde(default)]
    pub only_in_company1: Vec<String>,
    #[serde(default)]
    pub only_in_company2: Vec<String>,
    #[serde(default)]
    pub different_approaches: Vec<DifferentApproach>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedItem {
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifferentApproach {
    pub aspect: String,
    pub company1_approach: String,
    pub company2_approach: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRound {
    pub iteration: u32,
    pub search_keywords: Vec<String>,
    pub found_sections: Vec<String>,
    pub analysis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDetailedComparison {
    pub section_name: String,
    pub doc1_page_range: (u32, u32),
    pub doc2_page_range: (u32, u32),
    pub doc1_section_name: String,
    pub doc2_section_name: String,
    pub mapping_confidence: f32,
    pub mapping_method: MappingMethod,
    pub text_changes: TextChanges,
    pub numerical_changes: Vec<NumericalDifference>,
    pub tone_analysis: Option<String>,
    pub importance: Importance,
    pub importance_reason: String,
    pub summary: String,
    pub additional_searches: Option<Vec<SearchRound>>,
    pub has_additional_context: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub status: ProgressStatus,
    pub progress: u8,
    pub step: String,
    pub current_section: Option<String>,
    pub total_sections: Option<u32>,
    pub completed_sections: Option<u32>,
    pub error: Option<String>,
}

impl Progress {
    pub fn queued(step: impl Into<String>) -> Self {
        Self {
            status: ProgressStatus::Queued,
            progress: 0,
            step: step.into(),
            current_section: None,
            total_sections: None,
            completed_sections: None,
            error: None,
        }
    }

    /// §8: `progress` must never decrease, and `status` must never
    /// regress, unless the new status is `Failed`.
    pub fn apply_update(&mut self, next: Progress) {
        if next.status == ProgressStatus::Failed {
            *self = next;
            return;
        }
        if next.progress >= self.progress {
            self.progress = next.progress;
        }
        if status_rank(next.status) >= status_rank(self.status) {
            self.status = next.status;
        }
        self.step = next.step;
        self.current_section = next.current_section;
        self.total_sections = next.total_sections;
        self.completed_sections = next.completed_sections;
        self.error = next.error;
    }
}

fn status_rank(status: ProgressStatus) -> u8 {
    match status {
        ProgressStatus::Queued => 0,
        ProgressStatus::Running => 1,
        ProgressStatus::Completed => 2,
        ProgressStatus::Failed => 3,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub id: ComparisonId,
    pub mode: ComparisonMode,
    pub document_ids: Vec<DocumentId>,
    pub document_info: Vec<DocumentInfo>,
    pub section_mappings: Vec<SectionMapping>,
    pub numerical_differences: Vec<NumericalDifference>,
    pub text_differences: Vec<TextDifferences>,
    pub section_detailed_comparisons: Vec<SectionDetailedComparison>,
    pub priority: Importance,
    pub created_at: DateTime<Utc>,
    pub progress: Progress,
}

impl Comparison {
    pub fn new(id: ComparisonId, mode: ComparisonMode, document_info: Vec<DocumentInfo>) -> Self {
        Self {
            id,
            mode,
            document_ids: document_info.iter().map(|d| d.document_id.clone()).collect(),
            document_info,
            section_mappings: Vec::new(),
            numerical_differences: Vec::new(),
            text_differences: Vec::new(),
            section_detailed_comparisons: Vec::new(),
            priority: Importance::Low,
            created_at: Utc::now(),
            progress: Progress::queued("queued"),
        }
    }

    /// §5: sort the final artifact's detailed comparisons by doc1 page
    /// range ascending, for deterministic presentation.
    pub fn sort_detailed_comparisons(&mut self) {
        self.section_detailed_comparisons
            .sort_by_key(|c| c.doc1_page_range);
    }

    /// Highest importance among detailed comparisons, used for the
    /// artifact-level `priority` tag.
    pub fn recompute_priority(&mut self) {
        self.priority = self
            .section_detailed_comparisons
            .iter()
            .map(|c| c.importance)
            .max_by_key(|i| match i {
                Importance::High => 2,
                Importance::Medium => 1,
                Importance::Low => 0,
            })
            .unwrap_or(Importance::Low);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_invariant_rejects_structured_without_payload() {
        let mut doc = Document::new("d1".into(), "f.pdf".into(), 100, 24);
        doc.status = DocumentStatus::Structured;
        doc.document_type = DocumentType::SecuritiesReport;
        assert!(doc.check_invariants().is_err());
    }

    #[test]
    fn document_invariant_rejects_unknown_structured() {
        let mut doc = Document::new("d1".into(), "f.pdf".into(), 100, 24);
        doc.status = DocumentStatus::Structured;
        doc.structured_data = Some(StructuredData::default());
        assert!(doc.check_invariants().is_err());
    }

    #[test]
    fn document_invariant_accepts_valid_structured() {
        let mut doc = Document::new("d1".into(), "f.pdf".into(), 100, 24);
        doc.status = DocumentStatus::Structured;
        doc.document_type = DocumentType::SecuritiesReport;
        doc.structured_data = Some(StructuredData {
            pages: vec![Page::new(1, "x".into(), false)],
            ..Default::default()
        });
        assert!(doc.check_invariants().is_ok());
    }

    #[test]
    fn progress_never_regresses_unless_failed() {
        let mut p = Progress::queued("start");
        p.apply_update(Progress {
            status: ProgressStatus::Running,
            progress: 50,
            step: "halfway".into(),
            current_section: None,
            total_sections: None,
            completed_sections: None,
            error: None,
        });
        assert_eq!(p.progress, 50);

        p.apply_update(Progress {
            status: ProgressStatus::Running,
            progress: 10,
            step: "should not regress".into(),
            current_section: None,
            total_sections: None,
            completed_sections: None,
            error: None,
        });
        assert_eq!(p.progress, 50);

        p.apply_update(Progress {
            status: ProgressStatus::Failed,
            progress: 10,
            step: "failure".into(),
            current_section: None,
            total_sections: None,
            completed_sections: None,
            error: Some("boom".into()),
        });
        assert_eq!(p.status, ProgressStatus::Failed);
        assert_eq!(p.progress, 10);
    }

    #[test]
    fn pages_dense_check() {
        let mut data = StructuredData::default();
        data.pages = vec![Page::new(1, "a".into(), false), Page::new(2, "b".into(), false)];
        assert!(data.pages_are_dense());
        data.pages.push(Page::new(4, "c".into(), false));
        assert!(!data.pages_are_dense());
    }
}
