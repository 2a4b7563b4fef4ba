//! Job Runner Adapter / Classifier Adapter (§6): the trait boundaries
//! between this library and whatever background job runner and
//! classifier live in the host process.

use crate::error::Result;
use crate::model::{ComparisonId, DocumentId, DocumentType, IterativeSearchMode};
use async_trait::async_trait;

/// Entry points the core exposes to an external worker process with
/// crash-restart semantics. Both methods are idempotent on re-entry:
/// the orchestrator reads the current persisted status and continues
/// from the next stage rather than restarting.
#[async_trait]
pub trait JobRunnerAdapter: Send + Sync {
    /// Structures one document. Returns immediately if already `structured`.
    async fn structure_document(&self, document_id: DocumentId) -> Result<()>;

    /// Runs one comparison across `document_ids`.
    async fn run_comparison(
        &self,
        comparison_id: ComparisonId,
        document_ids: Vec<DocumentId>,
        iterative_mode: IterativeSearchMode,
        options: ComparisonRunOptions,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonRunOptions {
    pub force_recompute: bool,
}

/// Stands in for the keyword-plus-single-LLM-call classifier that
/// assigns a `DocumentType` at upload time.
#[async_trait]
pub trait ClassifierAdapter: Send + Sync {
    async fn classify(&self, text: &str) -> Result<(DocumentType, String)>;
}

/// Keyword-then-LLM classifier: each template's
/// `keywords_for_detection` is checked against the document's opening
/// text before falling back to a single LLM call when
/// `classification_uses_llm` is enabled and no keyword set matched.
pub struct KeywordThenLlmClassifier {
    templates: crate::template::TemplateRegistry,
    llm: std::sync::Arc<dyn crate::llm::LlmClient>,
    use_llm: bool,
    max_prompt_chars: usize,
}

impl KeywordThenLlmClassifier {
    pub fn new(
        templates: crate::template::TemplateRegistry,
        llm: std::sync::Arc<dyn crate::llm::LlmClient>,
        use_llm: bool,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            templates,
            llm,
            use_llm,
            max_prompt_chars,
        }
    }

    fn classify_by_keywords(&self, text: &str) -> Option<(DocumentType, String)> {
        let lower = text.to_lowercase();
        for doc_type in self.templates.list_types() {
            let template = self.templates.load(&doc_type);
            let hits: Vec<&String> = template
                .keywords_for_detection
                .iter()
                .filter(|k| lower.contains(&k.to_lowercase()))
                .collect();
            if !hits.is_empty() {
                return Some((
                    DocumentType::parse(&doc_type),
                    format!("matched keywords: {hits:?}", hits = hits),
                ));
            }
        }
        None
    }
}

#[async_trait]
impl ClassifierAdapter for KeywordThenLlmClassifier {
    async fn classify(&self, text: &str) -> Result<(DocumentType, String)> {
        if let Some(hit) = self.classify_by_keywords(text) {
            return Ok(hit);
        }
        if !self.use_llm {
            return Ok((DocumentType::Unknown, "no keyword match, LLM classification disabled".into()));
        }

        let excerpt: String = text.chars().take(self.max_prompt_chars).collect();
        let outcome = crate::llm::call_with_single_retry("classification", || {
            let llm = self.llm.clone();
            let messages = vec![
                crate::llm::ChatMessage::system(
                    "Classify this disclosure document into one of: securities_report, \
                     earnings_report, integrated_report, financial_statements, or unknown. \
                     Respond with JSON only: {\"document_type\": string, \"reason\": string}.",
                ),
                crate::llm::ChatMessage::user(excerpt.clone()),
            ];
            async move { llm.chat(messages, 128).await }
        })
        .await;

        match outcome {
            Ok(chat) => {
                #[derive(serde::Deserialize)]
                struct Resp {
                    document_type: String,
                    reason: String,
                }
                match serde_json::from_str::<Resp>(&chat.content) {
                    Ok(resp) => Ok((DocumentType::parse(&resp.document_type), resp.reason)),
                    Err(_) => Ok((DocumentType::Unknown, "malformed classification response".into())),
                }
            }
            Err(e) => Ok((DocumentType::Unknown, format!("classification call failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatOutcome, LlmClient};
    use crate::model::DocumentTemplate;

    struct NeverCalledClient;

    #[async_trait]
    impl LlmClient for NeverCalledClient {
        async fn chat(&self, _messages: Vec<ChatMessage>, _max_tokens: usize) -> Result<ChatOutcome> {
            panic!("classify_by_keywords must not reach the LLM client");
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            panic!("classify_by_keywords must not reach the LLM client");
        }
    }

    #[test]
    fn keyword_classifier_matches_on_template_keywords() {
        let mut template = DocumentTemplate::empty("securities_report");
        template.keywords_for_detection = vec!["有価証券報告書".to_string()];
        let registry = crate::template::TemplateRegistry::from_templates(vec![template]);
        let classifier = KeywordThenLlmClassifier::new(registry, std::sync::Arc::new(NeverCalledClient), false, 4000);
        let hit = classifier.classify_by_keywords("this is a 有価証券報告書 filing");
        assert_eq!(hit.unwrap().0, DocumentType::SecuritiesReport);
    }
}
