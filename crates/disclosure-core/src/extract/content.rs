//! Section Content Extractor (§4.6): turns one section's page text into
//! the four verbatim content buckets (financial data, accounting notes,
//! factual info, messages).

use crate::error::Result;
use crate::llm::{call_with_single_retry, ChatMessage, LlmClient};
use crate::model::{ExtractedContent, SectionInfo};
use crate::pool::WorkerPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

pub const DEFAULT_POOL_WIDTH: usize = 3;
pub const CAP_CHARS: usize = 10_000;
const ELISION_MARKER: &str = "\n... [elided] ...\n";

const SYSTEM_PROMPT: &str = "You extract content from one section of a \
corporate disclosure document, verbatim. Never compute derived figures \
(no CAGR, no year-over-year percentages, no composition percentages) and \
never interpret or summarize. Quote units and periods exactly as written. \
Respond with JSON only: {\"financial_data\": [...], \"accounting_notes\": \
[...], \"factual_info\": [...], \"messages\": [...]}, using empty arrays \
for buckets with nothing to report.";

pub struct SectionContentExtractor {
    pool: WorkerPool,
}

impl Default for SectionContentExtractor {
    fn default() -> Self {
        Self {
            pool: WorkerPool::new(DEFAULT_POOL_WIDTH),
        }
    }
}

impl SectionContentExtractor {
    pub fn new(pool_width: usize) -> Self {
        Self {
            pool: WorkerPool::new(pool_width),
        }
    }

    /// Extracts content for every section concurrently (bounded by the
    /// pool width), returning a map with exactly the input's keys.
    #[instrument(skip(self, sections, llm))]
    pub async fn extract_all(
        &self,
        sections: &HashMap<String, (SectionInfo, String)>,
        llm: Arc<dyn LlmClient>,
    ) -> HashMap<String, ExtractedContent> {
        let jobs: Vec<_> = sections
            .iter()
            .map(|(name, (_, text))| {
                let name = name.clone();
                let text = cap_text(text);
                let llm = llm.clone();
                move || async move {
                    let content = extract_one(&name, &text, llm).await;
                    (name, content)
                }
            })
            .collect();

        self.pool.run_all(jobs).await.into_iter().collect()
    }
}

/// Caps concatenated section text at `CAP_CHARS`, keeping the head and
/// tail and eliding the middle when longer (§4.6).
fn cap_text(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= CAP_CHARS {
        return text.to_string();
    }
    let half = CAP_CHARS / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!("{head}{ELISION_MARKER}{tail}")
}

async fn extract_one(section_name: &str, text: &str, llm: Arc<dyn LlmClient>) -> ExtractedContent {
    let outcome = call_with_single_retry("section_content_extraction", || {
        let llm = llm.clone();
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Section: {section_name}\n\n{text}")),
        ];
        async move {
            let chat = llm.chat(messages, 4096).await?;
            serde_json::from_str::<ExtractedContent>(&chat.content)
                .map_err(|e| crate::error::CoreError::model("section_content_extraction", format!("malformed response: {e}")))
        }
    })
    .await;

    match outcome {
        Ok(content) => content,
        Err(e) => {
            warn!(section_name, error = %e, "content extraction failed after retry, using empty buckets");
            ExtractedContent::default()
        }
    }
}

/// Non-fatal annotation recording that a section's content came back
/// empty due to an extraction error rather than a genuinely empty
/// section, for ExtractionMetadata reporting.
pub fn is_error_fallback(content: &ExtractedContent) -> bool {
    content.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_not_capped() {
        let text = "a".repeat(100);
        assert_eq!(cap_text(&text), text);
    }

    #[test]
    fn long_text_is_capped_with_elision_marker() {
        let text = "a".repeat(20_000);
        let capped = cap_text(&text);
        assert!(capped.contains(ELISION_MARKER));
        assert!(capped.chars().count() < text.chars().count());
    }

    #[test]
    fn long_text_keeps_head_and_tail() {
        let mut text = String::new();
        text.push_str(&"h".repeat(CAP_CHARS));
        text.push_str(&"t".repeat(CAP_CHARS));
        let capped = cap_text(&text);
        assert!(capped.starts_with('h'));
        assert!(capped.ends_with('t'));
    }

    #[test]
    fn default_content_counts_as_empty_fallback() {
        assert!(is_error_fallback(&ExtractedContent::default()));
    }
}
