//! Section Detector (§4.5): partitions the page sequence into overlapping
//! batches, asks the model to locate the template's sections within each
//! batch, then stitches the per-batch results into one section map keyed
//! by canonical name.

use crate::error::{CoreError, Result};
use crate::llm::{call_with_single_retry, ChatMessage, LlmClient};
use crate::model::{DocumentTemplate, ExtractedContent, Page, SectionInfo};
use crate::pool::WorkerPool;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_POOL_WIDTH: usize = 5;
const DEFAULT_CONFIDENCE: f32 = 0.5;

const SYSTEM_PROMPT: &str = "You locate document sections within a batch of \
pages. Match pages to the given section names (or their listed alternative \
names). Respond with JSON only: {\"sections\": [{\"canonical_name\": string, \
\"first_page\": number, \"last_page\": number, \"confidence\": number}]}.";

pub struct SectionDetector {
    batch_size: usize,
    pool: WorkerPool,
}

impl Default for SectionDetector {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pool: WorkerPool::new(DEFAULT_POOL_WIDTH),
        }
    }
}

#[derive(Deserialize)]
struct ModelSectionHit {
    canonical_name: String,
    first_page: u32,
    last_page: u32,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Deserialize)]
struct ModelSectionsResponse {
    #[serde(default)]
    sections: Vec<ModelSectionHit>,
}

/// One batch's raw findings, kept keyed by its originating batch index so
/// stitching never depends on which batch happened to finish first.
struct BatchFindings {
    batch_index: usize,
    hits: Vec<ModelSectionHit>,
}

impl SectionDetector {
    pub fn new(batch_size: usize, pool_width: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pool: WorkerPool::new(pool_width),
        }
    }

    #[instrument(skip(self, pages, template, llm))]
    pub async fn detect(
        &self,
        pages: &[Page],
        template: &DocumentTemplate,
        llm: Arc<dyn LlmClient>,
    ) -> Result<HashMap<String, SectionInfo>> {
        if pages.is_empty() {
            return Ok(HashMap::new());
        }

        let section_catalog = describe_sections(template);
        let batches = batch_pages(pages, self.batch_size);

        let jobs: Vec<_> = batches
            .iter()
            .enumerate()
            .map(|(batch_index, batch)| {
                let llm = llm.clone();
                let batch_text = render_batch(batch);
                let catalog = section_catalog.clone();
                move || async move {
                    let hits = detect_in_batch(batch_index, batch_text, catalog, llm).await;
                    BatchFindings { batch_index, hits }
                }
            })
            .collect();

        let mut batch_results = self.pool.run_all(jobs).await;
        batch_results.sort_by_key(|b| b.batch_index);

        let raw_spans = stitch(batch_results, &batches);
        Ok(finalize(raw_spans, pages))
    }
}

fn describe_sections(template: &DocumentTemplate) -> String {
    template
        .sections
        .iter()
        .map(|s| {
            if s.alternative_names.is_empty() {
                s.name.clone()
            } else {
                format!("{} (also known as: {})", s.name, s.alternative_names.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Overlapping batches of `batch_size` pages, each batch's first page
/// being the previous batch's last so a section straddling a batch
/// boundary still appears whole to at least one request.
fn batch_pages(pages: &[Page], batch_size: usize) -> Vec<Vec<Page>> {
    let mut batches = Vec::new();
    let mut start = 0;
    while start < pages.len() {
        let end = (start + batch_size).min(pages.len());
        batches.push(pages[start..end].to_vec());
        if end == pages.len() {
            break;
        }
        start = end.saturating_sub(1).max(start + 1);
    }
    batches
}

fn render_batch(batch: &[Page]) -> String {
    batch
        .iter()
        .map(|p| format!("--- page {} ---\n{}", p.number, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn detect_in_batch(
    batch_index: usize,
    batch_text: String,
    catalog: String,
    llm: Arc<dyn LlmClient>,
) -> Vec<ModelSectionHit> {
    let outcome = call_with_single_retry("section_detection", || {
        let llm = llm.clone();
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Known sections:\n{catalog}\n\nPages:\n{batch_text}"
            )),
        ];
        async move {
            let chat = llm.chat(messages, 2048).await?;
            serde_json::from_str::<ModelSectionsResponse>(&chat.content)
                .map(|parsed| parsed.sections)
                .map_err(|e| crate::error::CoreError::model("section_detection", format!("malformed response: {e}")))
        }
    })
    .await;

    match outcome {
        Ok(sections) => sections,
        Err(e) => {
            warn!(batch_index, error = %e, "section detection failed after retry, treating batch as empty");
            Vec::new()
        }
    }
}

#[derive(Clone)]
struct RawSpan {
    canonical_name: String,
    start_page: u32,
    end_page: u32,
    confidence: f32,
}

/// Fuses same-named spans across adjacent batches when their page ranges
/// are contiguous, taking the minimum confidence of the merge.
fn stitch(batch_results: Vec<BatchFindings>, _batches: &[Vec<Page>]) -> Vec<RawSpan> {
    let mut spans: Vec<RawSpan> = Vec::new();

    for batch in batch_results {
        for hit in batch.hits {
            let confidence = hit.confidence.unwrap_or(DEFAULT_CONFIDENCE);
            let incoming = RawSpan {
                canonical_name: hit.canonical_name,
                start_page: hit.first_page,
                end_page: hit.last_page,
                confidence,
            };

            if let Some(existing) = spans.iter_mut().find(|s| {
                s.canonical_name == incoming.canonical_name
                    && spans_contiguous(s.start_page, s.end_page, incoming.start_page, incoming.end_page)
            }) {
                existing.start_page = existing.start_page.min(incoming.start_page);
                existing.end_page = existing.end_page.max(incoming.end_page);
                existing.confidence = existing.confidence.min(incoming.confidence);
            } else {
                spans.push(incoming);
            }
        }
    }

    resolve_overlaps(spans)
}

fn spans_contiguous(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    // Contiguous or overlapping: neither strictly precedes the other by
    // more than one page of gap.
    a_start <= b_end.saturating_add(1) && b_start <= a_end.saturating_add(1)
}

/// Tie-break: the span with the earlier start wins disputed pages; the
/// loser is truncated to the remainder and dropped entirely if empty.
fn resolve_overlaps(mut spans: Vec<RawSpan>) -> Vec<RawSpan> {
    spans.sort_by_key(|s| s.start_page);
    let mut resolved: Vec<RawSpan> = Vec::new();

    for span in spans.drain(..) {
        let mut span = span;
        if let Some(prev) = resolved.last_mut() {
            if span.start_page <= prev.end_page {
                let disputed_end = prev.end_page;
                span.start_page = disputed_end.saturating_add(1);
            }
        }
        if span.start_page <= span.end_page {
            resolved.push(span);
        }
    }
    resolved
}

/// Recomputes char count and page text from the authoritative Page
/// records, never trusting the model's own transcription.
fn finalize(spans: Vec<RawSpan>, pages: &[Page]) -> HashMap<String, SectionInfo> {
    let mut out = HashMap::new();
    for span in spans {
        let text: String = pages
            .iter()
            .filter(|p| p.number >= span.start_page && p.number <= span.end_page)
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let char_count = text.chars().count();

        out.insert(
            span.canonical_name,
            SectionInfo {
                start_page: span.start_page,
                end_page: span.end_page,
                char_count,
                confidence: span.confidence,
                content: None::<ExtractedContent>,
            },
        );
    }
    out
}

/// Surfaces a detection-stage failure as a typed error rather than an
/// empty map, used by the orchestrator when it must distinguish "no
/// sections found" from "the detector could not run at all".
pub fn require_template(template: Option<&DocumentTemplate>) -> Result<&DocumentTemplate> {
    template.ok_or_else(|| CoreError::Input("document has no resolved template".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> Page {
        Page::new(n, text.to_string(), false)
    }

    #[test]
    fn batches_overlap_by_one_page() {
        let pages: Vec<Page> = (1..=25).map(|n| page(n, "x")).collect();
        let batches = batch_pages(&pages, 10);
        assert_eq!(batches[0].last().unwrap().number, batches[1].first().unwrap().number);
        assert_eq!(batches.last().unwrap().last().unwrap().number, 25);
    }

    #[test]
    fn earlier_start_wins_disputed_pages() {
        let spans = vec![
            RawSpan {
                canonical_name: "a".into(),
                start_page: 1,
                end_page: 10,
                confidence: 0.9,
            },
            RawSpan {
                canonical_name: "b".into(),
                start_page: 8,
                end_page: 15,
                confidence: 0.9,
            },
        ];
        let resolved = resolve_overlaps(spans);
        assert_eq!(resolved[0].canonical_name, "a");
        assert_eq!(resolved[0].end_page, 10);
        assert_eq!(resolved[1].canonical_name, "b");
        assert_eq!(resolved[1].start_page, 11);
    }

    #[test]
    fn fully_disputed_loser_is_dropped() {
        let spans = vec![
            RawSpan {
                canonical_name: "a".into(),
                start_page: 1,
                end_page: 10,
                confidence: 0.9,
            },
            RawSpan {
                canonical_name: "b".into(),
                start_page: 3,
                end_page: 7,
                confidence: 0.9,
            },
        ];
        let resolved = resolve_overlaps(spans);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].canonical_name, "a");
    }

    #[test]
    fn char_count_is_recomputed_from_pages_not_model() {
        let pages = vec![page(1, "abc"), page(2, "de")];
        let spans = vec![RawSpan {
            canonical_name: "intro".into(),
            start_page: 1,
            end_page: 2,
            confidence: 0.8,
        }];
        let map = finalize(spans, &pages);
        let info = map.get("intro").unwrap();
        assert_eq!(info.char_count, "abc\nde".chars().count());
    }

    #[test]
    fn missing_confidence_defaults_to_point_five() {
        let hit = ModelSectionHit {
            canonical_name: "intro".into(),
            first_page: 1,
            last_page: 2,
            confidence: None,
        };
        assert_eq!(hit.confidence.unwrap_or(DEFAULT_CONFIDENCE), DEFAULT_CONFIDENCE);
    }
}
