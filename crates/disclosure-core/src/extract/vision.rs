//! Vision Extractor (§4.3): OCR fallback over rendered page images.
//!
//! Pages are rendered with `pdfium-render` (the same rasterization crate
//! the teacher's sibling `docling_rs` workspace depends on for its OCR
//! fallback path) and grouped into fixed-size batches. Batches run
//! concurrently on a bounded `WorkerPool`; within one batch, pages are
//! processed in order so each page's extracted text can be carried into
//! the next page's prompt as context.

use crate::error::Result;
use crate::llm::{call_with_single_retry, ChatMessage, LlmClient};
use crate::model::{Page, StageOutcome};
use crate::pool::WorkerPool;
use base64::Engine;
use pdfium_render::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{instrument, warn};

pub const DEFAULT_DPI: f32 = 150.0;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_POOL_WIDTH: usize = 10;

const SYSTEM_PROMPT: &str = "You transcribe scanned document pages to plain text. \
Return the raw text only, preserving the original reading order. Do not \
summarize, translate, or add commentary.";

pub struct VisionExtractionOutcome {
    pub success: bool,
    pub pages: Vec<Page>,
    pub full_text: String,
    pub tokens_used: u64,
    /// Per-page failure record, for ExtractionMetadata annotation.
    pub page_failures: Vec<(u32, String)>,
}

pub struct VisionExtractor {
    dpi: f32,
    batch_size: usize,
    pool: WorkerPool,
}

impl Default for VisionExtractor {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            batch_size: DEFAULT_BATCH_SIZE,
            pool: WorkerPool::new(DEFAULT_POOL_WIDTH),
        }
    }
}

impl VisionExtractor {
    pub fn new(dpi: f32, batch_size: usize, pool_width: usize) -> Self {
        Self {
            dpi,
            batch_size: batch_size.max(1),
            pool: WorkerPool::new(pool_width),
        }
    }

    #[instrument(skip(self, llm), fields(path = %path.display()))]
    pub async fn extract(
        &self,
        path: &Path,
        llm: Arc<dyn LlmClient>,
    ) -> Result<VisionExtractionOutcome> {
        let images = render_pages(path, self.dpi)?;
        let batches: Vec<Vec<(u32, Vec<u8>)>> = images
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| ((i as u32) + 1, bytes))
            .collect::<Vec<_>>()
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let jobs: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let llm = llm.clone();
                move || async move { process_batch(batch, llm).await }
            })
            .collect();

        let batch_results = self.pool.run_all(jobs).await;

        let mut pages = Vec::new();
        let mut tokens_used = 0u64;
        let mut page_failures = Vec::new();
        for batch in batch_results {
            for page_result in batch {
                tokens_used += page_result.tokens_used;
                if let Some(err) = page_result.error {
                    page_failures.push((page_result.page_number, err));
                }
                pages.push(Page::new(page_result.page_number, page_result.text, true));
            }
        }
        pages.sort_by_key(|p| p.number);

        let full_text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let success = !pages.is_empty();

        Ok(VisionExtractionOutcome {
            success,
            pages,
            full_text,
            tokens_used,
            page_failures,
        })
    }
}

struct PageResult {
    page_number: u32,
    text: String,
    tokens_used: u64,
    error: Option<String>,
}

/// Processes one batch sequentially, carrying the previous page's text
/// forward as context for the next prompt. A single-page failure yields
/// empty text for that page and is recorded, without aborting the batch.
async fn process_batch(batch: Vec<(u32, Vec<u8>)>, llm: Arc<dyn LlmClient>) -> Vec<PageResult> {
    let mut results = Vec::with_capacity(batch.len());
    let mut carry_over = String::new();

    for (page_number, image_bytes) in batch {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);
        let prompt = if carry_over.is_empty() {
            "Transcribe this page.".to_string()
        } else {
            format!(
                "The previous page ended with:\n---\n{carry_over}\n---\n\
                 Transcribe this page, continuing naturally from that context."
            )
        };

        let outcome = call_with_single_retry("vision_extraction", || {
            let llm = llm.clone();
            let messages = vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user_with_image(prompt.clone(), &image_b64),
            ];
            async move { llm.chat(messages, 4096).await }
        })
        .await;

        match outcome {
            Ok(chat) => {
                carry_over = tail_chars(&chat.content, 500);
                results.push(PageResult {
                    page_number,
                    text: chat.content,
                    tokens_used: chat.tokens_used,
                    error: None,
                });
            }
            Err(e) => {
                warn!(page_number, error = %e, "vision extraction failed for page, using empty text");
                carry_over.clear();
                results.push(PageResult {
                    page_number,
                    text: String::new(),
                    tokens_used: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }
    results
}

fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

/// Rasterizes every page of `path` to PNG bytes at `dpi`.
fn render_pages(path: &Path, dpi: f32) -> Result<Vec<Vec<u8>>> {
    let pdfium = Pdfium::new(
        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| crate::error::CoreError::extraction("vision_extraction", e.to_string()))?,
    );
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| crate::error::CoreError::extraction("vision_extraction", e.to_string()))?;

    let scale = dpi / 72.0;
    let mut images = Vec::new();
    for page in document.pages().iter() {
        let width = (page.width().value * scale) as i32;
        let height = (page.height().value * scale) as i32;
        let config = PdfRenderConfig::new()
            .set_target_width(width.max(1))
            .set_target_height(height.max(1));
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| crate::error::CoreError::extraction("vision_extraction", e.to_string()))?;
        let mut bytes = Vec::new();
        bitmap
            .as_image()
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .map_err(|e| crate::error::CoreError::extraction("vision_extraction", e.to_string()))?;
        images.push(bytes);
    }
    Ok(images)
}

pub fn outcome_stage_annotation(outcome: &VisionExtractionOutcome) -> StageOutcome {
    if outcome.page_failures.is_empty() {
        StageOutcome::ok()
    } else {
        StageOutcome::failed(format!(
            "{} page(s) failed vision extraction",
            outcome.page_failures.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_chars_truncates_from_the_end() {
        assert_eq!(tail_chars("hello world", 5), "world");
        assert_eq!(tail_chars("hi", 5), "hi");
    }
}
