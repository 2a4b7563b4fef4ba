//! Text Extractor (§4.2): direct text extraction from a PDF path, gated
//! by a chars-per-page quality threshold.

use crate::error::{CoreError, Result};
use crate::model::Page;
use std::path::Path;

/// Default quality gate: average characters per page must be `>= 50`
/// (strict, §8 boundary test) for the text path to be declared a
/// success.
pub const DEFAULT_CHAR_THRESHOLD: f64 = 50.0;

pub struct TextExtractionOutcome {
    pub success: bool,
    pub pages: Vec<Page>,
    pub full_text: String,
}

pub struct TextExtractor {
    char_threshold: f64,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self {
            char_threshold: DEFAULT_CHAR_THRESHOLD,
        }
    }
}

impl TextExtractor {
    pub fn with_threshold(char_threshold: f64) -> Self {
        Self { char_threshold }
    }

    /// Extracts raw text per page via `pdf-extract`, then gates success on
    /// `total_chars / page_count >= threshold`. Returns `ExtractionError`
    /// only on an irrecoverable I/O/parse error; an empty-but-parseable
    /// PDF yields `success=false` with no error (§8 boundary test 1).
    pub fn extract(&self, path: &Path) -> Result<TextExtractionOutcome> {
        let page_texts = pdf_extract::extract_text_by_pages(path)
            .map_err(|e| CoreError::extraction("text_extraction", e.to_string()))?;

        if page_texts.is_empty() {
            return Ok(TextExtractionOutcome {
                success: false,
                pages: Vec::new(),
                full_text: String::new(),
            });
        }

        let has_images = page_raster_flags(path, page_texts.len());

        let mut pages = Vec::with_capacity(page_texts.len());
        let mut total_chars = 0usize;
        for (i, text) in page_texts.into_iter().enumerate() {
            total_chars += text.chars().count();
            let page_number = (i as u32) + 1;
            let has_raster = has_images.get(i).copied().unwrap_or(false);
            pages.push(Page::new(page_number, text, has_raster));
        }

        let avg_chars_per_page = total_chars as f64 / pages.len() as f64;
        let success = avg_chars_per_page >= self.char_threshold;

        let full_text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(TextExtractionOutcome {
            success,
            pages,
            full_text,
        })
    }
}

/// Best-effort per-page raster detection via the low-level PDF object
/// graph: a page whose resource dictionary contains an `XObject` of
/// subtype `Image` has embedded raster content. Any parse failure here
/// degrades to "no images detected" rather than failing extraction — this
/// flag is informational (used to prioritize vision fallback attention),
/// not the quality gate itself.
fn page_raster_flags(path: &Path, page_count: usize) -> Vec<bool> {
    let doc = match lopdf::Document::load(path) {
        Ok(d) => d,
        Err(_) => return vec![false; page_count],
    };

    doc.get_pages()
        .values()
        .map(|&object_id| page_has_image(&doc, object_id))
        .collect()
}

fn page_has_image(doc: &lopdf::Document, page_id: (u32, u16)) -> bool {
    let Ok(resources) = doc.get_page_resources(page_id) else {
        return false;
    };
    let Some(dict) = resources.0 else {
        return false;
    };
    let Ok(xobjects) = dict.get(b"XObject").and_then(|o| o.as_dict()) else {
        return false;
    };
    xobjects.iter().any(|(_, reference)| {
        doc.get_object(match reference.as_reference() {
            Ok(r) => r,
            Err(_) => return false,
        })
        .and_then(|obj| obj.as_stream())
        .map(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .map(|name| name == b"Image")
                .unwrap_or(false)
        })
        .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict_greater_or_equal() {
        let extractor = TextExtractor::with_threshold(50.0);
        assert!(50.0 >= extractor.char_threshold);
    }

    #[test]
    fn missing_file_is_extraction_error() {
        let extractor = TextExtractor::default();
        let result = extractor.extract(Path::new("/no/such/file.pdf"));
        assert!(result.is_err());
    }
}
