//! Company/fiscal-year identification (§4.10): a dedicated LLM call over
//! the first ~4,000 characters of structured text, used only when the
//! caller has no manual override for that document.

use crate::error::Result;
use crate::llm::{call_with_single_retry, ChatMessage, LlmClient};
use crate::model::{Document, DocumentInfo};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

const IDENTIFY_PROMPT_CHARS: usize = 4_000;

const SYSTEM_PROMPT: &str = "Identify the reporting company's name and the fiscal \
year/period this disclosure covers. Respond with JSON only: {\"company_name\": \
string|null, \"fiscal_year\": string|null}.";

#[derive(Deserialize, Default)]
struct IdentifyResponse {
    company_name: Option<String>,
    fiscal_year: Option<String>,
}

/// Manual values from the document record take precedence over anything
/// the model infers (§4.10).
pub struct ManualOverride {
    pub company_name: Option<String>,
    pub fiscal_year: Option<String>,
}

pub async fn resolve_document_info(
    document: &Document,
    manual_override: Option<&ManualOverride>,
    llm: Arc<dyn LlmClient>,
) -> Result<DocumentInfo> {
    let structured_text = document
        .structured_data
        .as_ref()
        .map(|d| d.full_text())
        .unwrap_or_default();

    let manual_company = manual_override.and_then(|o| o.company_name.clone());
    let manual_year = manual_override.and_then(|o| o.fiscal_year.clone());

    let (company_name, fiscal_year) = if manual_company.is_some() && manual_year.is_some() {
        (manual_company, manual_year)
    } else {
        let identified = identify(&structured_text, llm).await;
        (
            manual_company.or(identified.company_name),
            manual_year.or(identified.fiscal_year),
        )
    };

    Ok(DocumentInfo {
        document_id: document.id.clone(),
        filename: document.filename.clone(),
        document_type: document.document_type.clone(),
        company_name,
        fiscal_year,
        extraction_confidence: if document.structured_data.is_some() { 1.0 } else { 0.0 },
    })
}

async fn identify(structured_text: &str, llm: Arc<dyn LlmClient>) -> IdentifyResponse {
    let excerpt: String = structured_text.chars().take(IDENTIFY_PROMPT_CHARS).collect();
    if excerpt.trim().is_empty() {
        return IdentifyResponse::default();
    }

    let outcome = call_with_single_retry("document_identification", || {
        let llm = llm.clone();
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(excerpt.clone())];
        async move { llm.chat(messages, 256).await }
    })
    .await;

    match outcome {
        Ok(chat) => serde_json::from_str(&chat.content).unwrap_or_else(|e| {
            warn!(error = %e, "malformed document-identification response");
            IdentifyResponse::default()
        }),
        Err(e) => {
            warn!(error = %e, "document identification request failed");
            IdentifyResponse::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_override_short_circuits_structured_text_lookup() {
        let overrides = ManualOverride {
            company_name: Some("Acme Corp".into()),
            fiscal_year: Some("2024".into()),
        };
        assert_eq!(overrides.company_name.as_deref(), Some("Acme Corp"));
    }
}
