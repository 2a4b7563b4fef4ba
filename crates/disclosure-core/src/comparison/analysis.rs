//! Per-section comparison analysis (§4.10): mode-varying prompt
//! construction, the importance-promotion rule, and iterative
//! re-exploration.

use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::error::Result;
use crate::llm::{call_with_single_retry, ChatMessage, LlmClient};
use crate::model::{
    ComparisonMode, DifferentApproach, ExtractedContent, Importance, IterativeSearchMode,
    ModifiedItem, NumericalDifference, SearchRound, TextChanges,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_MAX_ITERATIVE_ROUNDS: u32 = 2;
pub const MIN_SEARCH_KEYWORD_LEN: usize = 4;
pub const ITERATIVE_SIMILARITY_THRESHOLD: f32 = 0.7;
const MAX_SEARCH_PHRASES_PER_ROUND: usize = 5;

#[derive(Deserialize, Default)]
struct ModelAnalysisResponse {
    #[serde(default)]
    contradictions: Vec<String>,
    #[serde(default)]
    normal_differences: Vec<String>,
    #[serde(default)]
    complementary_info: Vec<String>,
    consistency_score: Option<u8>,
    consistency_reason: Option<String>,

    #[serde(default)]
    added: Vec<String>,
    #[serde(default)]
    removed: Vec<String>,
    #[serde(default)]
    modified: Vec<ModifiedItem>,

    #[serde(default)]
    only_in_company1: Vec<String>,
    #[serde(default)]
    only_in_company2: Vec<String>,
    #[serde(default)]
    different_approaches: Vec<DifferentApproach>,

    tone_analysis: Option<String>,
    #[serde(default = "default_importance")]
    importance: String,
    #[serde(default)]
    importance_reason: String,
    #[serde(default)]
    summary: String,
}

fn default_importance() -> String {
    "medium".to_string()
}

pub struct SectionAnalysis {
    pub text_changes: TextChanges,
    pub tone_analysis: Option<String>,
    pub importance: Importance,
    pub importance_reason: String,
    pub summary: String,
}

fn system_prompt_for(mode: ComparisonMode) -> &'static str {
    match mode {
        ComparisonMode::ConsistencyCheck => {
            "You compare two disclosures of the same company covering different \
            document types for the same period. Identify contradictions[], \
            normal_differences[] (expected given the document types), and \
            complementary_info[] (detail present in one but not the other, not \
            contradictory). Rate consistency_score from 1 (highly inconsistent) \
            to 5 (fully consistent) with a consistency_reason. Also give \
            tone_analysis, importance (high|medium|low) with importance_reason, \
            and a natural-language summary. Respond with JSON only."
        }
        ComparisonMode::DiffAnalysisYear => {
            "You compare the same section of the same company's disclosure across \
            two fiscal years. List added[] (new content), removed[] (dropped \
            content), and modified[]{before, after} (changed content). Also give \
            tone_analysis, importance (high|medium|low) with importance_reason, \
            and a natural-language summary. Respond with JSON only."
        }
        ComparisonMode::DiffAnalysisCompany | ComparisonMode::MultiDocument => {
            "You compare the same section across two companies' disclosures. List \
            only_in_company1[], only_in_company2[], and \
            different_approaches[]{aspect, company1_approach, company2_approach}. \
            Also give tone_analysis, importance (high|medium|low) with \
            importance_reason, and a natural-language summary. Respond with JSON \
            only."
        }
    }
}

/// Renders the body of the analysis prompt: the ExtractedContent of both
/// sides when available, falling back to raw page text only when a side
/// has none (§4.10).
fn render_body(
    content_a: Option<&ExtractedContent>,
    content_b: Option<&ExtractedContent>,
    raw_text_a: &str,
    raw_text_b: &str,
) -> String {
    let side_a = match content_a {
        Some(c) if !c.is_empty() => render_extracted_content(c),
        _ => raw_text_a.to_string(),
    };
    let side_b = match content_b {
        Some(c) if !c.is_empty() => render_extracted_content(c),
        _ => raw_text_b.to_string(),
    };
    format!("Document 1:\n{side_a}\n\nDocument 2:\n{side_b}")
}

fn render_extracted_content(content: &ExtractedContent) -> String {
    let mut lines = Vec::new();
    for fact in &content.financial_data {
        lines.push(format!(
            "financial_data: {} = {:?} ({:?}, {:?})",
            fact.item, fact.value, fact.unit, fact.period
        ));
    }
    for note in &content.accounting_notes {
        lines.push(format!("accounting_note[{}]: {}", note.note_type, note.content));
    }
    for info in &content.factual_info {
        lines.push(format!("factual_info[{}]: {} = {:?}", info.category, info.item, info.value));
    }
    for message in &content.messages {
        lines.push(format!("message[{}]: {}", message.message_type, message.content));
    }
    lines.join("\n")
}

/// Runs the first-pass per-section analysis call.
pub async fn analyze_section(
    mode: ComparisonMode,
    content_a: Option<&ExtractedContent>,
    content_b: Option<&ExtractedContent>,
    raw_text_a: &str,
    raw_text_b: &str,
    llm: Arc<dyn LlmClient>,
) -> Result<SectionAnalysis> {
    let body = render_body(content_a, content_b, raw_text_a, raw_text_b);
    let response = run_analysis_call(mode, &body, llm).await;
    Ok(to_section_analysis(response))
}

async fn run_analysis_call(mode: ComparisonMode, body: &str, llm: Arc<dyn LlmClient>) -> ModelAnalysisResponse {
    let outcome = call_with_single_retry("comparison_analysis", || {
        let llm = llm.clone();
        let messages = vec![
            ChatMessage::system(system_prompt_for(mode)),
            ChatMessage::user(body.to_string()),
        ];
        async move {
            let chat = llm.chat(messages, 2048).await?;
            serde_json::from_str::<ModelAnalysisResponse>(&chat.content)
                .map_err(|e| crate::error::CoreError::model("comparison_analysis", format!("malformed response: {e}")))
        }
    })
    .await;

    match outcome {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "comparison analysis failed after retry, using empty analysis");
            ModelAnalysisResponse::default()
        }
    }
}

fn to_section_analysis(response: ModelAnalysisResponse) -> SectionAnalysis {
    let importance = match response.importance.to_lowercase().as_str() {
        "high" => Importance::High,
        "low" => Importance::Low,
        _ => Importance::Medium,
    };
    SectionAnalysis {
        text_changes: TextChanges {
            contradictions: response.contradictions,
            normal_differences: response.normal_differences,
            complementary_info: response.complementary_info,
            consistency_score: response.consistency_score,
            consistency_reason: response.consistency_reason,
            added: response.added,
            removed: response.removed,
            modified: response.modified,
            only_in_company1: response.only_in_company1,
            only_in_company2: response.only_in_company2,
            different_approaches: response.different_approaches,
        },
        tone_analysis: response.tone_analysis,
        importance,
        importance_reason: response.importance_reason,
        summary: response.summary,
    }
}

/// Importance-promotion rule (§4.10): a `medium`/`low` verdict is
/// overridden to `high` when the mode-relevant signal is non-empty — the
/// analysis model's own `contradictions` for `consistency_check`, or a
/// section with at least one materially significant numerical
/// difference alongside a non-empty `modified` list for
/// `diff_analysis_year`.
pub fn apply_importance_promotion(
    analysis: &mut SectionAnalysis,
    mode: ComparisonMode,
    section_numerical_diffs: &[NumericalDifference],
) {
    if analysis.importance == Importance::High {
        return;
    }

    let trigger_count = match mode {
        ComparisonMode::ConsistencyCheck => analysis.text_changes.contradictions.len(),
        ComparisonMode::DiffAnalysisYear => {
            if analysis.text_changes.modified.is_empty() {
                0
            } else {
                section_numerical_diffs.iter().filter(|d| d.is_significant).count()
            }
        }
        _ => 0,
    };

    if trigger_count > 0 {
        analysis.importance = Importance::High;
        analysis.importance_reason = format!(
            "{trigger_count} material signal(s) found, promoted to high ({})",
            analysis.importance_reason
        );
    }
}

/// Whether a section qualifies for iterative re-exploration under the
/// configured mode.
pub fn should_iterate(mode: IterativeSearchMode, importance: Importance) -> bool {
    match mode {
        IterativeSearchMode::Off => false,
        IterativeSearchMode::HighOnly => importance == Importance::High,
        IterativeSearchMode::All => true,
    }
}

const SEARCH_PHRASE_SYSTEM_PROMPT: &str = "Given a section's analysis so far, \
propose up to 5 short search phrases (each at least 4 characters) that might \
locate passages elsewhere in either document explaining what remains \
unexplained. Respond with JSON only: {\"phrases\": [string, ...]}.";

#[derive(Deserialize, Default)]
struct SearchPhrasesResponse {
    #[serde(default)]
    phrases: Vec<String>,
}

/// Runs up to `max_rounds` iterative re-exploration rounds for one
/// section, appending a `SearchRound` per round and reporting whether
/// any round found additional context.
pub async fn run_iterative_rounds(
    section_name: &str,
    analysis: &SectionAnalysis,
    structured_text_a: &str,
    structured_text_b: &str,
    llm: Arc<dyn LlmClient>,
    embeddings: &EmbeddingService,
    max_rounds: u32,
) -> Result<(Vec<SearchRound>, bool)> {
    let mut rounds = Vec::new();
    let mut has_additional_context = false;
    let mut running_summary = analysis.summary.clone();

    for iteration in 1..=max_rounds {
        let phrases = propose_search_phrases(section_name, &running_summary, llm.clone()).await;
        let usable_phrases: Vec<String> = phrases
            .into_iter()
            .filter(|p| p.chars().count() >= MIN_SEARCH_KEYWORD_LEN)
            .take(MAX_SEARCH_PHRASES_PER_ROUND)
            .collect();
        if usable_phrases.is_empty() {
            break;
        }

        let passages = find_passages(&usable_phrases, structured_text_a, structured_text_b);
        if passages.is_empty() {
            rounds.push(SearchRound {
                iteration,
                search_keywords: usable_phrases,
                found_sections: Vec::new(),
                analysis: String::new(),
            });
            continue;
        }

        let section_query = vec![format!("{section_name}: {running_summary}")];
        let mut embed_inputs = section_query.clone();
        embed_inputs.extend(passages.iter().cloned());
        let vectors = embeddings.embed(&embed_inputs).await?;
        let (query_vec, passage_vecs) = vectors.split_at(1);

        let kept: Vec<&String> = passages
            .iter()
            .zip(passage_vecs.iter())
            .filter(|(_, v)| cosine_similarity(&query_vec[0], v) >= ITERATIVE_SIMILARITY_THRESHOLD)
            .map(|(p, _)| p)
            .collect();

        if kept.is_empty() {
            rounds.push(SearchRound {
                iteration,
                search_keywords: usable_phrases,
                found_sections: Vec::new(),
                analysis: String::new(),
            });
            continue;
        }

        let augmented_context = kept.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("\n---\n");
        let round_analysis = summarize_additional_context(section_name, &augmented_context, llm.clone()).await;
        has_additional_context = true;
        running_summary = round_analysis.clone();

        rounds.push(SearchRound {
            iteration,
            search_keywords: usable_phrases,
            found_sections: kept.into_iter().cloned().collect(),
            analysis: round_analysis,
        });
    }

    Ok((rounds, has_additional_context))
}

async fn propose_search_phrases(section_name: &str, context: &str, llm: Arc<dyn LlmClient>) -> Vec<String> {
    let outcome = call_with_single_retry("iterative_search_phrases", || {
        let llm = llm.clone();
        let messages = vec![
            ChatMessage::system(SEARCH_PHRASE_SYSTEM_PROMPT),
            ChatMessage::user(format!("Section: {section_name}\nCurrent analysis: {context}")),
        ];
        async move { llm.chat(messages, 256).await }
    })
    .await;

    match outcome {
        Ok(chat) => serde_json::from_str::<SearchPhrasesResponse>(&chat.content)
            .map(|r| r.phrases)
            .unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

async fn summarize_additional_context(section_name: &str, passages: &str, llm: Arc<dyn LlmClient>) -> String {
    let outcome = call_with_single_retry("iterative_context_summary", || {
        let llm = llm.clone();
        let messages = vec![
            ChatMessage::system(
                "Summarize, in one or two sentences, what these newly found passages add \
                 to the analysis of the given section.",
            ),
            ChatMessage::user(format!("Section: {section_name}\nPassages:\n{passages}")),
        ];
        async move { llm.chat(messages, 512).await }
    })
    .await;

    outcome.map(|c| c.content).unwrap_or_default()
}

/// Simple case-folded substring search for `phrases` (already filtered
/// to the minimum length) across both documents' structured text,
/// returning the matching passages as paragraph-sized windows.
fn find_passages(phrases: &[String], text_a: &str, text_b: &str) -> Vec<String> {
    let mut out = Vec::new();
    for text in [text_a, text_b] {
        let lower = text.to_lowercase();
        for phrase in phrases {
            let needle = phrase.to_lowercase();
            if let Some(pos) = lower.find(&needle) {
                let start = pos.saturating_sub(200);
                let end = (pos + needle.len() + 200).min(text.len());
                let start = floor_char_boundary(text, start);
                let end = ceil_char_boundary(text, end);
                out.push(text[start..end].to_string());
            }
        }
    }
    out
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
