//! Section mapping (§4.10): exact-name matches first, then embedding
//! similarity above a threshold for what remains.

use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::error::Result;
use crate::model::{ExtractedContent, MappingMethod, SectionMapping};
use std::collections::HashMap;

pub const SIMILARITY_THRESHOLD: f32 = 0.7;

/// Maps section names on side A to side B. Exact-name pairs are 1:N-safe
/// on either side when a name repeats; the remaining unmapped sections
/// are embedded and paired by maximum cosine similarity.
pub async fn map_sections(
    side_a: &HashMap<String, Option<ExtractedContent>>,
    side_b: &HashMap<String, Option<ExtractedContent>>,
    embeddings: &EmbeddingService,
) -> Result<Vec<SectionMapping>> {
    let mut mappings = Vec::new();
    let mut unmapped_b: Vec<String> = side_b.keys().cloned().collect();

    let mut unmapped_a = Vec::new();
    for name in side_a.keys() {
        if let Some(pos) = unmapped_b.iter().position(|b| b == name) {
            unmapped_b.remove(pos);
            mappings.push(SectionMapping {
                doc1_section: name.clone(),
                doc2_section: name.clone(),
                confidence_score: 1.0,
                mapping_method: MappingMethod::Exact,
            });
        } else {
            unmapped_a.push(name.clone());
        }
    }

    if unmapped_a.is_empty() || unmapped_b.is_empty() {
        return Ok(mappings);
    }

    let projection = |name: &str, content: Option<&ExtractedContent>| -> String {
        match content {
            Some(c) if !c.is_empty() => format!("{name}: {}", render_projection(c)),
            _ => name.to_string(),
        }
    };

    let texts_a: Vec<String> = unmapped_a
        .iter()
        .map(|n| projection(n, side_a.get(n).and_then(|c| c.as_ref())))
        .collect();
    let texts_b: Vec<String> = unmapped_b
        .iter()
        .map(|n| projection(n, side_b.get(n).and_then(|c| c.as_ref())))
        .collect();

    let mut all_texts = texts_a.clone();
    all_texts.extend(texts_b.clone());
    let all_vectors = embeddings.embed(&all_texts).await?;
    let (vectors_a, vectors_b) = all_vectors.split_at(texts_a.len());

    for (i, name_a) in unmapped_a.iter().enumerate() {
        let mut best: Option<(usize, f32)> = None;
        for (j, _) in unmapped_b.iter().enumerate() {
            let score = cosine_similarity(&vectors_a[i], &vectors_b[j]);
            if best.map(|(_, b)| score > b).unwrap_or(true) {
                best = Some((j, score));
            }
        }
        if let Some((j, score)) = best {
            if score >= SIMILARITY_THRESHOLD {
                mappings.push(SectionMapping {
                    doc1_section: name_a.clone(),
                    doc2_section: unmapped_b[j].clone(),
                    confidence_score: score,
                    mapping_method: MappingMethod::Embedding,
                });
            }
        }
    }

    Ok(mappings)
}

fn render_projection(content: &ExtractedContent) -> String {
    let mut parts = Vec::new();
    for fact in content.financial_data.iter().take(5) {
        parts.push(fact.item.clone());
    }
    for note in content.accounting_notes.iter().take(3) {
        parts.push(note.topic.clone());
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_projection_summarizes_items() {
        use crate::model::{AccountingNote, FinancialFact, ValueOrMap};
        let content = ExtractedContent {
            financial_data: vec![FinancialFact {
                item: "net sales".into(),
                value: ValueOrMap::Scalar("100".into()),
                unit: None,
                period: None,
                context: None,
            }],
            accounting_notes: vec![AccountingNote {
                topic: "leases".into(),
                content: "...".into(),
                note_type: "policy".into(),
            }],
            factual_info: Vec::new(),
            messages: Vec::new(),
        };
        let rendered = render_projection(&content);
        assert!(rendered.contains("net sales"));
        assert!(rendered.contains("leases"));
    }
}
