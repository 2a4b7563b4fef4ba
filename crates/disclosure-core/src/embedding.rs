//! Embedding Service (§4.9): batched text-to-vector requests over the
//! configured `LlmClient`, plus a purely local fallback for environments
//! without a hosted embedding API.

use crate::error::Result;
use crate::llm::LlmClient;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_BATCH_LIMIT: usize = 100;

pub struct EmbeddingService {
    llm: Arc<dyn LlmClient>,
    batch_limit: usize,
}

impl EmbeddingService {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(llm: Arc<dyn LlmClient>, batch_limit: usize) -> Self {
        Self {
            llm,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Embeds `texts`, chunking requests at `batch_limit` and preserving
    /// input order across chunks.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_limit) {
            let vectors = self.llm.embed(chunk).await?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Cosine similarity, the only comparison op the embedding service
/// exposes (§4.9). Returns 0.0 for a zero-magnitude vector rather than
/// dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Local, hosted-API-free fallback: a hashed bag-of-words vector. Same
/// hash bucket count as any hosted embedding's dimensionality is not
/// guaranteed to match, so this is only meant for comparisons between
/// two locally-produced vectors, never mixed with hosted ones.
pub struct LocalHashEmbedder {
    dimensions: usize,
}

impl Default for LocalHashEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

impl LocalHashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut counts: HashMap<u64, f32> = HashMap::new();
        for token in text.split_whitespace() {
            let bucket = fnv1a(token.to_lowercase().as_bytes()) % self.dimensions as u64;
            *counts.entry(bucket).or_insert(0.0) += 1.0;
        }
        let mut vector = vec![0.0_f32; self.dimensions];
        let token_count = text.split_whitespace().count().max(1) as f32;
        for (bucket, count) in counts {
            vector[bucket as usize] = count / token_count;
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
