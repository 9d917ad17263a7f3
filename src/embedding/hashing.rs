//! Deterministic feature-hashing embedder for offline operation
//!
//! Each lowercased word is hashed into one of `dimension` buckets with a
//! hash-derived sign, then the vector is L2-normalized. Texts sharing words
//! land near each other, which is enough for offline retrieval over a small
//! curated corpus and gives bit-identical vectors across runs and machines.

use super::{EmbeddingError, EmbeddingProvider};

// Fixed seeds: the whole point of this embedder is reproducibility
const SEED: (u64, u64, u64, u64) = (
    0x9e37_79b9_7f4a_7c15,
    0xbf58_476d_1ce4_e5b9,
    0x94d0_49bb_1331_11eb,
    0x2545_f491_4f6c_dd1d,
);

pub struct HashingEmbedder {
    dimension: usize,
    hasher: ahash::RandomState,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            hasher: ahash::RandomState::with_seeds(SEED.0, SEED.1, SEED.2, SEED.3),
        }
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in trimmed.split_whitespace() {
            let token: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.is_empty() {
                continue;
            }

            let hash = self.hasher.hash_one(token.as_str());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_one(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hashing-v1"
    }
}
