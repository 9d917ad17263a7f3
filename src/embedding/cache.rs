//! Process-local embedding cache keyed by exact text content
//!
//! Known limitation: the cache is unbounded. At this system's scale (a
//! curated guideline corpus plus interactive queries) that is acceptable;
//! an eviction policy would be needed before pointing this at an open
//! document stream.

use super::{EmbeddingError, EmbeddingProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

type CacheMap = HashMap<String, Vec<f32>, ahash::RandomState>;

/// Caching wrapper around any embedding provider
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: RwLock<CacheMap>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            inner,
            cache: RwLock::new(CacheMap::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Number of cached texts
    pub fn len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since construction
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn lookup(&self, text: &str) -> Option<Vec<f32>> {
        let cached = self.cache.read().unwrap().get(text).cloned();
        if cached.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        cached
    }

    fn store(&self, text: &str, vector: &[f32]) {
        self.cache
            .write()
            .unwrap()
            .insert(text.to_string(), vector.to_vec());
    }
}

impl EmbeddingProvider for CachedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(cached) = self.lookup(text) {
            return Ok(cached);
        }

        let vector = self.inner.embed(text)?;
        self.store(text, &vector);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        // Resolve hits up front, then embed only the misses in one batch
        let mut results: Vec<Option<Vec<f32>>> = texts.iter().map(|t| self.lookup(t)).collect();

        let miss_indices: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_none().then_some(i))
            .collect();

        if !miss_indices.is_empty() {
            let miss_texts: Vec<String> =
                miss_indices.iter().map(|&i| texts[i].clone()).collect();
            let embedded = self.inner.embed_batch(&miss_texts)?;

            for (&i, vector) in miss_indices.iter().zip(embedded.into_iter()) {
                self.store(&texts[i], &vector);
                results[i] = Some(vector);
            }
        }

        // Every slot is filled: hits from lookup, misses from the batch above
        Ok(results.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn cached() -> CachedEmbedder {
        CachedEmbedder::new(Arc::new(HashingEmbedder::new(64)))
    }

    #[test]
    fn second_embed_hits_cache() {
        let embedder = cached();

        let v1 = embedder.embed("sepsis bundle").unwrap();
        let v2 = embedder.embed("sepsis bundle").unwrap();

        assert_eq!(v1, v2);
        let (hits, misses) = embedder.counters();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert_eq!(embedder.len(), 1);
    }

    #[test]
    fn batch_fills_cache_and_reuses_it() {
        let embedder = cached();
        let texts = vec!["alpha".to_string(), "bravo".to_string()];

        let first = embedder.embed_batch(&texts).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(embedder.len(), 2);

        let second = embedder.embed_batch(&texts).unwrap();
        assert_eq!(first, second);

        let (hits, _) = embedder.counters();
        assert_eq!(hits, 2);
    }

    #[test]
    fn mixed_batch_preserves_input_order() {
        let embedder = cached();
        embedder.embed("bravo").unwrap();

        let texts = vec![
            "alpha".to_string(),
            "bravo".to_string(),
            "charlie".to_string(),
        ];
        let batch = embedder.embed_batch(&texts).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], embedder.embed("bravo").unwrap());
        assert_eq!(batch[0], embedder.embed("alpha").unwrap());
    }

    #[test]
    fn errors_propagate_and_leave_cache_unchanged() {
        let embedder = cached();
        assert!(embedder.embed("  ").is_err());
        assert_eq!(embedder.len(), 0);
    }
}
