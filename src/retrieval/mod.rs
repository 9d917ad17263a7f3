//! Retrieval: embed the query, search the index, dedup, assemble context
//!
//! Pipeline per query:
//! 1. Embed the query text
//! 2. Exact nearest-neighbor search with the score threshold applied
//! 3. Per-document deduplication (best chunk per document wins)
//! 4. Greedy token-budgeted context assembly with source citations
//!
//! Each stage is timed; the timings ride along on the result so the
//! pipeline can report where a slow query spent its time.

mod assembler;
mod deduplication;

pub use assembler::{assemble, AssembledContext, Citation, NO_CONTEXT_MARKER};
pub use deduplication::dedup_by_document;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::index::{IndexError, SearchHit, VectorIndex};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index search failed: {0}")]
    Index(#[from] IndexError),
}

/// A retrieval request with optional per-query overrides
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: String,
    /// Override the configured top-k for this query
    pub top_k: Option<usize>,
    /// Override the configured score threshold; `Some(-1.0)` effectively
    /// disables filtering for cosine scores
    pub score_threshold: Option<f32>,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: None,
            score_threshold: None,
        }
    }
}

/// Wall-clock milliseconds spent in each retrieval stage
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RetrievalTimings {
    pub embed_ms: f64,
    pub search_ms: f64,
    pub assemble_ms: f64,
}

/// Everything retrieval produced for one query
#[derive(Debug, Clone)]
pub struct ContextBundle {
    /// None when no chunk passed the threshold and fit the budget
    pub context: Option<String>,
    pub citations: Vec<Citation>,
    pub chunks: Vec<SearchHit>,
    pub token_count: usize,
    pub timings: RetrievalTimings,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.context.is_none()
    }
}

/// Retrieval front-end over an embedder and a vector index
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    default_top_k: usize,
    default_threshold: f32,
    token_budget: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        default_top_k: usize,
        default_threshold: f32,
        token_budget: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            default_top_k,
            default_threshold,
            token_budget,
        }
    }

    /// Run the full retrieval pipeline for one query
    pub fn retrieve(&self, query: &RetrievalQuery) -> Result<ContextBundle, RetrievalError> {
        if query.text.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let top_k = query.top_k.unwrap_or(self.default_top_k);
        let threshold = query.score_threshold.unwrap_or(self.default_threshold);

        let start = Instant::now();
        let query_vector = self.embedder.embed(&query.text)?;
        let embed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        let hits = self.index.search(&query_vector, top_k, Some(threshold))?;
        let search_ms = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        let deduped = dedup_by_document(hits);
        let assembled = assemble(deduped, self.token_budget);
        let assemble_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::debug!(
            "Retrieval: {} chunks, {} context tokens (embed {:.1}ms, search {:.1}ms)",
            assembled.chunks.len(),
            assembled.token_count,
            embed_ms,
            search_ms
        );

        Ok(ContextBundle {
            context: assembled.context,
            citations: assembled.citations,
            chunks: assembled.chunks,
            token_count: assembled.token_count,
            timings: RetrievalTimings {
                embed_ms,
                search_ms,
                assemble_ms,
            },
        })
    }

    /// Raw ranked search without dedup or assembly; used by evaluation
    pub fn search_raw(
        &self,
        text: &str,
        top_k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        if text.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        let query_vector = self.embedder.embed(text)?;
        Ok(self.index.search(&query_vector, top_k, threshold)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::index::{ChunkRecord, IndexEntry, SimilarityMetric};

    fn indexed_corpus(embedder: &dyn EmbeddingProvider, docs: &[(&str, &str)]) -> Arc<VectorIndex> {
        let index = VectorIndex::new(embedder.dimension(), SimilarityMetric::Cosine);
        let entries: Vec<IndexEntry> = docs
            .iter()
            .map(|(doc_id, text)| IndexEntry {
                record: ChunkRecord {
                    chunk_id: format!("{}#0", doc_id),
                    doc_id: doc_id.to_string(),
                    source: format!("{}.md", doc_id),
                    ordinal: 0,
                    text: text.to_string(),
                    token_count: crate::ingest::approx_token_count(text),
                    category: None,
                    title: None,
                },
                embedding: embedder.embed(text).unwrap(),
            })
            .collect();
        index.build(entries).unwrap();
        Arc::new(index)
    }

    fn retriever(docs: &[(&str, &str)]) -> Retriever {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(256));
        let index = indexed_corpus(embedder.as_ref(), docs);
        Retriever::new(embedder, index, 5, 0.1, 2000)
    }

    #[test]
    fn retrieves_topically_matching_document_first() {
        let retriever = retriever(&[
            ("sepsis", "sepsis recognition antibiotics lactate fluid resuscitation"),
            ("stroke", "stroke thrombolysis alteplase imaging window"),
            ("asthma", "asthma bronchodilator inhaler corticosteroid"),
        ]);

        let bundle = retriever
            .retrieve(&RetrievalQuery::new("antibiotics for sepsis resuscitation"))
            .unwrap();

        assert!(!bundle.is_empty());
        assert_eq!(bundle.chunks[0].record.doc_id, "sepsis");
        assert!(bundle.context.unwrap().contains("[Source 1]"));
    }

    #[test]
    fn empty_query_is_rejected() {
        let retriever = retriever(&[("a", "some text")]);
        assert!(matches!(
            retriever.retrieve(&RetrievalQuery::new("   ")),
            Err(RetrievalError::EmptyQuery)
        ));
    }

    #[test]
    fn unrelated_query_yields_empty_bundle() {
        let retriever = Retriever::new(
            Arc::new(HashingEmbedder::new(256)),
            indexed_corpus(
                &HashingEmbedder::new(256),
                &[("sepsis", "sepsis antibiotics lactate")],
            ),
            5,
            0.9, // strict threshold
            2000,
        );

        let bundle = retriever
            .retrieve(&RetrievalQuery::new("quarterly tax filing deadlines"))
            .unwrap();

        assert!(bundle.is_empty());
        assert!(bundle.chunks.is_empty());
    }

    #[test]
    fn per_query_overrides_apply() {
        let retriever = retriever(&[
            ("a", "alpha common words"),
            ("b", "bravo common words"),
            ("c", "charlie common words"),
        ]);

        let mut query = RetrievalQuery::new("common words");
        query.top_k = Some(1);
        query.score_threshold = Some(-1.0);

        let bundle = retriever.retrieve(&query).unwrap();
        assert_eq!(bundle.chunks.len(), 1);
    }

    #[test]
    fn timings_are_recorded() {
        let retriever = retriever(&[("a", "alpha text")]);
        let bundle = retriever.retrieve(&RetrievalQuery::new("alpha text")).unwrap();
        assert!(bundle.timings.embed_ms >= 0.0);
        assert!(bundle.timings.search_ms >= 0.0);
    }
}
