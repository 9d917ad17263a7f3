//! End-to-end RAG pipeline
//!
//! Wires chunking, embedding, the vector index, retrieval, and the
//! generation chain into the two top-level operations: `ingest` and
//! `query`. Ingestion is per-document fault-isolated; one bad document is
//! skipped and reported, the rest still land in the index.

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::generation::{
    FallbackChain, GenerationRequest, OpenAiCompatProvider, ProviderAttempt,
};
use crate::index::{ChunkRecord, IndexEntry, IndexStats, VectorIndex};
use crate::ingest::{Chunker, Document};
use crate::retrieval::{Citation, RetrievalQuery, Retriever, NO_CONTEXT_MARKER};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Per-stage wall-clock milliseconds for one query
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageTimings {
    pub embed_ms: f64,
    pub search_ms: f64,
    pub assemble_ms: f64,
    pub generate_ms: f64,
    pub total_ms: f64,
}

/// One document that failed during ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub doc_id: String,
    pub error: String,
}

/// Outcome of an ingest run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<IngestFailure>,
}

/// Full answer to one query
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    /// Provider that produced the answer
    pub provider: String,
    /// True when the answer came from the static fallback
    pub degraded: bool,
    /// True when retrieval found nothing above the threshold
    pub no_context: bool,
    pub citations: Vec<Citation>,
    pub attempts: Vec<ProviderAttempt>,
    pub timings: StageTimings,
}

/// Combined pipeline statistics
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub snapshot_id: Uuid,
    pub index: IndexStats,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub providers: Vec<String>,
}

pub struct RagPipeline {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    retriever: Retriever,
    chain: FallbackChain,
    chunker: Chunker,
}

impl RagPipeline {
    /// Assemble the pipeline from config plus already-constructed embedder
    /// and index (the caller decides offline vs online and load vs new).
    /// The generation chain is built from the configured providers.
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
    ) -> Self {
        let mut chain = FallbackChain::new();
        for provider in &config.generation.providers {
            chain.push(
                Arc::new(OpenAiCompatProvider::new(
                    &provider.name,
                    &provider.endpoint,
                    &provider.model,
                    &provider.api_key_env,
                )),
                Duration::from_millis(provider.timeout_ms),
            );
        }
        Self::with_chain(config, embedder, index, chain)
    }

    /// Assemble the pipeline with an explicit generation chain
    pub fn with_chain(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        chain: FallbackChain,
    ) -> Self {
        let retriever = Retriever::new(
            embedder.clone(),
            index.clone(),
            config.retrieval.top_k,
            config.retrieval.score_threshold,
            config.retrieval.context_token_budget,
        );
        let chunker = Chunker::new(config.ingest.chunk_size, config.ingest.chunk_overlap);

        Self {
            config,
            embedder,
            index,
            retriever,
            chain,
            chunker,
        }
    }

    /// Chunk, embed, and index a batch of documents.
    ///
    /// Embedding failures are isolated per document: the document is
    /// skipped and recorded in the report, ingestion continues.
    pub fn ingest(&self, documents: Vec<Document>) -> Result<IngestReport> {
        let total = documents.len();
        let mut succeeded = 0usize;
        let mut chunks_indexed = 0usize;
        let mut failures = Vec::new();

        for document in documents {
            let doc_id = document.id.clone();
            match self.ingest_one(document) {
                Ok(count) => {
                    succeeded += 1;
                    chunks_indexed += count;
                }
                Err(e) => {
                    tracing::warn!("Skipping document '{}': {}", doc_id, e);
                    failures.push(IngestFailure {
                        doc_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Ingest complete: {}/{} documents, {} chunks indexed",
            succeeded,
            total,
            chunks_indexed
        );

        Ok(IngestReport {
            documents: total,
            succeeded,
            failed: failures.len(),
            chunks_indexed,
            failures,
        })
    }

    fn ingest_one(&self, document: Document) -> Result<usize> {
        let chunks = self.chunker.chunk_document(&document);
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry {
                record: ChunkRecord {
                    chunk_id: chunk.id,
                    doc_id: chunk.doc_id,
                    source: chunk.source,
                    ordinal: chunk.ordinal,
                    text: chunk.text,
                    token_count: chunk.token_count,
                    category: chunk.category,
                    title: chunk.title,
                },
                embedding,
            })
            .collect();

        let count = entries.len();
        self.index.add(entries)?;
        Ok(count)
    }

    /// Answer a question: retrieve context, then run the generation chain.
    ///
    /// Only retrieval can fail here (empty question, embedding backend
    /// down); once context exists the generation chain always produces an
    /// answer, degraded at worst.
    pub async fn query(&self, query: RetrievalQuery) -> Result<QueryResponse> {
        let total_start = Instant::now();

        let bundle = self.retriever.retrieve(&query)?;
        let no_context = bundle.is_empty();
        if no_context {
            tracing::info!("No relevant context for query, answering with caveat");
        }

        let request = GenerationRequest {
            question: query.text,
            context: bundle.context,
            temperature: self.config.generation.temperature,
            max_tokens: self.config.generation.max_tokens,
        };

        let outcome = self.chain.generate(&request).await;

        Ok(QueryResponse {
            answer: outcome.answer,
            provider: outcome.provider,
            degraded: outcome.degraded,
            no_context,
            citations: bundle.citations,
            attempts: outcome.attempts,
            timings: StageTimings {
                embed_ms: bundle.timings.embed_ms,
                search_ms: bundle.timings.search_ms,
                assemble_ms: bundle.timings.assemble_ms,
                generate_ms: outcome.total_ms,
                total_ms: total_start.elapsed().as_secs_f64() * 1000.0,
            },
        })
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            snapshot_id: self.index.snapshot_id(),
            index: self.index.stats(),
            embedding_model: self.embedder.model_name().to_string(),
            embedding_dimension: self.embedder.dimension(),
            providers: self
                .config
                .generation
                .providers
                .iter()
                .map(|p| p.name.clone())
                .collect(),
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Marker text used when retrieval comes back empty
    pub fn no_context_marker() -> &'static str {
        NO_CONTEXT_MARKER
    }
}
