//! Token-budgeted context assembly
//!
//! Builds the prompt context block from ranked, deduplicated hits. Chunks
//! are admitted greedily in rank order until the first one that would
//! overflow the budget; assembly stops there rather than skipping ahead,
//! so the included set is always a rank-order prefix.

use crate::index::SearchHit;
use crate::ingest::approx_token_count;
use serde::Serialize;

/// Shown to the model (and the user) when retrieval produced nothing usable
pub const NO_CONTEXT_MARKER: &str = "No relevant documents found in the knowledge base.";

/// Attribution entry for one chunk included in the context
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    /// 1-based position in the context block, matches the `[Source N]` label
    pub index: usize,
    pub source: String,
    pub doc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub score: f32,
}

/// Assembled context plus the hits that made it in
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// None when no hit fit the budget (or none were given)
    pub context: Option<String>,
    pub citations: Vec<Citation>,
    pub chunks: Vec<SearchHit>,
    /// Approximate token count of the assembled block
    pub token_count: usize,
}

impl AssembledContext {
    fn empty() -> Self {
        Self {
            context: None,
            citations: Vec::new(),
            chunks: Vec::new(),
            token_count: 0,
        }
    }
}

fn format_chunk(index: usize, hit: &SearchHit) -> String {
    format!(
        "[Source {}] (Relevance: {:.2})\n{}",
        index, hit.score, hit.record.text
    )
}

/// Assemble a context block from ranked hits under a token budget
pub fn assemble(hits: Vec<SearchHit>, token_budget: usize) -> AssembledContext {
    if hits.is_empty() {
        return AssembledContext::empty();
    }

    let mut sections: Vec<String> = Vec::new();
    let mut included: Vec<SearchHit> = Vec::new();
    let mut citations: Vec<Citation> = Vec::new();
    let mut used_tokens = 0usize;

    for hit in hits {
        let index = sections.len() + 1;
        let section = format_chunk(index, &hit);
        let section_tokens = approx_token_count(&section);

        if used_tokens + section_tokens > token_budget {
            tracing::debug!(
                "Context budget reached: {} of {} tokens used, stopping at rank {}",
                used_tokens,
                token_budget,
                index
            );
            break;
        }

        used_tokens += section_tokens;
        citations.push(Citation {
            index,
            source: hit.record.source.clone(),
            doc_id: hit.record.doc_id.clone(),
            title: hit.record.title.clone(),
            score: hit.score,
        });
        sections.push(section);
        included.push(hit);
    }

    if sections.is_empty() {
        return AssembledContext::empty();
    }

    AssembledContext {
        context: Some(sections.join("\n\n")),
        citations,
        chunks: included,
        token_count: used_tokens,
    }
}
