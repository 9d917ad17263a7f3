//! Per-document deduplication of search hits

use crate::index::SearchHit;
use std::collections::HashSet;

/// Keep only the first hit per source document.
///
/// Hits arrive ranked, so "first" is the highest-scoring chunk of each
/// document; later chunks of the same document are dropped. Relative order
/// of the survivors is unchanged.
pub fn dedup_by_document(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen: HashSet<String> = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.record.doc_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkRecord;

    fn hit(chunk_id: &str, doc_id: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk_id: chunk_id.to_string(),
            score,
            record: ChunkRecord {
                chunk_id: chunk_id.to_string(),
                doc_id: doc_id.to_string(),
                source: format!("{}.md", doc_id),
                ordinal: 0,
                text: String::new(),
                token_count: 0,
                category: None,
                title: None,
            },
        }
    }

    #[test]
    fn keeps_highest_ranked_chunk_per_document() {
        let hits = vec![
            hit("sepsis#2", "sepsis", 0.92),
            hit("sepsis#0", "sepsis", 0.88),
            hit("stroke#1", "stroke", 0.70),
            hit("stroke#4", "stroke", 0.61),
        ];

        let deduped = dedup_by_document(hits);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].chunk_id, "sepsis#2");
        assert_eq!(deduped[1].chunk_id, "stroke#1");
    }

    #[test]
    fn distinct_documents_pass_through() {
        let hits = vec![hit("a#0", "a", 0.9), hit("b#0", "b", 0.8)];
        assert_eq!(dedup_by_document(hits).len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(dedup_by_document(Vec::new()).is_empty());
    }
}
