//! Retrieval evaluation harness
//!
//! Runs a labeled case set against the live index and reports ranking
//! quality (Precision@1/3/5, MRR) and retrieval latency percentiles
//! (P50/P95/P99). A chunk counts as relevant when its parent document id
//! is in the case's relevant set. The report records the index snapshot id
//! so numbers can be tied to the exact corpus state they measured.

use crate::retrieval::{RetrievalError, Retriever};
use crate::{MedragError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// Ranking cutoffs reported by the harness
pub const PRECISION_KS: [usize; 3] = [1, 3, 5];

/// One labeled evaluation case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    /// Document ids considered relevant for this query
    pub relevant_doc_ids: Vec<String>,
}

/// Mean precision at each cutoff plus mean reciprocal rank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingMetrics {
    pub precision_at_1: f64,
    pub precision_at_3: f64,
    pub precision_at_5: f64,
    pub mrr: f64,
}

/// Retrieval latency distribution in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub samples: usize,
}

/// Full evaluation report, serialized to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Index snapshot the numbers were measured against
    pub snapshot_id: Uuid,
    pub generated_at: String,
    pub num_cases: usize,
    pub index_size: usize,
    pub ranking: RankingMetrics,
    pub latency: LatencyMetrics,
}

/// Per-case ranking scores, kept for report detail and tests
#[derive(Debug, Clone)]
struct CaseScores {
    precision: [f64; 3],
    reciprocal_rank: f64,
}

/// Evaluation harness over a retriever
pub struct EvalHarness<'a> {
    retriever: &'a Retriever,
    latency_iterations: usize,
}

impl<'a> EvalHarness<'a> {
    pub fn new(retriever: &'a Retriever, latency_iterations: usize) -> Self {
        Self {
            retriever,
            latency_iterations,
        }
    }

    /// Run all cases and aggregate into a report
    pub fn run(&self, cases: &[EvalCase], snapshot_id: Uuid, index_size: usize) -> Result<EvalReport> {
        if cases.is_empty() {
            return Err(MedragError::Config(
                "Evaluation case set is empty".to_string(),
            ));
        }

        let max_k = PRECISION_KS[PRECISION_KS.len() - 1];
        let mut all_scores = Vec::with_capacity(cases.len());
        let mut latencies_ms = Vec::with_capacity(cases.len() * self.latency_iterations);

        for case in cases {
            let hits = self.ranked_doc_ids(&case.query, max_k)?;
            all_scores.push(score_case(&hits, &case.relevant_doc_ids));

            // Timed repetitions; the ranking run above is the warm-up
            for _ in 0..self.latency_iterations {
                let start = Instant::now();
                self.ranked_doc_ids(&case.query, max_k)?;
                latencies_ms.push(start.elapsed().as_secs_f64() * 1000.0);
            }
        }

        let n = all_scores.len() as f64;
        let mean = |f: &dyn Fn(&CaseScores) -> f64| all_scores.iter().map(|s| f(s)).sum::<f64>() / n;

        let ranking = RankingMetrics {
            precision_at_1: mean(&|s| s.precision[0]),
            precision_at_3: mean(&|s| s.precision[1]),
            precision_at_5: mean(&|s| s.precision[2]),
            mrr: mean(&|s| s.reciprocal_rank),
        };

        latencies_ms.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let latency = LatencyMetrics {
            mean_ms: latencies_ms.iter().sum::<f64>() / latencies_ms.len() as f64,
            p50_ms: percentile(&latencies_ms, 0.50),
            p95_ms: percentile(&latencies_ms, 0.95),
            p99_ms: percentile(&latencies_ms, 0.99),
            samples: latencies_ms.len(),
        };

        tracing::info!(
            "Evaluation: {} cases, P@1 {:.2}, MRR {:.2}, P95 {:.1}ms",
            cases.len(),
            ranking.precision_at_1,
            ranking.mrr,
            latency.p95_ms
        );

        Ok(EvalReport {
            snapshot_id,
            generated_at: chrono::Utc::now().to_rfc3339(),
            num_cases: cases.len(),
            index_size,
            ranking,
            latency,
        })
    }

    /// Ranked parent document ids for a query, threshold disabled so the
    /// cutoff metrics see a full top-k list
    fn ranked_doc_ids(&self, query: &str, k: usize) -> std::result::Result<Vec<String>, RetrievalError> {
        let hits = self.retriever.search_raw(query, k, Some(-1.0))?;
        Ok(hits.into_iter().map(|h| h.record.doc_id).collect())
    }
}

/// Precision at each cutoff and reciprocal rank for one ranked list
fn score_case(ranked_doc_ids: &[String], relevant: &[String]) -> CaseScores {
    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();

    let mut precision = [0.0f64; 3];
    for (slot, &k) in PRECISION_KS.iter().enumerate() {
        let hits_in_k = ranked_doc_ids
            .iter()
            .take(k)
            .filter(|id| relevant.contains(id.as_str()))
            .count();
        precision[slot] = hits_in_k as f64 / k as f64;
    }

    let reciprocal_rank = ranked_doc_ids
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0);

    CaseScores {
        precision,
        reciprocal_rank,
    }
}

/// Percentile over a sorted slice: the element at floor(n * q), clamped
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * q) as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Load evaluation cases from a JSON file (array of case objects)
pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let content = std::fs::read_to_string(path).map_err(|e| MedragError::Io {
        source: e,
        context: format!("Failed to read eval cases: {:?}", path),
    })?;
    let cases: Vec<EvalCase> = serde_json::from_str(&content).map_err(|e| MedragError::Json {
        source: e,
        context: format!("Failed to parse eval cases: {:?}", path),
    })?;
    Ok(cases)
}

/// Write the report as pretty JSON
pub fn save_report(report: &EvalReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MedragError::Io {
            source: e,
            context: format!("Failed to create report directory: {:?}", parent),
        })?;
    }
    let content = serde_json::to_string_pretty(report).map_err(|e| MedragError::Json {
        source: e,
        context: "Failed to serialize eval report".to_string(),
    })?;
    std::fs::write(path, content).map_err(|e| MedragError::Io {
        source: e,
        context: format!("Failed to write eval report: {:?}", path),
    })?;
    Ok(())
}
