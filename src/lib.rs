//! medrag: retrieval-augmented clinical question answering
//!
//! The pipeline ingests guideline documents (chunk, embed, index), answers
//! questions by retrieving token-budgeted context from an exact
//! nearest-neighbor vector index, and generates answers through an ordered
//! provider fallback chain that degrades gracefully instead of failing.
//! An evaluation harness measures retrieval quality and latency against
//! labeled case sets.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod pipeline;
pub mod retrieval;

pub use error::{MedragError, Result};
