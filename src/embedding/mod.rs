//! Embedding generation
//!
//! Architecture:
//! - `EmbeddingProvider` trait for abstraction over backends
//! - `FastEmbedProvider` for local model inference (all-MiniLM-L6-v2, 384-dim)
//! - `HashingEmbedder` for deterministic offline operation
//! - `CachedEmbedder` wrapper to avoid recomputing identical texts

mod cache;
mod hashing;
mod provider;

pub use cache::CachedEmbedder;
pub use hashing::HashingEmbedder;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
