//! Configuration management for medrag
//!
//! All tunable pipeline behavior is injected from here: embedding model and
//! dimension, similarity metric, retrieval defaults, the ordered generation
//! provider chain with per-provider timeouts, and evaluation settings.

use crate::error::{MedragError, Result};
use crate::index::SimilarityMetric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub ingest: IngestConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub evaluation: EvaluationConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Document chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters of trailing context carried into the next chunk
    pub chunk_overlap: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Embedding dimension; every vector in one index shares this
    pub dimension: usize,
    /// Batch size for ingestion-time embedding
    pub batch_size: usize,
    /// Operating mode: "offline" (deterministic hashing embedder) or
    /// "online" (fastembed model, downloaded on first use)
    pub mode: String,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Similarity metric used for ranking
    pub metric: SimilarityMetric,
    /// Directory holding the persisted index artifacts
    pub index_dir: PathBuf,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of chunks to retrieve per query
    pub top_k: usize,
    /// Minimum similarity score; chunks below it are dropped
    pub score_threshold: f32,
    /// Maximum assembled context size in (approximate) tokens
    pub context_token_budget: usize,
}

/// Generation configuration: an ordered provider chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Providers tried in order; may be empty (static fallback only)
    pub providers: Vec<ProviderConfig>,
    /// Sampling temperature passed to every provider
    pub temperature: f32,
    /// Maximum tokens requested from every provider
    pub max_tokens: u32,
}

/// A single generation provider in the fallback chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Tag reported in responses (e.g., "primary", "secondary")
    pub name: String,
    /// Chat-completions endpoint URL
    pub endpoint: String,
    /// Model identifier sent to the endpoint
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Per-attempt timeout; on expiry the chain advances
    pub timeout_ms: u64,
}

/// Evaluation harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Timed retrieval repetitions per case for latency percentiles
    pub latency_iterations: usize,
    /// Directory where evaluation reports are written
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MedragError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MedragError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| MedragError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: MEDRAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("MEDRAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__MODE" => {
                self.embedding.mode = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k =
                    value.parse().map_err(|_| MedragError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "RETRIEVAL__SCORE_THRESHOLD" => {
                self.retrieval.score_threshold =
                    value.parse().map_err(|_| MedragError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as float", value),
                    })?;
            }
            "RETRIEVAL__CONTEXT_TOKEN_BUDGET" => {
                self.retrieval.context_token_budget =
                    value.parse().map_err(|_| MedragError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MedragError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("medrag").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| MedragError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".medrag"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            ingest: IngestConfig {
                chunk_size: 500,
                chunk_overlap: 50,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
                mode: "online".to_string(),
            },
            index: IndexConfig {
                metric: SimilarityMetric::Cosine,
                index_dir: PathBuf::from("./data/index"),
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                score_threshold: 0.25,
                context_token_budget: 2000,
            },
            generation: GenerationConfig {
                providers: vec![
                    ProviderConfig {
                        name: "primary".to_string(),
                        endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
                        model: "llama-3.3-70b-versatile".to_string(),
                        api_key_env: "GROQ_API_KEY".to_string(),
                        timeout_ms: 20_000,
                    },
                    ProviderConfig {
                        name: "secondary".to_string(),
                        endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                        model: "gpt-3.5-turbo".to_string(),
                        api_key_env: "OPENAI_API_KEY".to_string(),
                        timeout_ms: 20_000,
                    },
                ],
                temperature: 0.3,
                max_tokens: 1500,
            },
            evaluation: EvaluationConfig {
                latency_iterations: 5,
                output_dir: PathBuf::from("./results"),
            },
        }
    }
}
