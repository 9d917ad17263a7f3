use crate::config::Config;
use crate::error::{MedragError, Result, ValidationError};
use std::collections::HashSet;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_ingest(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_evaluation(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MedragError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.ingest.chunk_size == 0 {
            errors.push(ValidationError::new(
                "ingest.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        // Chunker clamps overlap to half the chunk size; reject values the
        // clamp would silently ignore
        if config.ingest.chunk_overlap > config.ingest.chunk_size / 2 {
            errors.push(ValidationError::new(
                "ingest.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be at most half the chunk size ({})",
                    config.ingest.chunk_overlap,
                    config.ingest.chunk_size / 2
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.embedding.mode;
        if mode != "offline" && mode != "online" {
            errors.push(ValidationError::new(
                "embedding.mode",
                format!("Mode must be 'offline' or 'online', got '{}'", mode),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.index_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "index.index_dir",
                "Index directory path cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        let threshold = config.retrieval.score_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "retrieval.score_threshold",
                format!("Score threshold must be in [-1.0, 1.0], got {}", threshold),
            ));
        }

        if config.retrieval.context_token_budget == 0 {
            errors.push(ValidationError::new(
                "retrieval.context_token_budget",
                "Context token budget must be greater than 0",
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.generation.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "generation.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        if config.generation.max_tokens == 0 {
            errors.push(ValidationError::new(
                "generation.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        let mut names = HashSet::new();
        for (i, provider) in config.generation.providers.iter().enumerate() {
            let prefix = format!("generation.providers[{}]", i);

            if provider.name.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.name", prefix),
                    "Provider name cannot be empty",
                ));
            } else if !names.insert(provider.name.clone()) {
                errors.push(ValidationError::new(
                    format!("{}.name", prefix),
                    format!("Duplicate provider name: {}", provider.name),
                ));
            }

            if provider.endpoint.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.endpoint", prefix),
                    "Provider endpoint cannot be empty",
                ));
            }

            if provider.model.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.model", prefix),
                    "Provider model cannot be empty",
                ));
            }

            if provider.timeout_ms == 0 {
                errors.push(ValidationError::new(
                    format!("{}.timeout_ms", prefix),
                    "Provider timeout must be greater than 0",
                ));
            }
        }
    }

    fn validate_evaluation(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.evaluation.latency_iterations == 0 {
            errors.push(ValidationError::new(
                "evaluation.latency_iterations",
                "Latency iterations must be greater than 0",
            ));
        }
    }
}
