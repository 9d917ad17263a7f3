use clap::Parser;
use medrag::cli::{Cli, Commands, ConfigAction};
use medrag::config::Config;
use medrag::embedding::{CachedEmbedder, EmbeddingProvider, FastEmbedProvider, HashingEmbedder};
use medrag::eval::{load_cases, save_report, EvalHarness};
use medrag::index::VectorIndex;
use medrag::ingest::{Document, DocumentMetadata};
use medrag::pipeline::RagPipeline;
use medrag::retrieval::RetrievalQuery;
use medrag::{MedragError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medrag=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { input } => {
            let config = load_config(&config_path)?;
            cmd_ingest(config, &input)
        }
        Commands::Query {
            question,
            top_k,
            json,
        } => {
            let config = load_config(&config_path)?;
            cmd_query(config, question, top_k, json).await
        }
        Commands::Eval { cases, output } => {
            let config = load_config(&config_path)?;
            cmd_eval(config, &cases, output)
        }
        Commands::Stats => {
            let config = load_config(&config_path)?;
            cmd_stats(config)
        }
        Commands::Config { action } => cmd_config(&config_path, action),
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::default_path(),
    }
}

/// Load the config file, or fall back to defaults when none exists yet
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        tracing::debug!("No config file at {:?}, using defaults", path);
        Ok(Config::default())
    }
}

fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let inner: Arc<dyn EmbeddingProvider> = match config.embedding.mode.as_str() {
        "offline" => Arc::new(HashingEmbedder::new(config.embedding.dimension)),
        _ => Arc::new(FastEmbedProvider::new(&config.embedding.model)?),
    };
    Ok(Arc::new(CachedEmbedder::new(inner)))
}

/// Open the persisted index if one exists, otherwise start empty
fn open_index(config: &Config) -> Result<Arc<VectorIndex>> {
    let dir = &config.index.index_dir;
    if dir.join("manifest.json").exists() {
        let index = VectorIndex::load(dir)?;
        if index.dimension() != config.embedding.dimension {
            return Err(MedragError::Config(format!(
                "Persisted index dimension {} does not match configured embedding dimension {}",
                index.dimension(),
                config.embedding.dimension
            )));
        }
        Ok(Arc::new(index))
    } else {
        Ok(Arc::new(VectorIndex::new(
            config.embedding.dimension,
            config.index.metric,
        )))
    }
}

fn build_pipeline(config: Config) -> Result<RagPipeline> {
    let embedder = build_embedder(&config)?;
    let index = open_index(&config)?;
    Ok(RagPipeline::new(config, embedder, index))
}

fn cmd_ingest(config: Config, input: &Path) -> Result<()> {
    let index_dir = config.index.index_dir.clone();
    let pipeline = build_pipeline(config)?;

    let documents = load_documents(input)?;
    if documents.is_empty() {
        println!("No documents found at {:?}", input);
        return Ok(());
    }

    let report = pipeline.ingest(documents)?;
    pipeline.index().persist(&index_dir)?;

    println!(
        "Ingested {}/{} documents ({} chunks indexed)",
        report.succeeded, report.documents, report.chunks_indexed
    );
    for failure in &report.failures {
        println!("  skipped {}: {}", failure.doc_id, failure.error);
    }
    println!("Index persisted to {:?}", index_dir);
    Ok(())
}

/// Load documents from a JSON array file or a directory of text files
fn load_documents(input: &Path) -> Result<Vec<Document>> {
    if input.is_file() {
        let content = std::fs::read_to_string(input).map_err(|e| MedragError::Io {
            source: e,
            context: format!("Failed to read {:?}", input),
        })?;
        let documents: Vec<Document> =
            serde_json::from_str(&content).map_err(|e| MedragError::Json {
                source: e,
                context: format!("Failed to parse documents from {:?}", input),
            })?;
        return Ok(documents);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
        .map_err(|e| MedragError::Io {
            source: e,
            context: format!("Failed to read directory {:?}", input),
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|s| s.to_str()),
                Some("md") | Some("txt")
            )
        })
        .collect();
    entries.sort();

    let mut documents = Vec::with_capacity(entries.len());
    for path in entries {
        let text = std::fs::read_to_string(&path).map_err(|e| MedragError::Io {
            source: e,
            context: format!("Failed to read {:?}", path),
        })?;
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        let source = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        documents.push(Document {
            id,
            source,
            text,
            metadata: DocumentMetadata::default(),
        });
    }
    Ok(documents)
}

async fn cmd_query(
    config: Config,
    question: String,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let mut query = RetrievalQuery::new(question);
    query.top_k = top_k;

    let response = pipeline.query(query).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).map_err(|e| MedragError::Json {
                source: e,
                context: "Failed to serialize query response".to_string(),
            })?
        );
        return Ok(());
    }

    println!("{}\n", response.answer);
    if response.degraded {
        println!("(degraded response: no language model was reachable)");
    }
    if !response.citations.is_empty() {
        println!("Sources:");
        for citation in &response.citations {
            println!(
                "  [{}] {} (score {:.2})",
                citation.index, citation.source, citation.score
            );
        }
    }
    println!(
        "\nAnswered by '{}' in {:.0}ms (retrieve {:.0}ms, generate {:.0}ms)",
        response.provider,
        response.timings.total_ms,
        response.timings.embed_ms + response.timings.search_ms + response.timings.assemble_ms,
        response.timings.generate_ms
    );
    Ok(())
}

fn cmd_eval(config: Config, cases_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let output_dir = output.unwrap_or_else(|| config.evaluation.output_dir.clone());
    let latency_iterations = config.evaluation.latency_iterations;
    let pipeline = build_pipeline(config)?;

    if pipeline.index().is_empty() {
        return Err(MedragError::Config(
            "Cannot evaluate against an empty index; run ingest first".to_string(),
        ));
    }

    let cases = load_cases(cases_path)?;
    let harness = EvalHarness::new(pipeline.retriever(), latency_iterations);
    let report = harness.run(
        &cases,
        pipeline.index().snapshot_id(),
        pipeline.index().len(),
    )?;

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let stamped = output_dir.join(format!("eval-{}.json", stamp));
    save_report(&report, &stamped)?;
    save_report(&report, &output_dir.join("eval_latest.json"))?;

    println!("Evaluation over {} cases (index snapshot {}):", report.num_cases, report.snapshot_id);
    println!("  Precision@1: {:.3}", report.ranking.precision_at_1);
    println!("  Precision@3: {:.3}", report.ranking.precision_at_3);
    println!("  Precision@5: {:.3}", report.ranking.precision_at_5);
    println!("  MRR:         {:.3}", report.ranking.mrr);
    println!(
        "  Latency:     p50 {:.1}ms, p95 {:.1}ms, p99 {:.1}ms ({} samples)",
        report.latency.p50_ms, report.latency.p95_ms, report.latency.p99_ms, report.latency.samples
    );
    println!("Report written to {:?}", stamped);
    Ok(())
}

fn cmd_stats(config: Config) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let stats = pipeline.stats();

    println!("Index snapshot: {}", stats.snapshot_id);
    println!("  Chunks:     {}", stats.index.total_chunks);
    println!("  Documents:  {}", stats.index.unique_documents);
    println!("  Sources:    {}", stats.index.unique_sources);
    if !stats.index.categories.is_empty() {
        println!("  Categories:");
        for (category, count) in &stats.index.categories {
            println!("    {}: {}", category, count);
        }
    }
    println!(
        "Embedding: {} ({}D)",
        stats.embedding_model, stats.embedding_dimension
    );
    println!("Providers: {}", stats.providers.join(" -> "));
    Ok(())
}

fn cmd_config(path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(path)?;
            let content = toml::to_string_pretty(&config)?;
            println!("{}", content);
            Ok(())
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                return Err(MedragError::Config(format!(
                    "Config file already exists at {:?} (use --force to overwrite)",
                    path
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| MedragError::Io {
                    source: e,
                    context: format!("Failed to create config directory {:?}", parent),
                })?;
            }
            Config::default().save(path)?;
            println!("Wrote default configuration to {:?}", path);
            Ok(())
        }
        ConfigAction::Validate => {
            Config::load(path)?;
            println!("Configuration at {:?} is valid", path);
            Ok(())
        }
    }
}
