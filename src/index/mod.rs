//! Exact nearest-neighbor vector index
//!
//! Vectors and chunk metadata live in one immutable snapshot behind
//! `RwLock<Arc<Snapshot>>`. Readers clone the `Arc` and search without
//! holding the lock; writers build a new snapshot and swap it in, so a
//! search never observes an index mid-mutation and the vector count always
//! equals the metadata count.
//!
//! Persistence writes two artifacts (a raw vector blob and a metadata JSON
//! table, parallel by insertion order) named by snapshot id, then commits
//! them by renaming a small manifest over the old one. A crash anywhere
//! before the manifest rename leaves the previous complete pair in place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

const BLOB_MAGIC: &[u8; 8] = b"MEDRAGV1";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector blob and metadata table disagree. Fatal: the index must not
    /// be served in this state.
    #[error("Index corruption: vector count {vectors} != metadata count {metadata}")]
    Corruption { vectors: usize, metadata: usize },

    #[error("Index not found at {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid vector blob: {0}")]
    InvalidBlob(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

fn io_err(source: std::io::Error, context: impl Into<String>) -> IndexError {
    IndexError::Io {
        source,
        context: context.into(),
    }
}

/// Similarity metric used for ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Dot product over unit-normalized vectors; scores in [-1, 1]
    Cosine,
    /// Raw dot product over vectors as given
    Dot,
}

/// Chunk metadata stored alongside each vector, parallel by ordinal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub doc_id: String,
    pub source: String,
    pub ordinal: usize,
    pub text: String,
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Entry handed to `build`/`add`: one chunk with its embedding
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub record: ChunkRecord,
    pub embedding: Vec<f32>,
}

/// One search result: chunk id, similarity score, and the stored record
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
    pub record: ChunkRecord,
}

/// Summary statistics over the indexed corpus
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub unique_documents: usize,
    pub unique_sources: usize,
    pub categories: BTreeMap<String, usize>,
}

/// Immutable index state; replaced wholesale on every mutation
struct Snapshot {
    id: Uuid,
    vectors: Vec<Vec<f32>>,
    records: Vec<ChunkRecord>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            vectors: Vec::new(),
            records: Vec::new(),
        }
    }
}

/// Serialized metadata artifact: parallel table to the vector blob
#[derive(Serialize, Deserialize)]
struct MetadataFile {
    snapshot_id: Uuid,
    dimension: usize,
    metric: SimilarityMetric,
    records: Vec<ChunkRecord>,
}

/// Commit point for persistence: names the current artifact pair
#[derive(Serialize, Deserialize)]
struct Manifest {
    snapshot_id: Uuid,
    vectors_file: String,
    metadata_file: String,
    count: usize,
    dimension: usize,
    metric: SimilarityMetric,
}

/// Exact nearest-neighbor index over chunk embeddings
pub struct VectorIndex {
    dimension: usize,
    metric: SimilarityMetric,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl VectorIndex {
    /// Create a new empty index
    pub fn new(dimension: usize, metric: SimilarityMetric) -> Self {
        Self {
            dimension,
            metric,
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    /// Replace the entire index atomically.
    ///
    /// Any entry with a wrong dimension aborts the whole build before
    /// anything is swapped in; the previous snapshot stays live.
    pub fn build(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        let (vectors, records) = self.prepare(entries)?;

        let next = Arc::new(Snapshot {
            id: Uuid::new_v4(),
            vectors,
            records,
        });

        let mut guard = self.snapshot.write().unwrap();
        *guard = next;
        tracing::info!("Index rebuilt: {} chunks", guard.records.len());
        Ok(())
    }

    /// Incrementally insert entries; they become searchable on return.
    ///
    /// Copy-on-write: the new snapshot is assembled off to the side, so
    /// concurrent searches keep reading the old one until the swap.
    pub fn add(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        if entries.is_empty() {
            return Ok(());
        }
        let (new_vectors, new_records) = self.prepare(entries)?;

        let mut guard = self.snapshot.write().unwrap();
        let mut vectors = guard.vectors.clone();
        let mut records = guard.records.clone();
        vectors.extend(new_vectors);
        records.extend(new_records);

        *guard = Arc::new(Snapshot {
            id: Uuid::new_v4(),
            vectors,
            records,
        });
        tracing::debug!("Index extended to {} chunks", guard.records.len());
        Ok(())
    }

    /// Search for the k most similar chunks.
    ///
    /// Results are ordered by score descending; equal scores rank the
    /// earlier-inserted chunk first. With a threshold, chunks scoring below
    /// it are excluded even inside the top k, so fewer than k results may
    /// come back. Pure function of (snapshot, query, k, threshold).
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        // Clone the Arc and drop the lock before scoring
        let snapshot = self.snapshot.read().unwrap().clone();

        let query = match self.metric {
            SimilarityMetric::Cosine => l2_normalize(query.to_vec()),
            SimilarityMetric::Dot => query.to_vec(),
        };

        let mut scored: Vec<(usize, f32)> = snapshot
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, vector)| (ordinal, dot(&query, vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let hits = scored
            .into_iter()
            .filter(|(_, score)| threshold.map_or(true, |t| *score >= t))
            .take(k)
            .map(|(ordinal, score)| SearchHit {
                chunk_id: snapshot.records[ordinal].chunk_id.clone(),
                score,
                record: snapshot.records[ordinal].clone(),
            })
            .collect();

        Ok(hits)
    }

    /// Persist the current snapshot to `dir` as an atomic artifact pair
    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        let snapshot = self.snapshot.read().unwrap().clone();

        fs::create_dir_all(dir).map_err(|e| io_err(e, format!("create {:?}", dir)))?;

        let vectors_file = format!("vectors-{}.bin", snapshot.id);
        let metadata_file = format!("metadata-{}.json", snapshot.id);

        write_vector_blob(
            &dir.join(&vectors_file),
            self.dimension,
            &snapshot.vectors,
        )?;

        let metadata = MetadataFile {
            snapshot_id: snapshot.id,
            dimension: self.dimension,
            metric: self.metric,
            records: snapshot.records.to_vec(),
        };
        write_json_atomic(&dir.join(&metadata_file), &metadata)?;

        // Manifest rename is the commit point; until it lands, load still
        // sees the previous pair
        let manifest = Manifest {
            snapshot_id: snapshot.id,
            vectors_file: vectors_file.clone(),
            metadata_file: metadata_file.clone(),
            count: snapshot.records.len(),
            dimension: self.dimension,
            metric: self.metric,
        };
        write_json_atomic(&dir.join(MANIFEST_FILE), &manifest)?;

        remove_stale_artifacts(dir, &vectors_file, &metadata_file);

        tracing::info!(
            "Persisted index snapshot {} ({} chunks) to {:?}",
            snapshot.id,
            snapshot.records.len(),
            dir
        );
        Ok(())
    }

    /// Load a persisted index, verifying vector/metadata consistency.
    ///
    /// A count disagreement is fatal (`IndexError::Corruption`): the system
    /// must not start against a provably inconsistent index.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(IndexError::NotFound {
                path: dir.to_path_buf(),
            });
        }

        let manifest: Manifest = read_json(&manifest_path)?;
        let metadata: MetadataFile = read_json(&dir.join(&manifest.metadata_file))?;
        let vectors = read_vector_blob(&dir.join(&manifest.vectors_file), manifest.dimension)?;

        if vectors.len() != metadata.records.len() || vectors.len() != manifest.count {
            return Err(IndexError::Corruption {
                vectors: vectors.len(),
                metadata: metadata.records.len(),
            });
        }

        tracing::info!(
            "Loaded index snapshot {} ({} chunks) from {:?}",
            manifest.snapshot_id,
            manifest.count,
            dir
        );

        Ok(Self {
            dimension: manifest.dimension,
            metric: manifest.metric,
            snapshot: RwLock::new(Arc::new(Snapshot {
                id: manifest.snapshot_id,
                vectors,
                records: metadata.records,
            })),
        })
    }

    /// Check dimensions up front and normalize for the configured metric
    fn prepare(
        &self,
        entries: Vec<IndexEntry>,
    ) -> Result<(Vec<Vec<f32>>, Vec<ChunkRecord>), IndexError> {
        for entry in &entries {
            if entry.embedding.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.embedding.len(),
                });
            }
        }

        let mut vectors = Vec::with_capacity(entries.len());
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let vector = match self.metric {
                SimilarityMetric::Cosine => l2_normalize(entry.embedding),
                SimilarityMetric::Dot => entry.embedding,
            };
            vectors.push(vector);
            records.push(entry.record);
        }
        Ok((vectors, records))
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.snapshot.read().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Identity of the current snapshot; changes on every build/add
    pub fn snapshot_id(&self) -> Uuid {
        self.snapshot.read().unwrap().id
    }

    /// Corpus statistics over the current snapshot
    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot.read().unwrap().clone();

        let mut documents = std::collections::HashSet::new();
        let mut sources = std::collections::HashSet::new();
        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        for record in snapshot.records.iter() {
            documents.insert(record.doc_id.as_str());
            sources.insert(record.source.as_str());
            let category = record.category.as_deref().unwrap_or("uncategorized");
            *categories.entry(category.to_string()).or_insert(0) += 1;
        }

        IndexStats {
            total_chunks: snapshot.records.len(),
            unique_documents: documents.len(),
            unique_sources: sources.len(),
            categories,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Blob layout: magic, u32 dimension, u64 count, then count*dimension f32 LE
fn write_vector_blob(path: &Path, dimension: usize, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
    let tmp = path.with_extension("bin.tmp");
    {
        let mut file =
            fs::File::create(&tmp).map_err(|e| io_err(e, format!("create {:?}", tmp)))?;
        let mut buf =
            Vec::with_capacity(BLOB_MAGIC.len() + 12 + vectors.len() * dimension * 4);
        buf.extend_from_slice(BLOB_MAGIC);
        buf.extend_from_slice(&(dimension as u32).to_le_bytes());
        buf.extend_from_slice(&(vectors.len() as u64).to_le_bytes());
        for vector in vectors {
            for value in vector {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        file.write_all(&buf)
            .map_err(|e| io_err(e, format!("write {:?}", tmp)))?;
        file.sync_all()
            .map_err(|e| io_err(e, format!("sync {:?}", tmp)))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_err(e, format!("rename {:?} -> {:?}", tmp, path)))?;
    Ok(())
}

fn read_vector_blob(path: &Path, dimension: usize) -> Result<Vec<Vec<f32>>, IndexError> {
    let mut file = fs::File::open(path).map_err(|e| io_err(e, format!("open {:?}", path)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| io_err(e, format!("read {:?}", path)))?;

    if buf.len() < BLOB_MAGIC.len() + 12 || &buf[..BLOB_MAGIC.len()] != BLOB_MAGIC {
        return Err(IndexError::InvalidBlob(format!(
            "bad header in {:?}",
            path
        )));
    }

    let mut offset = BLOB_MAGIC.len();
    let dim = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
    offset += 4;
    let count = u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap()) as usize;
    offset += 8;

    if dim != dimension {
        return Err(IndexError::DimensionMismatch {
            expected: dimension,
            actual: dim,
        });
    }

    let expected_len = offset + count * dim * 4;
    if buf.len() != expected_len {
        return Err(IndexError::InvalidBlob(format!(
            "expected {} bytes, found {} in {:?}",
            expected_len,
            buf.len(),
            path
        )));
    }

    let mut vectors = Vec::with_capacity(count);
    for _ in 0..count {
        let mut vector = Vec::with_capacity(dim);
        for _ in 0..dim {
            vector.push(f32::from_le_bytes(
                buf[offset..offset + 4].try_into().unwrap(),
            ));
            offset += 4;
        }
        vectors.push(vector);
    }
    Ok(vectors)
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, content).map_err(|e| io_err(e, format!("write {:?}", tmp)))?;
    fs::rename(&tmp, path).map_err(|e| io_err(e, format!("rename {:?} -> {:?}", tmp, path)))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, IndexError> {
    let content = fs::read(path).map_err(|e| io_err(e, format!("read {:?}", path)))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Best-effort cleanup of artifact pairs superseded by the latest commit
fn remove_stale_artifacts(dir: &Path, keep_vectors: &str, keep_metadata: &str) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let stale = (name.starts_with("vectors-") && name != keep_vectors)
            || (name.starts_with("metadata-") && name != keep_metadata);
        if stale {
            if let Err(e) = fs::remove_file(entry.path()) {
                tracing::debug!("Failed to remove stale artifact {}: {}", name, e);
            }
        }
    }
}
