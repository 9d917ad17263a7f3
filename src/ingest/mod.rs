//! Document model and deterministic chunking
//!
//! Documents arrive from the acquisition collaborator as finished records;
//! this module only splits them into indexable chunks. Splitting prefers
//! paragraph boundaries, falls back to word-level splitting for oversized
//! paragraphs, and carries a character overlap between consecutive chunks.
//! The same document always produces the same chunks.

use serde::{Deserialize, Serialize};

/// Free-form document metadata supplied by the acquisition layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An immutable source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Globally unique document id
    pub id: String,
    /// Source identifier (filename, URL, registry key)
    pub source: String,
    /// Raw document text
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

/// A bounded text span derived from a document; never mutated after creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Globally unique chunk id ("<doc_id>#<ordinal>")
    pub id: String,
    /// Parent document id
    pub doc_id: String,
    /// Source identifier inherited from the document
    pub source: String,
    /// Position of this chunk within the document
    pub ordinal: usize,
    /// Chunk text
    pub text: String,
    /// Approximate token count of the text
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Approximate token count as whitespace-separated words.
///
/// The context budget and chunk token counts both use this measure, so the
/// budget comparison is internally consistent even though it is not an
/// exact model tokenization.
pub fn approx_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Fixed-size/overlap document splitter
#[derive(Debug, Clone)]
pub struct Chunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Characters of trailing context carried into the next chunk
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        // Overlap must leave room for new content in every chunk
        let overlap = overlap.min(chunk_size / 2);
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Split a document into chunks, preferring paragraph boundaries
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let text = doc.text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let pieces = if text.len() <= self.chunk_size {
            vec![text.to_string()]
        } else {
            self.split_text(text)
        };

        pieces
            .into_iter()
            .enumerate()
            .map(|(ordinal, piece)| {
                let token_count = approx_token_count(&piece);
                Chunk {
                    id: format!("{}#{}", doc.id, ordinal),
                    doc_id: doc.id.clone(),
                    source: doc.source.clone(),
                    ordinal,
                    text: piece,
                    token_count,
                    category: doc.metadata.category.clone(),
                    title: doc.metadata.title.clone(),
                }
            })
            .collect()
    }

    /// Split all documents, preserving input order
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect();
        tracing::debug!(
            "Chunked {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );
        chunks
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        // Pack paragraphs up to chunk_size; split oversized paragraphs on words
        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();

        for para in text.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            if current.len() + para.len() + 2 <= self.chunk_size {
                if current.is_empty() {
                    current.push_str(para);
                } else {
                    current.push_str("\n\n");
                    current.push_str(para);
                }
                continue;
            }

            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }

            if para.len() > self.chunk_size {
                for word in para.split_whitespace() {
                    if current.len() + word.len() + 1 > self.chunk_size && !current.is_empty() {
                        pieces.push(std::mem::take(&mut current));
                    }
                    if current.is_empty() {
                        current.push_str(word);
                    } else {
                        current.push(' ');
                        current.push_str(word);
                    }
                }
            } else {
                current.push_str(para);
            }
        }

        if !current.is_empty() {
            pieces.push(current);
        }

        self.apply_overlap(pieces)
    }

    fn apply_overlap(&self, pieces: Vec<String>) -> Vec<String> {
        if self.overlap == 0 || pieces.len() < 2 {
            return pieces;
        }

        let mut result = Vec::with_capacity(pieces.len());
        for (i, piece) in pieces.iter().enumerate() {
            if i == 0 {
                result.push(piece.clone());
                continue;
            }
            let prev = &pieces[i - 1];
            let tail = overlap_tail(prev, self.overlap);
            if tail.is_empty() {
                result.push(piece.clone());
            } else {
                result.push(format!("{} {}", tail, piece));
            }
        }
        result
    }
}

/// Last `max_chars` of `text`, trimmed to a word boundary
fn overlap_tail(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    // The byte offset may land inside a multi-byte code point; move it to
    // the next boundary before slicing
    let mut start = text.len() - max_chars;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    // Walk forward to the next word boundary so we never cut a word in half
    match text[start..].find(char::is_whitespace) {
        Some(offset) => text[start + offset..].trim_start(),
        None => "",
    }
}
