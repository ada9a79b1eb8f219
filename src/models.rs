//! Core data models shared by the pipeline stages.
//!
//! Documents come out of the loader, chunks out of the chunker, and scored
//! chunks out of the vector index. Source attributions are what an answer
//! reports back to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized text file, one per input file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    /// File name of the source text file.
    pub source_id: String,
    /// Path the file was read from.
    pub file_path: String,
    /// Load time.
    pub created_at: DateTime<Utc>,
}

/// Provenance carried by every chunk back to its origin document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_id: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    /// `"{source_id}_{chunk_index}"`, unique within a document.
    pub chunk_id: String,
    /// Position within the document's own split result, from 0.
    pub chunk_index: usize,
}

/// A bounded text window: the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity against the query embedding.
    pub score: f32,
}

/// Where a piece of an answer came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub content_excerpt: String,
    pub source_id: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub chunk_id: String,
}

impl SourceAttribution {
    /// Builds an attribution, keeping at most `excerpt_chars` characters of text.
    pub fn from_chunk(chunk: &Chunk, excerpt_chars: usize) -> Self {
        let content_excerpt = if chunk.content.chars().count() > excerpt_chars {
            let mut excerpt: String = chunk.content.chars().take(excerpt_chars).collect();
            excerpt.push_str("...");
            excerpt
        } else {
            chunk.content.clone()
        };

        Self {
            content_excerpt,
            source_id: chunk.metadata.source_id.clone(),
            file_path: chunk.metadata.file_path.clone(),
            created_at: chunk.metadata.created_at,
            chunk_id: chunk.metadata.chunk_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                source_id: "a.txt".to_string(),
                file_path: "texts/a.txt".to_string(),
                created_at: Utc::now(),
                chunk_id: "a.txt_0".to_string(),
                chunk_index: 0,
            },
        }
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let c = chunk("ação ação ação");
        let attr = SourceAttribution::from_chunk(&c, 4);
        assert_eq!(attr.content_excerpt, "ação...");
        assert_eq!(attr.chunk_id, "a.txt_0");
    }

    #[test]
    fn test_short_excerpt_kept_whole() {
        let c = chunk("short");
        let attr = SourceAttribution::from_chunk(&c, 200);
        assert_eq!(attr.content_excerpt, "short");
    }
}
