//! Recursive, overlap-aware text chunker.
//!
//! Splits a [`Document`] into [`Chunk`]s of at most `chunk_size` characters.
//! Splitting tries an ordered list of separators, coarsest first (paragraph
//! break, line break, space), and falls back to a hard character cut (`""`).
//! A piece that still exceeds the limit is split again with the next finer
//! separator. Small pieces are then merged greedily back up to the limit,
//! carrying up to `overlap` characters of trailing context into the next
//! chunk.
//!
//! Chunk sequence numbers are assigned per document, from 0, in output
//! order. The chunk id is `"{source_id}_{index}"`.

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::error::{QaError, Result};
use crate::models::{Chunk, ChunkMetadata, Document};

/// Split one document into overlapping chunks.
///
/// A whitespace-only document yields zero chunks. Any other document yields
/// at least one.
pub fn split(
    document: &Document,
    chunk_size: usize,
    overlap: usize,
    separators: &[String],
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(QaError::invalid("chunk_size must be > 0"));
    }
    if overlap >= chunk_size {
        return Err(QaError::invalid(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    if document.source_id.is_empty() {
        return Err(QaError::invalid("document source_id must not be empty"));
    }

    if document.content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let pieces = split_text(&document.content, separators, chunk_size, overlap);

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| make_chunk(document, index, text))
        .collect())
}

/// Chunk a batch of documents. Numbering restarts at 0 for every document.
pub fn split_all(documents: &[Document], config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for doc in documents {
        let doc_chunks = split(
            doc,
            config.chunk_size,
            config.chunk_overlap,
            &config.separators,
        )?;
        tracing::debug!(source_id = %doc.source_id, chunks = doc_chunks.len(), "split document");
        chunks.extend(doc_chunks);
    }
    Ok(chunks)
}

fn split_text(text: &str, separators: &[String], chunk_size: usize, overlap: usize) -> Vec<String> {
    // Pick the coarsest separator present in the text
    let mut separator: &str = separators.last().map(String::as_str).unwrap_or("");
    let mut finer: &[String] = &[];
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            separator = "";
            finer = &[];
            break;
        }
        if text.contains(sep.as_str()) {
            separator = sep;
            finer = &separators[i + 1..];
            break;
        }
    }

    let splits: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    };

    let mut chunks = Vec::new();
    let mut small: Vec<&str> = Vec::new();

    for piece in splits {
        if char_len(piece) < chunk_size {
            small.push(piece);
            continue;
        }

        if !small.is_empty() {
            chunks.extend(merge_splits(&small, separator, chunk_size, overlap));
            small.clear();
        }

        if finer.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        } else {
            chunks.extend(split_text(piece, finer, chunk_size, overlap));
        }
    }

    if !small.is_empty() {
        chunks.extend(merge_splits(&small, separator, chunk_size, overlap));
    }

    chunks
}

/// Greedily merge pieces into windows of at most `chunk_size` characters,
/// keeping up to `overlap` characters of the previous window.
fn merge_splits(
    splits: &[&str],
    separator: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut merged = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in splits {
        let len = char_len(piece);
        let joiner = if current.is_empty() { 0 } else { sep_len };

        if total + len + joiner > chunk_size && !current.is_empty() {
            if let Some(window) = join_window(&current, separator) {
                merged.push(window);
            }

            // Drop from the front until only the overlap remains and the next piece fits
            while total > overlap
                || (total > 0
                    && total + len + if current.is_empty() { 0 } else { sep_len } > chunk_size)
            {
                let had_more = current.len() > 1;
                let Some(first) = current.pop_front() else {
                    break;
                };
                let removed = char_len(first) + if had_more { sep_len } else { 0 };
                total = total.saturating_sub(removed);
            }
        }

        current.push_back(piece);
        total += len + if current.len() > 1 { sep_len } else { 0 };
    }

    if let Some(window) = join_window(&current, separator) {
        merged.push(window);
    }

    merged
}

fn join_window(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(document: &Document, index: usize, content: String) -> Chunk {
    Chunk {
        content,
        metadata: ChunkMetadata {
            source_id: document.source_id.clone(),
            file_path: document.file_path.clone(),
            created_at: document.created_at,
            chunk_id: format!("{}_{}", document.source_id, index),
            chunk_index: index,
        },
    }
}
