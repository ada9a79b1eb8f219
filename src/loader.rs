//! Document loader for the extracted-text directory.
//!
//! Enumerates the directory non-recursively, keeps files whose name matches
//! one of the configured include globs, normalizes each file's content, and
//! wraps it as a [`Document`].
//!
//! Failure policy: an unreadable directory fails the whole load with
//! [`QaError::Io`]. A single unreadable file is logged and skipped so one
//! bad file never blocks the batch.

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{QaError, Result};
use crate::models::Document;
use crate::normalize::normalize;

/// Loads every recognized text file in `dir`.
///
/// Documents are returned sorted by `source_id` for stable display. Nothing
/// downstream depends on the order.
pub fn load(dir: &Path, include_globs: &[String]) -> Result<Vec<Document>> {
    let meta = std::fs::metadata(dir).map_err(|e| QaError::io("read directory", dir, e))?;
    if !meta.is_dir() {
        return Err(QaError::io(
            "read directory",
            dir,
            std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
        ));
    }

    let include_set = build_globset(include_globs)?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let io = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk failed"));
                return Err(QaError::io("read directory", dir, io));
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        if !include_set.is_match(&file_name) {
            continue;
        }

        match load_file(entry.path(), &file_name) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "skipping unreadable file");
            }
        }
    }

    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    tracing::info!(
        dir = %dir.display(),
        documents = documents.len(),
        "loaded documents"
    );
    Ok(documents)
}

fn load_file(path: &Path, file_name: &str) -> Result<Document> {
    let raw = std::fs::read_to_string(path).map_err(|e| QaError::io("read", path, e))?;

    Ok(Document {
        content: normalize(&raw),
        source_id: file_name.to_string(),
        file_path: path.display().to_string(),
        created_at: Utc::now(),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| QaError::Config(format!("invalid include glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| QaError::Config(format!("invalid include globs: {}", e)))
}
