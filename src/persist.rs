//! Atomic JSON file writes.
//!
//! The payload is written to a temporary file in the destination directory
//! and renamed over the target, so readers see either the old file or the
//! complete new one.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::error::{QaError, Result};

/// Serializes `value` as pretty-printed UTF-8 JSON and atomically replaces `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| QaError::io("create directory", dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out.json".to_string());
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let written = std::fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(QaError::io("write", &tmp_path, e));
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(QaError::io("rename into", path, e));
    }

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote json");
    Ok(())
}
