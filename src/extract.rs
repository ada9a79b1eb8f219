//! PDF text extraction into the text directory.
//!
//! Every `*.pdf` in the inbox becomes `<stem>.txt` in the output directory,
//! normalized with [`normalize`](crate::normalize::normalize). A PDF that
//! fails to parse is logged and reported, and the rest of the batch
//! continues.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{QaError, Result};
use crate::normalize::normalize;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extracts plain text from PDF bytes.
pub fn extract_pdf(bytes: &[u8]) -> std::result::Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub pdf: String,
    pub output: PathBuf,
    pub chars: usize,
    pub words: usize,
}

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub extracted: Vec<ExtractedFile>,
    /// `(file name, error)` for every PDF that was skipped.
    pub failed: Vec<(String, String)>,
}

/// Converts every PDF in `pdf_dir` into a `.txt` file in `text_dir`.
pub fn extract_directory(pdf_dir: &Path, text_dir: &Path) -> Result<ExtractReport> {
    let entries = std::fs::read_dir(pdf_dir).map_err(|e| QaError::io("read directory", pdf_dir, e))?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    pdfs.sort();

    if pdfs.is_empty() {
        tracing::warn!(dir = %pdf_dir.display(), "no PDF files found");
        return Ok(ExtractReport::default());
    }

    std::fs::create_dir_all(text_dir).map_err(|e| QaError::io("create directory", text_dir, e))?;
    tracing::info!(dir = %pdf_dir.display(), count = pdfs.len(), "extracting PDFs");

    let mut report = ExtractReport::default();
    for pdf in &pdfs {
        let name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let text = match std::fs::read(pdf)
            .map_err(|e| e.to_string())
            .and_then(|bytes| extract_pdf(&bytes).map_err(|e| e.to_string()))
        {
            Ok(text) => normalize(&text),
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "skipping PDF");
                report.failed.push((name, e));
                continue;
            }
        };

        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());
        let output = text_dir.join(format!("{}.txt", stem));
        std::fs::write(&output, &text).map_err(|e| QaError::io("write", &output, e))?;

        let file = ExtractedFile {
            pdf: name,
            output,
            chars: text.chars().count(),
            words: text.split_whitespace().count(),
        };
        tracing::info!(
            file = %file.pdf,
            chars = file.chars,
            words = file.words,
            "extracted"
        );
        report.extracted.push(file);
    }

    Ok(report)
}
