//! Append-only store of answer ratings.
//!
//! Records live in one pretty-printed JSON array (`{data_dir}/feedback.json`).
//! Every write reads the whole array, appends, and atomically replaces the
//! file. One writer at a time is assumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{QaError, Result};
use crate::persist::write_json_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    /// 1 (worst) to 5 (best).
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackStats {
    pub total: usize,
    /// `None` when there is no feedback yet.
    pub average_rating: Option<f64>,
    /// Count per rating; index 0 holds rating 1.
    pub distribution: [usize; 5],
}

pub struct FeedbackStore {
    path: PathBuf,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one rating. A rating outside 1..=5 is rejected before any I/O.
    pub fn record_feedback(
        &self,
        question: &str,
        answer: &str,
        rating: u8,
        comment: Option<String>,
    ) -> Result<FeedbackRecord> {
        if !(1..=5).contains(&rating) {
            return Err(QaError::invalid(format!(
                "rating must be between 1 and 5, got {}",
                rating
            )));
        }

        let mut records = self.load()?;
        let record = FeedbackRecord {
            timestamp: Utc::now(),
            question: question.to_string(),
            answer: answer.to_string(),
            rating,
            comment,
        };
        records.push(record.clone());
        write_json_atomic(&self.path, &records)?;

        tracing::info!(rating, total = records.len(), "recorded feedback");
        Ok(record)
    }

    /// All records, oldest first. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<FeedbackRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QaError::io("read", &self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn stats(&self) -> Result<FeedbackStats> {
        let records = self.load()?;
        let mut distribution = [0usize; 5];
        let mut sum = 0u64;
        for r in &records {
            if (1..=5).contains(&r.rating) {
                distribution[(r.rating - 1) as usize] += 1;
                sum += r.rating as u64;
            }
        }
        let counted: usize = distribution.iter().sum();

        Ok(FeedbackStats {
            total: records.len(),
            average_rating: (counted > 0).then(|| sum as f64 / counted as f64),
            distribution,
        })
    }
}
