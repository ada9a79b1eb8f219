//! Index and feedback overview.
//!
//! Used by `docqa stats` and `GET /stats` to show what is indexed and how
//! answers have been rated.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::feedback::{FeedbackStats, FeedbackStore};
use crate::index::IndexHandle;
use crate::qa::QaEngine;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub index_path: String,
    pub index_size_bytes: u64,
    /// `None` until the first build.
    pub index: Option<IndexHandle>,
    pub embedding_model: String,
    pub generation_model: String,
    pub feedback: FeedbackStats,
}

/// Gathers stats from a live engine and feedback store.
pub async fn collect(engine: &QaEngine, feedback: &FeedbackStore) -> crate::error::Result<Stats> {
    let index = engine.index();
    Ok(Stats {
        index_path: index.path().display().to_string(),
        index_size_bytes: std::fs::metadata(index.path()).map(|m| m.len()).unwrap_or(0),
        index: index.handle().await?,
        embedding_model: index.model_name().to_string(),
        generation_model: engine.generator_model().to_string(),
        feedback: feedback.stats()?,
    })
}

/// Run the stats command: open the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let engine = QaEngine::from_config(config).await?;
    let feedback = FeedbackStore::new(config.paths.feedback_path());
    let stats = collect(&engine, &feedback).await?;
    print!("{}", render(&stats));
    engine.index().close().await;
    Ok(())
}

fn render(stats: &Stats) -> String {
    let mut out = String::new();
    out.push_str("docqa stats\n");
    out.push_str("===========\n\n");
    out.push_str(&format!("  Index:       {}\n", stats.index_path));
    out.push_str(&format!("  Size:        {}\n", format_bytes(stats.index_size_bytes)));

    match &stats.index {
        Some(handle) => {
            out.push_str(&format!("  Entries:     {}\n", handle.entry_count));
            out.push_str(&format!("  Model:       {} ({} dims)\n", handle.model, handle.dims));
            out.push_str(&format!("  Built:       {}\n", format_relative(handle.built_at)));
        }
        None => out.push_str("  Entries:     not built yet (run `docqa index`)\n"),
    }
    out.push_str(&format!("  Generator:   {}\n\n", stats.generation_model));

    let fb = &stats.feedback;
    out.push_str(&format!("  Feedback:    {} rating{}\n", fb.total, if fb.total == 1 { "" } else { "s" }));
    if let Some(avg) = fb.average_rating {
        out.push_str(&format!("  Average:     {:.2} / 5\n", avg));
        for (i, count) in fb.distribution.iter().enumerate() {
            out.push_str(&format!("    {} ★  {:>5}\n", i + 1, count));
        }
    }
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_relative(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
