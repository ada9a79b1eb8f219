//! Conversation export and import.
//!
//! An export is a single JSON object:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "conversations": [ { "question": "...", "answer": "..." } ]
//! }
//! ```
//!
//! A session that ends on an unanswered question cannot be written as pairs
//! without losing it, so it is exported as role-tagged records instead
//! (`{"role": "human", "content": "..."}`). Import accepts both shapes, which
//! also lets a raw message log seed `chat --resume`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{QaError, Result};
use crate::persist::write_json_atomic;
use crate::session::{Message, Role, Session, Turn};

#[derive(Serialize)]
struct ExportFile<'a> {
    timestamp: DateTime<Utc>,
    conversations: Conversations<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Conversations<'a> {
    Pairs(Vec<Turn>),
    Messages(&'a [Message]),
}

#[derive(Deserialize)]
struct ImportFile {
    #[serde(default)]
    conversations: Vec<ImportRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportRecord {
    Pair { question: String, answer: String },
    Message(Message),
}

/// Writes the session's history to `dest_dir`.
///
/// The file is named `name` (`.json` appended if missing), or
/// `chat_history_<YYYYmmdd_HHMMSS>.json` by default. Returns the written path.
pub fn export_history(session: &Session, dest_dir: &Path, name: Option<&str>) -> Result<PathBuf> {
    let now = Utc::now();
    let file_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => {
            if n.contains(['/', '\\']) || n == "." || n == ".." {
                return Err(QaError::invalid(format!(
                    "export name must be a plain file name, got '{}'",
                    n
                )));
            }
            if n.ends_with(".json") {
                n.to_string()
            } else {
                format!("{}.json", n)
            }
        }
        None => format!("chat_history_{}.json", now.format("%Y%m%d_%H%M%S")),
    };

    let path = dest_dir.join(file_name);
    let conversations = if session.messages().len() % 2 == 0 {
        Conversations::Pairs(session.as_pairs())
    } else {
        Conversations::Messages(session.messages())
    };
    write_json_atomic(
        &path,
        &ExportFile {
            timestamp: now,
            conversations,
        },
    )?;

    tracing::info!(
        path = %path.display(),
        messages = session.messages().len(),
        "exported conversation"
    );
    Ok(path)
}

/// Rebuilds a session from an export file.
pub fn import_history(path: &Path) -> Result<Session> {
    let content = std::fs::read_to_string(path).map_err(|e| QaError::io("read", path, e))?;
    let file: ImportFile = serde_json::from_str(&content)?;

    let mut messages = Vec::with_capacity(file.conversations.len() * 2);
    for record in file.conversations {
        match record {
            ImportRecord::Pair { question, answer } => {
                messages.push(Message {
                    role: Role::Human,
                    content: question,
                });
                messages.push(Message {
                    role: Role::Assistant,
                    content: answer,
                });
            }
            ImportRecord::Message(msg) => messages.push(msg),
        }
    }

    let session = Session::from_messages(messages)?;
    tracing::info!(path = %path.display(), turns = session.turn_count(), "imported conversation");
    Ok(session)
}
