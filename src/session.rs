//! Conversation history for one user session.
//!
//! A [`Session`] stores role-tagged messages that strictly alternate
//! `human`, `assistant`, `human`, ... The question/answer pairs the prompt
//! builder needs are derived from the messages on demand, so the two views
//! can never drift apart.
//!
//! Sessions are plain values. The caller owns them and passes `&mut` to the
//! orchestrator; nothing here is synchronized.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{QaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Human => write!(f, "human"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    messages: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a session from stored messages.
    ///
    /// Roles must alternate starting with `human`. A trailing unanswered
    /// question is accepted.
    pub fn from_messages(messages: Vec<Message>) -> Result<Self> {
        for (i, msg) in messages.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::Human } else { Role::Assistant };
            if msg.role != expected {
                return Err(QaError::invalid(format!(
                    "message {} has role '{}', expected '{}'",
                    i, msg.role, expected
                )));
            }
        }
        Ok(Self { messages })
    }

    /// Records a completed turn: one human and one assistant message.
    pub fn append(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.messages.push(Message {
            role: Role::Human,
            content: question.into(),
        });
        self.messages.push(Message {
            role: Role::Assistant,
            content: answer.into(),
        });
    }

    /// Completed turns in chronological order.
    pub fn as_pairs(&self) -> Vec<Turn> {
        self.messages
            .chunks_exact(2)
            .map(|pair| Turn {
                question: pair[0].content.clone(),
                answer: pair[1].content.clone(),
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn turn_count(&self) -> usize {
        self.messages.len() / 2
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
