//! # docqa
//!
//! A local-first document question-answering assistant.
//!
//! PDFs are extracted to plain text, normalized, split into overlapping
//! chunks, embedded into a SQLite-backed vector index, and used as retrieved
//! context for conversational answers from a language model. Every answer
//! carries the chunks it was grounded on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//! │ Extract  │──▶│ Normalize  │──▶│  Chunk   │──▶│  Index   │
//! │  (PDF)   │   │  + Load    │   │          │   │ SQLite   │
//! └──────────┘   └────────────┘   └──────────┘   └────┬─────┘
//!                                                     │ top-k
//!                      ┌──────────┐   ┌──────────┐    ▼
//!                      │ Session  │◀─▶│ QaEngine │──▶ generator
//!                      └──────────┘   └────┬─────┘
//!                                  ┌───────┴───────┐
//!                                  ▼               ▼
//!                             ┌─────────┐     ┌─────────┐
//!                             │   CLI   │     │  HTTP   │
//!                             └─────────┘     └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init                    # create directories and the index database
//! docqa extract                 # pdfs/ -> extracted_texts/
//! docqa index                   # chunk and embed the text directory
//! docqa ask "What does the warranty cover?"
//! docqa chat                    # interactive session with feedback
//! docqa serve                   # JSON API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and profiles |
//! | [`error`] | Library error taxonomy |
//! | [`normalize`] | Text cleanup |
//! | [`extract`] | PDF to text conversion |
//! | [`loader`] | Text directory loader |
//! | [`chunk`] | Recursive character splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persistent vector index |
//! | [`generation`] | Generation provider abstraction |
//! | [`prompt`] | Context and prompt rendering |
//! | [`session`] | Conversation history |
//! | [`qa`] | Question-answering orchestration |
//! | [`feedback`] | Answer ratings |
//! | [`export`] | Conversation export and import |
//! | [`persist`] | Atomic JSON writes |
//! | [`stats`] | Index and feedback overview |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command runners |
//! | [`logging`] | Tracing setup |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod extract;
pub mod feedback;
pub mod generation;
pub mod index;
pub mod loader;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod persist;
pub mod prompt;
pub mod qa;
pub mod server;
pub mod session;
pub mod stats;
