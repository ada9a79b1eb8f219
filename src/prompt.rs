//! Prompt assembly for grounded, conversational answers.
//!
//! The prompt has four parts, always in this order:
//!
//! 1. fixed instructions
//! 2. the retrieved context, numbered in rank order
//! 3. the conversation so far as question/answer pairs
//! 4. the current question

use crate::models::ScoredChunk;
use crate::session::Turn;

const INSTRUCTIONS: &str = "You are an assistant that answers questions using the documents provided below.

Instructions:
1. Answer directly and objectively.
2. Cite the sources you used by their bracketed number and file name.
3. If the context does not fully support an answer, say how confident you are and what is missing.
4. Stay within the provided context. Do not add outside knowledge.
5. Where it helps, quote a short example from the documents.";

/// Renders retrieved chunks as a numbered context block.
///
/// Each entry is `[n] source_id (chunk_id)` followed by the chunk text.
pub fn build_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] {} ({})\n{}",
                i + 1,
                r.chunk.metadata.source_id,
                r.chunk.metadata.chunk_id,
                r.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds the full prompt sent to the generation provider.
pub fn build_prompt(context: &str, history: &[Turn], question: &str) -> String {
    let context = if context.trim().is_empty() {
        "(no matching documents were found)"
    } else {
        context
    };

    let history_block = if history.is_empty() {
        "(no previous questions)".to_string()
    } else {
        history
            .iter()
            .map(|t| format!("Question: {}\nAnswer: {}", t.question, t.answer))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "{INSTRUCTIONS}\n\nContext:\n{context}\n\nConversation history:\n{history_block}\n\nCurrent question: {question}\n\nAnswer:"
    )
}
