//! CLI command runners.
//!
//! Each `run_*` function backs one `docqa` subcommand. They open what they
//! need from the config, print human-readable output to stdout, and close
//! the index before returning.
//!
//! [`chat_loop`] is the interactive session. It is generic over its input
//! and output so it can be driven from tests.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::Config;
use crate::error::QaError;
use crate::export;
use crate::extract;
use crate::feedback::FeedbackStore;
use crate::index::IndexHandle;
use crate::qa::{Answer, QaEngine};
use crate::session::Session;

/// Commented example configuration written by `docqa init`.
pub const EXAMPLE_CONFIG: &str = include_str!("../config/docqa.example.toml");

const CHAT_HELP: &str = "\
Commands:
  exit, quit       leave the chat
  export [name]    save this conversation to the exports directory
  clear            forget the conversation so far
  help             show this message
Anything else is asked as a question.";

// ============ init ============

/// Creates the directory layout, writes an example config if `config_path`
/// does not exist yet, and creates the index database.
pub async fn run_init(config: &Config, config_path: &Path) -> Result<()> {
    config.ensure_directories()?;

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }
        std::fs::write(config_path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        println!("Wrote example config to {}", config_path.display());
    }

    let engine = QaEngine::from_config(config).await?;
    println!("Index database ready at {}", engine.index().path().display());
    println!("Drop PDFs into {}", config.paths.pdf_dir.display());
    engine.index().close().await;
    Ok(())
}

// ============ extract ============

pub fn run_extract(config: &Config) -> Result<()> {
    let report = extract::extract_directory(&config.paths.pdf_dir, &config.paths.text_dir)?;

    for file in &report.extracted {
        println!(
            "  {} -> {} ({} chars, {} words)",
            file.pdf,
            file.output.display(),
            file.chars,
            file.words
        );
    }
    for (name, error) in &report.failed {
        println!("  {} FAILED: {}", name, error);
    }
    println!(
        "Extracted {} PDF(s), {} failed.",
        report.extracted.len(),
        report.failed.len()
    );
    Ok(())
}

// ============ index ============

/// Builds the index if none exists, or replaces it with `--rebuild`.
pub async fn run_index(config: &Config, rebuild: bool) -> Result<()> {
    let mut engine = QaEngine::from_config(config).await?;

    let existing = engine.index().handle().await?;
    let handle = match existing {
        Some(handle) if !rebuild => {
            println!("Index already built (use --rebuild to replace it).");
            handle
        }
        _ => engine.reindex().await?,
    };

    print_handle(&handle);
    engine.index().close().await;
    Ok(())
}

fn print_handle(handle: &IndexHandle) {
    println!(
        "Index: {} entries, model {} ({} dims), built {}",
        handle.entry_count,
        handle.model,
        handle.dims,
        handle.built_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

// ============ query ============

/// Prints the top-`k` chunks for `text` without generating an answer.
pub async fn run_query(config: &Config, text: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.k);
    if k == 0 {
        bail!("--k must be >= 1");
    }

    let engine = QaEngine::from_config(config).await?;
    engine.ensure_index().await?;
    let results = engine.index().query(text, k).await?;

    if results.is_empty() {
        println!("No results.");
    }
    for (i, r) in results.iter().enumerate() {
        let excerpt: String = r.chunk.content.chars().take(160).collect();
        println!(
            "{}. [{:.4}] {} ({})",
            i + 1,
            r.score,
            r.chunk.metadata.source_id,
            r.chunk.metadata.chunk_id
        );
        println!("   {}", excerpt.replace('\n', " "));
    }

    engine.index().close().await;
    Ok(())
}

// ============ ask ============

/// Answers one question in a fresh session.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let mut engine = QaEngine::from_config(config).await?;
    let mut session = Session::new();

    let answer = engine.answer(&mut session, question).await?;
    let mut out = std::io::stdout();
    print_answer(&mut out, &answer)?;

    engine.index().close().await;
    Ok(())
}

fn print_answer<W: Write>(out: &mut W, answer: &Answer) -> Result<()> {
    writeln!(out, "\n{}\n", answer.answer.trim())?;
    if !answer.sources.is_empty() {
        writeln!(out, "Sources:")?;
        for (i, source) in answer.sources.iter().enumerate() {
            writeln!(out, "  [{}] {} ({})", i + 1, source.source_id, source.chunk_id)?;
        }
    }
    out.flush()?;
    Ok(())
}

// ============ chat ============

/// Runs the interactive chat on stdin/stdout, optionally resuming an export.
pub async fn run_chat(config: &Config, resume: Option<&Path>) -> Result<()> {
    let mut engine = QaEngine::from_config(config).await?;
    let feedback = FeedbackStore::new(config.paths.feedback_path());

    let mut session = match resume {
        Some(path) => {
            let session = export::import_history(path)
                .with_context(|| format!("Failed to resume from {}", path.display()))?;
            println!("Resumed {} turn(s) from {}", session.turn_count(), path.display());
            session
        }
        None => Session::new(),
    };

    println!("docqa chat. Type `help` for commands, `exit` to leave.");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    chat_loop(
        &mut engine,
        &mut session,
        &feedback,
        &config.paths.exports_dir,
        stdin,
        &mut stdout,
    )
    .await?;

    engine.index().close().await;
    Ok(())
}

/// Reads questions and commands from `input` until `exit` or end of input.
///
/// Commands are recognized only as a whole line (`export` may carry a file
/// name), so a question that merely starts with a command word is still
/// asked. A failed question is reported and the loop continues with the
/// session unchanged. After each answer the user may rate it 1-5 or press
/// Enter to skip. A non-empty conversation is exported when the loop ends.
pub async fn chat_loop<R, W>(
    engine: &mut QaEngine,
    session: &mut Session,
    feedback: &FeedbackStore,
    exports_dir: &Path,
    input: R,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    'chat: loop {
        write!(out, "\n> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match ChatCommand::parse(line) {
            ChatCommand::Exit => break,
            ChatCommand::Help => writeln!(out, "{}", CHAT_HELP)?,
            ChatCommand::Clear => {
                engine.clear_history(session);
                writeln!(out, "Conversation cleared.")?;
            }
            ChatCommand::Export(name) => match export::export_history(session, exports_dir, name) {
                Ok(path) => writeln!(out, "Exported to {}", path.display())?,
                Err(e) => writeln!(out, "Export failed: {}", e)?,
            },
            ChatCommand::Ask => {
                let answer = match engine.answer(session, line).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        tracing::warn!(error = %e, "question failed");
                        writeln!(out, "Error: {}", e)?;
                        continue;
                    }
                };
                print_answer(out, &answer)?;

                loop {
                    write!(out, "Rate this answer (1-5, Enter to skip): ")?;
                    out.flush()?;
                    let Some(rating) = lines.next_line().await? else {
                        break 'chat;
                    };
                    let rating = rating.trim();
                    if rating.is_empty() {
                        break;
                    }
                    let Ok(value) = rating.parse::<u8>() else {
                        writeln!(
                            out,
                            "'{}' is not a rating and was not asked as a question. Enter 1-5, or press Enter to skip.",
                            rating
                        )?;
                        continue;
                    };
                    match feedback.record_feedback(&answer.question, &answer.answer, value, None) {
                        Ok(_) => {
                            writeln!(out, "Thanks for the feedback.")?;
                            break;
                        }
                        Err(QaError::InvalidArgument(msg)) => writeln!(out, "{}", msg)?,
                        Err(e) => {
                            tracing::warn!(error = %e, "could not record feedback");
                            writeln!(out, "Could not save the rating: {}", e)?;
                            break;
                        }
                    }
                }
            }
        }
    }

    writeln!(out)?;
    if !session.is_empty() {
        match export::export_history(session, exports_dir, None) {
            Ok(path) => writeln!(out, "Conversation saved to {}", path.display())?,
            Err(e) => {
                tracing::warn!(error = %e, "final export failed");
                writeln!(out, "Could not save the conversation: {}", e)?;
            }
        }
    }
    Ok(())
}

/// What one chat input line asks for.
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Exit,
    Help,
    Clear,
    Export(Option<&'a str>),
    Ask,
}

impl<'a> ChatCommand<'a> {
    fn parse(line: &'a str) -> Self {
        match line.to_lowercase().as_str() {
            "exit" | "quit" => return ChatCommand::Exit,
            "help" => return ChatCommand::Help,
            "clear" => return ChatCommand::Clear,
            "export" => return ChatCommand::Export(None),
            _ => {}
        }

        // `export <name>` with a bare file name; anything else is a question
        if let Some((word, name)) = line.split_once(char::is_whitespace) {
            let name = name.trim();
            let plain = name
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'));
            if word.eq_ignore_ascii_case("export") && plain {
                return ChatCommand::Export(Some(name));
            }
        }
        ChatCommand::Ask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedProvider;
    use crate::generation::GenerationProvider;
    use crate::index::VectorIndex;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct EchoGenerator;

    #[async_trait]
    impl GenerationProvider for EchoGenerator {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            let question = prompt
                .rsplit("Current question: ")
                .next()
                .unwrap_or_default()
                .trim_end_matches("\n\nAnswer:")
                .to_string();
            Ok(format!("You asked: {}", question))
        }
    }

    async fn setup(tmp: &TempDir) -> (QaEngine, FeedbackStore) {
        let texts = tmp.path().join("texts");
        std::fs::create_dir_all(&texts).unwrap();
        std::fs::write(texts.join("manual.txt"), "The pump runs at 40 psi.").unwrap();

        let mut config = Config::default();
        config.paths.text_dir = texts;

        let index = VectorIndex::open(
            &tmp.path().join("index.sqlite"),
            Arc::new(HashedProvider::new(64)),
            16,
        )
        .await
        .unwrap();
        let engine = QaEngine::new(index, Arc::new(EchoGenerator), &config);
        let feedback = FeedbackStore::new(tmp.path().join("feedback.json"));
        (engine, feedback)
    }

    async fn drive(script: &str, tmp: &TempDir) -> (String, Session, FeedbackStore) {
        let (mut engine, feedback) = setup(tmp).await;
        let mut session = Session::new();
        let mut out = Vec::new();
        chat_loop(
            &mut engine,
            &mut session,
            &feedback,
            &tmp.path().join("exports"),
            script.as_bytes(),
            &mut out,
        )
        .await
        .unwrap();
        (String::from_utf8(out).unwrap(), session, feedback)
    }

    fn exported_files(tmp: &TempDir) -> Vec<String> {
        match std::fs::read_dir(tmp.path().join("exports")) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_question_rating_and_exit() {
        let tmp = TempDir::new().unwrap();
        let (out, session, feedback) = drive("What pressure?\n4\nexit\nnever read?\n", &tmp).await;

        assert!(out.contains("You asked: What pressure?"));
        assert!(out.contains("manual.txt"));
        assert!(out.contains("Thanks for the feedback."));
        assert_eq!(session.turn_count(), 1);

        let stats = feedback.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.distribution, [0, 0, 0, 1, 0]);

        // Leaving the chat saves the conversation
        assert!(out.contains("Conversation saved to"));
        let files = exported_files(&tmp);
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("chat_history_"));
        let saved =
            std::fs::read_to_string(tmp.path().join("exports").join(&files[0])).unwrap();
        assert!(saved.contains("What pressure?"));
    }

    #[tokio::test]
    async fn test_rating_prompt_repeats_until_valid_or_skipped() {
        let tmp = TempDir::new().unwrap();
        let (out, session, feedback) = drive("one?\n\ntwo?\n9\nthree?\n2\n", &tmp).await;

        // "three?" was typed at the rating prompt, so it is not a question
        assert_eq!(session.turn_count(), 2);
        assert!(out.contains("rating must be between 1 and 5"));
        assert!(out.contains("'three?' is not a rating and was not asked as a question"));
        assert!(!out.contains("You asked: three?"));

        let records = feedback.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].question, "two?");
        assert_eq!(records[0].rating, 2);
    }

    #[tokio::test]
    async fn test_questions_starting_with_command_words_are_asked() {
        let tmp = TempDir::new().unwrap();
        let script = "Clear up the pump section for me?\n\n\
                      Help me with chapter 2\n\n\
                      Exit criteria for the test?\n\n\
                      Quit conditions?\n\n\
                      Export the pump data?\n\n\
                      What next?\n\n";
        let (out, session, _) = drive(script, &tmp).await;

        assert_eq!(session.turn_count(), 6);
        assert!(!out.contains("Conversation cleared."));
        assert!(!out.contains("Commands:"));
        assert!(!out.contains("Exported to"));
        for q in [
            "Clear up the pump section for me?",
            "Help me with chapter 2",
            "Exit criteria for the test?",
            "Export the pump data?",
            "What next?",
        ] {
            assert!(out.contains(&format!("You asked: {}", q)), "not asked: {}", q);
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(ChatCommand::parse("exit"), ChatCommand::Exit);
        assert_eq!(ChatCommand::parse("QUIT"), ChatCommand::Exit);
        assert_eq!(ChatCommand::parse("Help"), ChatCommand::Help);
        assert_eq!(ChatCommand::parse("clear"), ChatCommand::Clear);
        assert_eq!(ChatCommand::parse("export"), ChatCommand::Export(None));
        assert_eq!(ChatCommand::parse("export notes_v2"), ChatCommand::Export(Some("notes_v2")));
        assert_eq!(ChatCommand::parse("export costs?"), ChatCommand::Ask);
        assert_eq!(ChatCommand::parse("export the report"), ChatCommand::Ask);
        assert_eq!(ChatCommand::parse("clear the filter?"), ChatCommand::Ask);
        assert_eq!(ChatCommand::parse("exit criteria"), ChatCommand::Ask);
    }

    #[tokio::test]
    async fn test_clear_and_export() {
        let tmp = TempDir::new().unwrap();
        let (out, session, _) = drive("first?\n\nexport saved\nclear\n", &tmp).await;

        assert!(out.contains("Exported to"));
        assert!(out.contains("Conversation cleared."));
        assert!(session.is_empty());

        let exported = std::fs::read_to_string(tmp.path().join("exports").join("saved.json")).unwrap();
        assert!(exported.contains("first?"));
    }

    #[tokio::test]
    async fn test_help_and_end_of_input() {
        let tmp = TempDir::new().unwrap();
        let (out, session, _) = drive("help", &tmp).await;
        assert!(out.contains("export [name]"));
        assert!(session.is_empty());
    }
}
