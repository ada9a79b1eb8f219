use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docqa");
    path
}

/// Writes a config using the offline `hashed` embedder and two small documents.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let texts_dir = root.join("texts");
    fs::create_dir_all(&texts_dir).unwrap();
    fs::write(texts_dir.join("A.txt"), "Hello world.").unwrap();
    fs::write(texts_dir.join("B.txt"), "Goodbye world.").unwrap();
    fs::write(texts_dir.join("notes.md"), "Not a text document.").unwrap();

    let config_content = format!(
        r#"[paths]
pdf_dir = "{root}/pdfs"
text_dir = "{root}/texts"
index_path = "{root}/data/index/docqa.sqlite"
logs_dir = "{root}/logs"
data_dir = "{root}/data"
exports_dir = "{root}/exports"

[chunking]
chunk_size = 200
chunk_overlap = 20

[embedding]
provider = "hashed"
dims = 128

[generation]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_layout() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docqa(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Index database ready"));

    for dir in ["pdfs", "texts", "logs", "data", "exports"] {
        assert!(tmp.path().join(dir).is_dir(), "{} not created", dir);
    }
    assert!(tmp.path().join("data/index/docqa.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let before = fs::read_to_string(&config_path).unwrap();

    let (_, _, success1) = run_docqa(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_docqa(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");

    // An existing config is never overwritten
    assert_eq!(fs::read_to_string(&config_path).unwrap(), before);
}

#[test]
fn test_init_writes_example_config_in_fresh_directory() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(docqa_binary())
        .arg("init")
        .current_dir(tmp.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let written = fs::read_to_string(tmp.path().join("config/docqa.toml")).unwrap();
    assert!(written.contains("[chunking]"));
    assert!(tmp.path().join("extracted_texts").is_dir());
    assert!(tmp.path().join("data/index/docqa.sqlite").exists());
}

#[test]
fn test_missing_explicit_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_docqa(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_unknown_profile_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_docqa(&config_path, &["--profile", "ghost", "stats"]);
    assert!(!success);
    assert!(stderr.contains("Unknown profile"));
}

#[test]
fn test_index_builds_once() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let (stdout, stderr, success) = run_docqa(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 entries"), "got: {}", stdout);
    assert!(stdout.contains("hashed (128 dims)"));

    let (stdout, _, success) = run_docqa(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("already built"));

    let (stdout, _, success) = run_docqa(&config_path, &["index", "--rebuild"]);
    assert!(success);
    assert!(!stdout.contains("already built"));
    assert!(stdout.contains("2 entries"));
}

#[test]
fn test_query_returns_both_documents() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);
    run_docqa(&config_path, &["index"]);

    let (stdout, stderr, success) = run_docqa(&config_path, &["query", "world"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("A.txt (A.txt_0)"), "got: {}", stdout);
    assert!(stdout.contains("B.txt (B.txt_0)"), "got: {}", stdout);
    assert!(!stdout.contains("notes.md"));
}

#[test]
fn test_query_k_limits_and_ranks() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    // Index is built on demand
    let (stdout, _, success) = run_docqa(&config_path, &["query", "hello", "--k", "1"]);
    assert!(success);
    assert!(stdout.contains("1. "));
    assert!(!stdout.contains("2. "));
    assert!(stdout.contains("A.txt"), "got: {}", stdout);
}

#[test]
fn test_query_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);
    run_docqa(&config_path, &["index"]);

    let (stdout1, _, _) = run_docqa(&config_path, &["query", "goodbye world"]);
    let (stdout2, _, _) = run_docqa(&config_path, &["query", "goodbye world"]);
    assert_eq!(stdout1, stdout2);
}

#[test]
fn test_ask_with_disabled_generator_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let (_, stderr, success) = run_docqa(&config_path, &["ask", "What is hello?"]);
    assert!(!success);
    assert!(stderr.contains("generation error"), "got: {}", stderr);
}

#[test]
fn test_ask_empty_question_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_docqa(&config_path, &["ask", "   "]);
    assert!(!success);
    assert!(stderr.contains("question must not be empty"));
}

#[test]
fn test_extract_reports_broken_pdf() {
    let (tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);
    fs::write(tmp.path().join("pdfs/broken.pdf"), b"not a pdf").unwrap();

    let (stdout, stderr, success) = run_docqa(&config_path, &["extract"]);
    assert!(success, "extract failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("broken.pdf FAILED"));
    assert!(stdout.contains("Extracted 0 PDF(s), 1 failed."));
}

#[test]
fn test_stats_before_and_after_index() {
    let (_tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let (stdout, _, success) = run_docqa(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("not built yet"));

    run_docqa(&config_path, &["index"]);
    let (stdout, _, success) = run_docqa(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Entries:     2"));
    assert!(stdout.contains("0 ratings"));
}

#[test]
fn test_log_file_written() {
    let (tmp, config_path) = setup_test_env();
    run_docqa(&config_path, &["init"]);

    let logs: Vec<_> = fs::read_dir(tmp.path().join("logs"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("docqa_"))
        .collect();
    assert!(!logs.is_empty());
}
