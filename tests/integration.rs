//! CLI tests: run the `nbr` binary against a temporary corpus and config.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn nbr_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nbr"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let long_body = (0..30)
        .map(|i| format!("Paragraph {i}: deployment notes for the staging cluster and its services."))
        .collect::<Vec<_>>()
        .join("\n\n");

    let corpus = serde_json::json!([
        {
            "id": "rust",
            "notebookId": "work",
            "title": "Rust Ownership",
            "content": "Rust uses ownership to manage memory. Each value has one owner.",
            "tags": ["rust", "memory"]
        },
        {
            "id": 42,
            "notebookId": "home",
            "title": "Bread",
            "content": "Sourdough needs a lively starter, flour, water and salt.",
            "tags": "[\"baking\"]"
        },
        {
            "id": "deploy",
            "notebookId": "work",
            "title": "Deployment Runbook",
            "body": long_body,
            "tags": []
        },
        { "title": "record without id is skipped" }
    ]);
    fs::write(data_dir.join("notes.json"), corpus.to_string()).unwrap();

    let config_content = format!(
        r#"[corpus]
path = "{}/data/notes.json"

[retrieval]
top_k = 3

[embedding]
provider = "hashed"
dims = 128

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = config_dir.join("nbr.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_nbr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = nbr_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run nbr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_expand_needs_no_config() {
    let missing = Path::new("/nonexistent/nbr.toml");
    let (stdout, stderr, success) = run_nbr(missing, &["expand", "find the problem"]);
    assert!(success, "expand failed: {}", stderr);
    for word in ["find", "the", "problem", "search", "locate", "issue", "bug"] {
        assert!(
            stdout.split_whitespace().any(|w| w == word),
            "missing {word} in {stdout}"
        );
    }
}

#[test]
fn test_missing_config_fails() {
    let missing = Path::new("/nonexistent/nbr.toml");
    let (_, stderr, success) = run_nbr(missing, &["search", "rust"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_search_hybrid() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_nbr(&config_path, &["search", "rust ownership"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.starts_with("1. ["),
        "expected a ranked list, got: {}",
        stdout
    );
    assert!(stdout.lines().next().unwrap().contains("Rust Ownership"));
}

#[test]
fn test_search_semantic_with_notebook() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_nbr(
        &config_path,
        &["search", "sourdough starter", "--mode", "semantic", "--notebook", "home"],
    );
    assert!(success);
    assert!(stdout.contains("Bread"));
    assert!(stdout.contains("id: 42"));
    assert!(!stdout.contains("Rust Ownership"));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();
    let (first, _, _) = run_nbr(&config_path, &["search", "deployment memory"]);
    let (second, _, _) = run_nbr(&config_path, &["search", "deployment memory"]);
    assert_eq!(first, second, "search results should be deterministic");
}

#[test]
fn test_search_blank_query_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_nbr(&config_path, &["search", "   "]);
    assert!(!success, "blank query should fail, stdout={}", stdout);
    assert!(stderr.contains("query must not be empty"), "stderr: {}", stderr);
}

#[test]
fn test_search_unknown_mode() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_nbr(&config_path, &["search", "rust", "--mode", "fuzzy"]);
    assert!(!success);
    assert!(stderr.contains("Unknown search mode"));
}

#[test]
fn test_ask_prints_context_and_citations() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_nbr(
        &config_path,
        &["ask", "how does rust manage memory?", "--prompt"],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("--- Context ("));
    assert!(stdout.contains("[Source 1: \"Rust Ownership\""));
    assert!(stdout.contains("--- Citations ---"));
    assert!(stdout.contains("[1] \"Rust Ownership\" (rust, memory)"));
    assert!(stdout.contains("--- System prompt ---"));
}

#[test]
fn test_chunk_long_note() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_nbr(&config_path, &["chunk", "deploy"]);
    assert!(success);
    assert!(stdout.contains("[chunk 0]"));
    assert!(stdout.contains("[chunk 1]"));
    assert!(!stdout.contains(" full]"));
    assert!(stdout.contains("Paragraph 29"));
}

#[test]
fn test_chunk_short_note_is_whole() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_nbr(&config_path, &["chunk", "rust"]);
    assert!(success);
    assert!(stdout.contains("(1 chunks)"));
    assert!(stdout.contains("[chunk 0 full]"));
}

#[test]
fn test_chunk_unknown_id() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_nbr(&config_path, &["chunk", "nope"]);
    assert!(!success);
    assert!(stderr.contains("Document not found"));
}
