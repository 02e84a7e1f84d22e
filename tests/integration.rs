use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/repo-rag.sqlite"

[model]
provider = "disabled"

[retrieval]
default_top_k = 3
max_top_k = 10

[server]
bind = "127.0.0.1:7342"
"#,
        root.display()
    );

    let config_path = config_dir.join("repo-rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_repo-rag"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run repo-rag");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run(&config, &["init"]);
    assert!(ok, "init failed: {stderr}");
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/repo-rag.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    assert!(run(&config, &["init"]).2);
    let (_, stderr, ok) = run(&config, &["init"]);
    assert!(ok, "second init failed: {stderr}");
}

#[test]
fn test_project_add_list_remove() {
    let (_tmp, config) = setup_test_env();
    run(&config, &["init"]);

    let (stdout, stderr, ok) = run(
        &config,
        &["project", "add", "widgets", "https://github.com/acme/widgets", "--branch", "dev"],
    );
    assert!(ok, "project add failed: {stderr}");
    assert!(stdout.contains("Created project 'widgets'"));

    let (stdout, _, ok) = run(&config, &["project", "list"]);
    assert!(ok);
    assert!(stdout.contains("widgets"));
    assert!(stdout.contains("@dev"));

    let (_, _, ok) = run(&config, &["project", "add", "widgets", "acme/other"]);
    assert!(!ok, "duplicate project names must be rejected");

    let (stdout, _, ok) = run(&config, &["project", "remove", "widgets"]);
    assert!(ok);
    assert!(stdout.contains("Removed project 'widgets'"));

    let (stdout, _, _) = run(&config, &["project", "list"]);
    assert!(stdout.contains("No projects"));
}

#[test]
fn test_project_add_rejects_invalid_repo() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run(&config, &["project", "add", "x", "not a repo"]);
    assert!(!ok);
    assert!(stderr.contains("invalid repository reference"));
}

#[test]
fn test_ask_without_model_apologizes() {
    let (_tmp, config) = setup_test_env();
    run(&config, &["project", "add", "widgets", "acme/widgets"]);

    let (stdout, stderr, ok) = run(&config, &["ask", "widgets", "What does this do?"]);
    assert!(ok, "ask failed: {stderr}");
    assert!(stdout.contains("I apologize"));

    let (stdout, _, ok) = run(&config, &["questions", "list", "widgets"]);
    assert!(ok);
    assert!(stdout.contains("No saved questions"));
}

#[test]
fn test_ask_validates_input() {
    let (_tmp, config) = setup_test_env();
    run(&config, &["project", "add", "widgets", "acme/widgets"]);

    let (_, stderr, ok) = run(&config, &["ask", "widgets", "  "]);
    assert!(!ok);
    assert!(stderr.contains("question must not be empty"));

    let (_, stderr, ok) = run(&config, &["ask", "widgets", "hi", "--top-k", "50"]);
    assert!(!ok);
    assert!(stderr.contains("top_k must be between 1 and 10"));
}

#[test]
fn test_unknown_project() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run(&config, &["clear", "ghost"]);
    assert!(!ok);
    assert!(stderr.contains("unknown project: ghost"));
}

#[test]
fn test_clear_and_commits_list_on_fresh_project() {
    let (_tmp, config) = setup_test_env();
    run(&config, &["project", "add", "widgets", "acme/widgets"]);

    let (stdout, _, ok) = run(&config, &["clear", "widgets"]);
    assert!(ok);
    assert!(stdout.contains("Deleted 0 retrieval record(s)"));

    let (stdout, _, ok) = run(&config, &["commits", "list", "widgets"]);
    assert!(ok);
    assert!(stdout.contains("No commits stored"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
