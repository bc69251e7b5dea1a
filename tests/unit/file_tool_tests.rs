//! Unit tests for the working-directory file tools.

use serde_json::Value;

use agentic_coder::mcp::tools::files::{delete_file, list_files, read_file, write_file};
use agentic_coder::workspace::Workspace;

fn parse(body: &str) -> Value {
    serde_json::from_str(body).expect("tool body is json")
}

fn workspace() -> (tempfile::TempDir, Workspace) {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::new(temp.path()).expect("workspace");
    (temp, workspace)
}

#[tokio::test]
async fn write_then_read_round_trip() {
    let (_temp, ws) = workspace();

    let written = parse(&write_file(&ws, "out/data.txt", "hello").await);
    let read = parse(&read_file(&ws, "out/data.txt").await);

    assert_eq!(written["success"], true);
    assert_eq!(written["bytes_written"], 5);
    assert_eq!(read["success"], true);
    assert_eq!(read["result"], "hello");
    assert_eq!(read["file_path"], "out/data.txt");
}

#[tokio::test]
async fn read_missing_file_reports_not_found() {
    let (_temp, ws) = workspace();

    let body = parse(&read_file(&ws, "nope.txt").await);

    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "File not found: nope.txt");
}

#[tokio::test]
async fn escapes_are_rejected() {
    let (_temp, ws) = workspace();

    let read = parse(&read_file(&ws, "../etc/passwd").await);
    let write = parse(&write_file(&ws, "/tmp/evil.txt", "x").await);
    let delete = parse(&delete_file(&ws, "../x").await);

    for body in [read, write, delete] {
        assert_eq!(body["success"], false);
        assert!(
            body["error"].as_str().expect("error").contains("path violation"),
            "{body}"
        );
    }
}

#[tokio::test]
async fn delete_removes_regular_files_only() {
    let (temp, ws) = workspace();
    std::fs::write(temp.path().join("a.txt"), "x").expect("write");
    std::fs::create_dir(temp.path().join("dir")).expect("mkdir");

    let deleted = parse(&delete_file(&ws, "a.txt").await);
    let missing = parse(&delete_file(&ws, "a.txt").await);
    let directory = parse(&delete_file(&ws, "dir").await);

    assert_eq!(deleted["success"], true);
    assert!(!temp.path().join("a.txt").exists());
    assert_eq!(missing["error"], "File not found: a.txt");
    assert_eq!(directory["error"], "Not a file: dir");
}

#[test]
fn list_matches_top_level_and_recursive_patterns() {
    let (temp, ws) = workspace();
    std::fs::write(temp.path().join("a.py"), "").expect("write");
    std::fs::write(temp.path().join("b.txt"), "").expect("write");
    std::fs::create_dir(temp.path().join("pkg")).expect("mkdir");
    std::fs::write(temp.path().join("pkg").join("c.py"), "").expect("write");

    let top = parse(&list_files(&ws, "*.py"));
    let all = parse(&list_files(&ws, "**/*.py"));

    assert_eq!(top["result"], serde_json::json!(["a.py"]));
    assert_eq!(top["count"], 1);
    assert_eq!(all["result"], serde_json::json!(["a.py", "pkg/c.py"]));
    assert_eq!(all["pattern"], "**/*.py");
}

#[test]
fn list_rejects_escaping_patterns() {
    let (_temp, ws) = workspace();

    let parent = parse(&list_files(&ws, "../*"));
    let absolute = parse(&list_files(&ws, "/etc/*"));

    assert_eq!(parent["success"], false);
    assert_eq!(absolute["success"], false);
}
