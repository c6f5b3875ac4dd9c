use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

use history_trail::storage::{AuditLogStore, JsonlAuditLog};

fn row(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// A base directory holding an audit log with one record per action
fn seeded_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let log = JsonlAuditLog::new(dir.path().join("audit.log"));

    log.append_log(row(json!({
        "context_entity_key": "project",
        "context_entity_id": 1,
        "entity_key": "task",
        "entity_id": 7,
        "action": "CREATE",
        "content": {"id": 7, "title": "Write docs"},
        "actor_id": 3
    })))
    .unwrap();
    log.append_log(row(json!({
        "context_entity_key": "project",
        "context_entity_id": 1,
        "entity_key": "task",
        "entity_id": 7,
        "action": "UPDATE",
        "content": {
            "title": {"old": "Write docs", "new": "Write more docs"},
            "meta.owner": {"old": "ann", "new": "bob"}
        },
        "actor_id": 4,
        "request_id": "req-9"
    })))
    .unwrap();
    log.append_log(row(json!({
        "context_entity_key": "project",
        "context_entity_id": 2,
        "entity_key": "comment",
        "entity_id": 11,
        "action": "DELETE",
        "content": {"id": 11, "body": "hi"},
        "actor_id": 3
    })))
    .unwrap();

    dir
}

fn trail(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("trail").unwrap();
    cmd.env("HISTORY_TRAIL_DIR", dir.path())
        .env_remove("HISTORY_TRAIL_LOG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn list_shows_all_records() {
    let dir = seeded_dir();
    trail(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("task:7"))
        .stdout(predicate::str::contains("comment:11"))
        .stdout(predicate::str::contains("Page 1 of 1 (3 records, 10 per page)"));
}

#[test]
fn list_filters_by_action_and_entity() {
    let dir = seeded_dir();
    trail(&dir)
        .args(["list", "--entity-key", "task", "--action", "update"])
        .assert()
        .success()
        .stdout(predicate::str::contains("UPDATE"))
        .stdout(predicate::str::contains("CREATE").not())
        .stdout(predicate::str::contains("(1 records, 10 per page)"));
}

#[test]
fn list_paginates() {
    let dir = seeded_dir();
    trail(&dir)
        .args(["list", "--limit", "2", "--page", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Page 2 of 2 (3 records, 2 per page)"))
        .stdout(predicate::str::contains("CREATE"));
}

#[test]
fn list_rejects_bad_dates() {
    let dir = seeded_dir();
    trail(&dir)
        .args(["list", "--from", "last week"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date"));
}

#[test]
fn empty_log_lists_nothing() {
    let dir = TempDir::new().unwrap();
    trail(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No audit records found."));
}

#[test]
fn show_update_unified() {
    let dir = seeded_dir();
    trail(&dir)
        .args(["show", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Audit record #2"))
        .stdout(predicate::str::contains("Request:  req-9"))
        .stdout(predicate::str::contains("title: \"Write docs\" -> \"Write more docs\""))
        .stdout(predicate::str::contains("\"owner\": \"ann\""));
}

#[test]
fn show_old_side_flat() {
    let dir = seeded_dir();
    trail(&dir)
        .args(["show", "2", "--view", "old", "--flat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"meta.owner\": \"ann\""));
}

#[test]
fn show_create_has_no_old_state() {
    let dir = seeded_dir();
    trail(&dir)
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Old:\n(none)"));
}

#[test]
fn show_missing_record_fails() {
    let dir = seeded_dir();
    trail(&dir)
        .args(["show", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Audit record not found: 99"));
}

#[test]
fn explicit_log_path_wins() {
    let dir = seeded_dir();
    let other = TempDir::new().unwrap();
    trail(&other)
        .args(["--log"])
        .arg(dir.path().join("audit.log"))
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 records"));
}

#[test]
fn config_prints_paths() {
    let dir = TempDir::new().unwrap();
    trail(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Soft-delete field:  is_deleted"))
        .stdout(predicate::str::contains("audit.log"));
}
