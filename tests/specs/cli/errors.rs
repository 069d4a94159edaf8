//! CLI error surface: exit codes, stderr messages, classification.

use crate::prelude::*;
use serde_json::json;

#[test]
fn unknown_subcommand_fails() {
    let ws = Workspace::bare();
    ws.dup().arg("frobnicate").assert().failure();
}

#[test]
fn status_of_a_missing_job_names_it() {
    let ws = Workspace::bare();
    let assert = ws
        .dup()
        .args(["pipeline", "status", "no-such-job"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("job not found"), "stderr: {stderr}");
}

#[test]
fn starting_with_an_unrecognized_input_is_classified() {
    let ws = Workspace::bare();
    let assert = ws
        .dup()
        .args(["pipeline", "start", "/definitely/not/there"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("input not recognized"), "stderr: {stderr}");
    assert!(stderr.contains("classification: non-transient"), "stderr: {stderr}");
}

#[test]
fn unknown_step_name_fails() {
    let ws = Workspace::bare();
    ws.write_source("a.ndjson", &[json!({"resourceType": "Patient", "id": "a"})]);
    let assert = ws
        .dup()
        .args(["job", "run", "whatever", "--step", "import"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("unknown step kind: import"), "stderr: {stderr}");
}

#[test]
fn invalid_config_is_rejected() {
    let ws = Workspace::bare();
    std::fs::write(&ws.config_path, "pipeline:\n  enabled_steps: [dimp]\n").unwrap();
    let assert = ws
        .dup()
        .args(["job", "list"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("import"), "stderr: {stderr}");
}
