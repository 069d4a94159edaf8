//! `dup job list`, `dup job run --step`, `dup job delete`.

use crate::prelude::*;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn list_shows_jobs_and_delete_removes_them() {
    let dimp = start_dimp_stub().await;
    let ws = Workspace::with_dimp(&dimp.uri());
    ws.write_source("a.ndjson", &[json!({"resourceType": "Patient", "id": "a"})]);

    let empty = ws.dup().args(["job", "list"]).assert().success();
    assert!(String::from_utf8_lossy(&empty.get_output().stdout).contains("no jobs"));

    let started = ws
        .dup()
        .args(["pipeline", "start"])
        .arg(&ws.source_dir)
        .assert()
        .success();
    let job_id = job_id_from(&started.get_output().stdout);

    let listed = ws.dup().args(["job", "list"]).assert().success();
    let stdout = String::from_utf8_lossy(&listed.get_output().stdout);
    assert!(stdout.contains(&job_id), "stdout: {stdout}");
    assert!(stdout.contains("completed"), "stdout: {stdout}");

    ws.dup().args(["job", "delete", &job_id]).assert().success();
    assert!(!ws.job_dir(&job_id).exists());

    let after = ws.dup().args(["job", "list"]).assert().success();
    assert!(String::from_utf8_lossy(&after.get_output().stdout).contains("no jobs"));
}

#[tokio::test(flavor = "multi_thread")]
async fn single_step_runs_enforce_enablement_and_are_idempotent() {
    let dimp = start_dimp_stub().await;
    let ws = Workspace::with_dimp(&dimp.uri());
    ws.write_source("a.ndjson", &[json!({"resourceType": "Patient", "id": "a"})]);

    let started = ws
        .dup()
        .args(["pipeline", "start"])
        .arg(&ws.source_dir)
        .assert()
        .success();
    let job_id = job_id_from(&started.get_output().stdout);

    // csv_conversion is not part of this pipeline.
    let denied = ws
        .dup()
        .args(["job", "run", &job_id, "--step", "csv_conversion"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&denied.get_output().stderr);
    assert!(stderr.contains("not enabled"), "stderr: {stderr}");

    // Re-running the already-completed dimp step changes nothing on disk.
    let before = read_state(&ws.job_dir(&job_id));
    ws.dup()
        .args(["job", "run", &job_id, "--step", "dimp"])
        .assert()
        .success();
    assert_eq!(read_state(&ws.job_dir(&job_id)), before);
}
