//! Cross-process job locking.

use crate::prelude::*;
use dup_storage::JobLock;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn a_locked_job_rejects_concurrent_mutation() {
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
    let job_dir = ws.job_dir(&job_id);
    let state_before = std::fs::read_to_string(job_dir.join("state.json")).unwrap();

    // Another "process" holds the job.
    let _held = JobLock::acquire(&job_dir).unwrap();

    let busy = ws
        .dup()
        .args(["pipeline", "continue", &job_id])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&busy.get_output().stderr);
    assert!(stderr.contains("busy"), "stderr: {stderr}");

    let busy_delete = ws
        .dup()
        .args(["job", "delete", &job_id])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&busy_delete.get_output().stderr);
    assert!(stderr.contains("busy"), "stderr: {stderr}");

    // The loser did not touch persistent state; status still reads fine.
    assert_eq!(
        std::fs::read_to_string(job_dir.join("state.json")).unwrap(),
        state_before
    );
    ws.dup().args(["pipeline", "status", &job_id]).assert().success();
}
