//! End-to-end: local import + pseudonymization against a stubbed service.

use crate::prelude::*;
use serde_json::{json, Value};

#[tokio::test(flavor = "multi_thread")]
async fn local_import_and_dimp_complete_end_to_end() {
    let dimp = start_dimp_stub().await;
    let ws = Workspace::with_dimp(&dimp.uri());
    ws.write_source(
        "Patient_1.ndjson",
        &[
            json!({"resourceType": "Patient", "id": "p1"}),
            json!({"resourceType": "Patient", "id": "p2"}),
            json!({"resourceType": "Patient", "id": "p3"}),
        ],
    );
    ws.write_source(
        "Observation_1.ndjson",
        &[
            json!({"resourceType": "Observation", "id": "o1"}),
            json!({"resourceType": "Observation", "id": "o2"}),
            json!({"resourceType": "Observation", "id": "o3"}),
            json!({"resourceType": "Observation", "id": "o4"}),
            json!({"resourceType": "Observation", "id": "o5"}),
        ],
    );

    let assert = ws
        .dup()
        .args(["pipeline", "start"])
        .arg(&ws.source_dir)
        .assert()
        .success();
    let job_id = job_id_from(&assert.get_output().stdout);
    let job_dir = ws.job_dir(&job_id);

    // Imported copies are byte-identical to the source.
    assert_eq!(
        std::fs::read(job_dir.join("import/Patient_1.ndjson")).unwrap(),
        std::fs::read(ws.source_dir.join("Patient_1.ndjson")).unwrap()
    );

    // Each output line is the service transform of the input line.
    let out =
        std::fs::read_to_string(job_dir.join("pseudonymized/dimped_Patient_1.ndjson")).unwrap();
    let ids: Vec<String> = out
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["pseudo-p1", "pseudo-p2", "pseudo-p3"]);
    let observations =
        std::fs::read_to_string(job_dir.join("pseudonymized/dimped_Observation_1.ndjson")).unwrap();
    assert_eq!(observations.lines().count(), 5);

    // Persisted state records completion and the aggregate counters.
    let state = read_state(&job_dir);
    assert_eq!(state["status"], "completed");
    assert_eq!(state["current_step"], "");
    assert_eq!(state["total_files"], 2);
    let expected_bytes = std::fs::metadata(job_dir.join("import/Patient_1.ndjson")).unwrap().len()
        + std::fs::metadata(job_dir.join("import/Observation_1.ndjson")).unwrap().len();
    assert_eq!(state["total_bytes"], expected_bytes);
    assert_eq!(state["steps"][0]["name"], "local_import");
    assert_eq!(state["steps"][0]["status"], "completed");
    assert_eq!(state["steps"][1]["name"], "dimp");
    assert_eq!(state["steps"][1]["status"], "completed");
    assert_eq!(state["steps"][1]["files_processed"], 2);

    // status is read-only and reports the same.
    let status = ws
        .dup()
        .args(["pipeline", "status", &job_id])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&status.get_output().stdout);
    assert!(stdout.contains("completed"), "stdout: {stdout}");

    // continue on a completed job is a harmless no-op.
    ws.dup().args(["pipeline", "continue", &job_id]).assert().success();
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failing_service_leaves_a_resumable_failed_job() {
    // No dimp service listening: the step fails after the import succeeds.
    let ws = Workspace::with_dimp("http://127.0.0.1:9");
    ws.write_source("a.ndjson", &[json!({"resourceType": "Patient", "id": "a1"})]);

    let assert = ws
        .dup()
        .args(["pipeline", "start"])
        .arg(&ws.source_dir)
        .assert()
        .failure();
    let job_id = job_id_from(&assert.get_output().stdout);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("classification: transient"), "stderr: {stderr}");

    let state = read_state(&ws.job_dir(&job_id));
    assert_eq!(state["status"], "failed");
    assert_eq!(state["steps"][0]["status"], "completed");
    assert_eq!(state["steps"][1]["status"], "failed");
    assert_eq!(state["steps"][1]["last_error"]["kind"], "transient");

    // The service comes back; continue finishes the job.
    let dimp = start_dimp_stub().await;
    let config = std::fs::read_to_string(&ws.config_path).unwrap();
    std::fs::write(
        &ws.config_path,
        config.replace("http://127.0.0.1:9", &dimp.uri()),
    )
    .unwrap();
    // The job's snapshot still points at the dead service; the snapshot is
    // authoritative, so rewrite it the way an operator would edit state.
    let job_dir = ws.job_dir(&job_id);
    let mut state = read_state(&job_dir);
    state["config"]["services"]["dimp"]["url"] = json!(dimp.uri());
    std::fs::write(
        job_dir.join("state.json"),
        serde_json::to_vec_pretty(&state).unwrap(),
    )
    .unwrap();

    ws.dup().args(["pipeline", "continue", &job_id]).assert().success();
    let state = read_state(&job_dir);
    assert_eq!(state["status"], "completed");
    assert_eq!(state["steps"][1]["retry_count"], 1);
}
