// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dup_adapters::FakePseudonymizer;
use dup_core::JobId;
use dup_storage::JobPaths;
use serde_json::json;

const MB: usize = 1024 * 1024;

fn setup(dir: &tempfile::TempDir) -> JobPaths {
    let paths = JobPaths::new(dir.path(), &JobId::new("job-1"));
    paths.ensure_dirs().unwrap();
    paths
}

fn write_import(paths: &JobPaths, name: &str, lines: &[Value]) {
    let content: String = lines
        .iter()
        .map(|v| format!("{v}\n"))
        .collect();
    std::fs::write(paths.import_dir().join(name), content).unwrap();
}

fn read_output(paths: &JobPaths, name: &str) -> Vec<Value> {
    let content =
        std::fs::read_to_string(paths.pseudonymized_dir().join(name)).unwrap();
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn patient(id: &str) -> Value {
    json!({ "resourceType": "Patient", "id": id })
}

#[tokio::test]
async fn transforms_every_file_line_by_line() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    write_import(&paths, "Patient_1.ndjson", &[patient("p1"), patient("p2"), patient("p3")]);
    write_import(&paths, "Observation_1.ndjson", &[
        json!({ "resourceType": "Observation", "id": "o1" }),
        json!({ "resourceType": "Observation", "id": "o2" }),
    ]);

    let fake = FakePseudonymizer::new();
    let run = run(&paths, &fake, 10 * MB).await.unwrap();
    assert_eq!(run.files_processed, 2);

    let patients = read_output(&paths, "dimped_Patient_1.ndjson");
    assert_eq!(patients.len(), 3);
    // Output line i is the transform of input line i.
    assert_eq!(patients[0]["id"], "pseudo-p1");
    assert_eq!(patients[1]["id"], "pseudo-p2");
    assert_eq!(patients[2]["id"], "pseudo-p3");

    let observations = read_output(&paths, "dimped_Observation_1.ndjson");
    assert_eq!(observations.len(), 2);
    assert_eq!(observations[1]["id"], "pseudo-o2");
}

#[tokio::test]
async fn existing_outputs_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    write_import(&paths, "a.ndjson", &[patient("a1")]);
    write_import(&paths, "b.ndjson", &[patient("b1")]);

    // a.ndjson was produced by an earlier run; its content must survive.
    let sentinel = "{\"id\":\"from-previous-run\"}\n";
    std::fs::write(paths.pseudonymized_dir().join("dimped_a.ndjson"), sentinel).unwrap();

    let fake = FakePseudonymizer::new();
    let run = run(&paths, &fake, 10 * MB).await.unwrap();
    assert_eq!(run.files_processed, 2);

    assert_eq!(
        std::fs::read_to_string(paths.pseudonymized_dir().join("dimped_a.ndjson")).unwrap(),
        sentinel
    );
    assert_eq!(read_output(&paths, "dimped_b.ndjson")[0]["id"], "pseudo-b1");
}

#[tokio::test]
async fn stale_parts_are_removed_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    write_import(&paths, "a.ndjson", &[patient("a1")]);
    std::fs::write(
        paths.pseudonymized_dir().join("dimped_a.ndjson.part"),
        "{\"half\":",
    )
    .unwrap();

    let fake = FakePseudonymizer::new();
    run(&paths, &fake, 10 * MB).await.unwrap();

    assert!(!paths.pseudonymized_dir().join("dimped_a.ndjson.part").exists());
    assert_eq!(read_output(&paths, "dimped_a.ndjson")[0]["id"], "pseudo-a1");
}

#[tokio::test]
async fn empty_import_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    let fake = FakePseudonymizer::new();
    let err = run(&paths, &fake, 10 * MB).await.unwrap_err();
    assert!(matches!(err, EngineError::NoInputFiles { .. }));
}

#[tokio::test]
async fn oversized_non_bundle_aborts_with_guidance() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    let big = json!({
        "resourceType": "Observation",
        "id": "big-one",
        "blob": "x".repeat(2 * MB),
    });
    write_import(&paths, "Observation_1.ndjson", &[big]);

    let fake = FakePseudonymizer::new();
    let err = run(&paths, &fake, MB).await.unwrap_err();
    assert_eq!(err.kind(), dup_core::ErrorKind::NonTransient);
    let message = err.to_string();
    assert!(message.contains("Observation/big-one"));
    assert!(message.contains("bytes"));
    assert!(message.contains("bundle_split_threshold_mb"));

    // No partial output survives the abort.
    assert!(!paths.pseudonymized_dir().join("dimped_Observation_1.ndjson").exists());
    assert!(!paths.pseudonymized_dir().join("dimped_Observation_1.ndjson.part").exists());
}

#[tokio::test]
async fn malformed_json_aborts_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    std::fs::write(
        paths.import_dir().join("bad.ndjson"),
        "{\"resourceType\":\"Patient\",\"id\":\"ok\"}\n{not json}\n",
    )
    .unwrap();

    let fake = FakePseudonymizer::new();
    let err = run(&paths, &fake, 10 * MB).await.unwrap_err();
    match err {
        EngineError::MalformedRecord { line, .. } => assert_eq!(line, 2),
        other => panic!("expected MalformedRecord, got {other:?}"),
    }
    assert!(!paths.pseudonymized_dir().join("dimped_bad.ndjson").exists());
    assert!(!paths.pseudonymized_dir().join("dimped_bad.ndjson.part").exists());
}

#[tokio::test]
async fn a_failing_record_leaves_earlier_outputs_intact() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    write_import(&paths, "a.ndjson", &[patient("a1")]);
    write_import(&paths, "b.ndjson", &[patient("b1"), patient("poison"), patient("b3")]);

    let fake = FakePseudonymizer {
        fail_on_resource_id: Some("poison".to_string()),
    };
    let err = run(&paths, &fake, 10 * MB).await.unwrap_err();
    assert_eq!(err.http_status(), Some(422));

    // a.ndjson (sorted first) finished; b.ndjson aborted cleanly.
    assert!(paths.pseudonymized_dir().join("dimped_a.ndjson").exists());
    assert!(!paths.pseudonymized_dir().join("dimped_b.ndjson").exists());
    assert!(!paths.pseudonymized_dir().join("dimped_b.ndjson.part").exists());
}

#[tokio::test]
async fn bundles_go_through_the_split_path() {
    let dir = tempfile::tempdir().unwrap();
    let paths = setup(&dir);
    let bundle = json!({
        "resourceType": "Bundle",
        "id": "bundle-id",
        "type": "collection",
        "entry": [
            { "resource": { "resourceType": "Patient", "id": "p1" } },
            { "resource": { "resourceType": "Patient", "id": "p2" } },
        ]
    });
    write_import(&paths, "Bundle_1.ndjson", &[bundle]);

    let fake = FakePseudonymizer::new();
    run(&paths, &fake, 10 * MB).await.unwrap();

    let out = &read_output(&paths, "dimped_Bundle_1.ndjson")[0];
    // Single-chunk path: the service saw bundle-id-chunk-0 and its response
    // is the base of the output.
    assert_eq!(out["id"], "pseudo-bundle-id-chunk-0");
    assert_eq!(out["meta"]["security"], FakePseudonymizer::security_tag());
    assert_eq!(out["entry"].as_array().unwrap().len(), 2);
    assert!(out.get("total").is_none());
}

#[tokio::test]
async fn split_and_unsplit_runs_produce_the_same_bundle() {
    // ~100 entries of ~1 KiB: comfortably over a 16 KiB threshold, under a
    // 10 MiB one.
    let entries: Vec<Value> = (0..100)
        .map(|i| {
            json!({
                "resource": {
                    "resourceType": "Observation",
                    "id": format!("obs-{i}"),
                    "note": "v".repeat(1024),
                }
            })
        })
        .collect();
    let bundle = json!({
        "resourceType": "Bundle",
        "id": "bundle-id",
        "type": "collection",
        "entry": entries,
    });

    let fake = FakePseudonymizer::new();

    let dir_a = tempfile::tempdir().unwrap();
    let paths_a = setup(&dir_a);
    write_import(&paths_a, "Bundle_1.ndjson", &[bundle.clone()]);
    run(&paths_a, &fake, 10 * MB).await.unwrap();
    let unsplit = read_output(&paths_a, "dimped_Bundle_1.ndjson");

    let dir_b = tempfile::tempdir().unwrap();
    let paths_b = setup(&dir_b);
    write_import(&paths_b, "Bundle_1.ndjson", &[bundle]);
    run(&paths_b, &fake, 16 * 1024).await.unwrap();
    let split = read_output(&paths_b, "dimped_Bundle_1.ndjson");

    assert_eq!(unsplit, split);
    let out = &split[0];
    let ids: Vec<&str> = out["entry"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["resource"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 100);
    assert_eq!(ids[0], "pseudo-obs-0");
    assert_eq!(ids[99], "pseudo-obs-99");
    assert!(ids.windows(2).all(|w| w[0] != w[1]));
    assert_eq!(out["id"], "pseudo-bundle-id-chunk-0");
    assert_eq!(out["meta"]["security"], FakePseudonymizer::security_tag());
    assert!(out.get("total").is_none());
}
