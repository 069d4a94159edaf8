// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::config::{AppConfig, DimpConfig, ServicesConfig};
use crate::input::InputDescriptor;
use crate::step::InputKind;
use chrono::Duration;

fn test_config() -> AppConfig {
    AppConfig {
        services: ServicesConfig {
            torch: None,
            dimp: Some(DimpConfig {
                url: "http://dimp.local/".to_string(),
                bundle_split_threshold_mb: 10,
            }),
        },
        ..AppConfig::default()
    }
}

fn local_input() -> InputDescriptor {
    InputDescriptor {
        source: "/data/in".to_string(),
        kind: InputKind::LocalDirectory,
    }
}

fn test_job(clock: &FakeClock) -> Job {
    Job::new(JobId::generate(), local_input(), test_config(), clock)
}

#[test]
fn job_id_display_and_short() {
    let id = JobId::new("0123456789abcdef");
    assert_eq!(id.to_string(), "0123456789abcdef");
    assert_eq!(id.short(8), "01234567");
    assert_eq!(JobId::new("ab").short(8), "ab");
}

#[test]
fn generated_ids_are_unique() {
    assert_ne!(JobId::generate(), JobId::generate());
}

#[test]
fn new_job_is_pending_on_first_step() {
    let clock = FakeClock::new();
    let job = test_job(&clock);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.current_step, "local_import");
    assert_eq!(job.steps.len(), 2);
    assert_eq!(job.steps[0].name, StepKind::LocalImport);
    assert_eq!(job.steps[1].name, StepKind::Dimp);
    assert!(job.steps.iter().all(|s| s.status == StepStatus::Pending));
    job.validate().unwrap();
}

#[test]
fn start_transitions_pending_to_in_progress() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    clock.advance(Duration::seconds(1));
    job.start(&clock).unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
    assert!(job.updated_at > job.created_at);
}

#[test]
fn start_rejects_in_progress_and_completed() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.start(&clock).unwrap();
    assert!(matches!(
        job.start(&clock),
        Err(ValidationError::InvalidTransition {
            from: JobStatus::InProgress,
            ..
        })
    ));
}

#[test]
fn failed_job_can_restart() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.start(&clock).unwrap();
    job.start_step(StepKind::LocalImport, &clock).unwrap();
    job.fail_step(
        StepKind::LocalImport,
        StepError {
            kind: crate::retry::ErrorKind::NonTransient,
            message: "boom".to_string(),
            http_status: None,
            timestamp: clock.now(),
        },
        &clock,
    )
    .unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("boom"));

    job.start(&clock).unwrap();
    assert_eq!(job.status, JobStatus::InProgress);
    assert!(job.error.is_none());
}

#[test]
fn step_lifecycle_records_timestamps_and_counters() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.start(&clock).unwrap();
    job.start_step(StepKind::LocalImport, &clock).unwrap();
    let step = job.step(StepKind::LocalImport).unwrap();
    assert_eq!(step.status, StepStatus::InProgress);
    assert!(step.started_at.is_some());

    clock.advance(Duration::seconds(3));
    job.complete_step(StepKind::LocalImport, 2, 4096, &clock).unwrap();
    let step = job.step(StepKind::LocalImport).unwrap();
    assert_eq!(step.status, StepStatus::Completed);
    assert!(step.completed_at.is_some());
    assert_eq!(step.files_processed, 2);
    assert_eq!(step.bytes_processed, 4096);
    job.validate().unwrap();
}

#[test]
fn restarting_a_failed_step_bumps_retry_count() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.start(&clock).unwrap();
    job.start_step(StepKind::LocalImport, &clock).unwrap();
    job.fail_step(
        StepKind::LocalImport,
        StepError {
            kind: crate::retry::ErrorKind::Transient,
            message: "net down".to_string(),
            http_status: Some(503),
            timestamp: clock.now(),
        },
        &clock,
    )
    .unwrap();

    job.start(&clock).unwrap();
    job.start_step(StepKind::LocalImport, &clock).unwrap();
    let step = job.step(StepKind::LocalImport).unwrap();
    assert_eq!(step.retry_count, 1);
    assert!(step.last_error.is_none());
}

#[test]
fn complete_requires_in_progress() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    assert!(matches!(
        job.complete(&clock),
        Err(ValidationError::InvalidTransition { .. })
    ));
}

#[test]
fn completed_job_has_empty_current_step() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.start(&clock).unwrap();
    job.start_step(StepKind::LocalImport, &clock).unwrap();
    job.complete_step(StepKind::LocalImport, 1, 10, &clock).unwrap();
    job.start_step(StepKind::Dimp, &clock).unwrap();
    job.complete_step(StepKind::Dimp, 1, 10, &clock).unwrap();
    job.complete(&clock).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.current_step, "");
    job.validate().unwrap();
}

#[test]
fn validate_rejects_empty_current_step_on_running_job() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.current_step = String::new();
    assert!(matches!(
        job.validate(),
        Err(ValidationError::EmptyCurrentStepNotCompleted(JobStatus::Pending))
    ));
}

#[test]
fn validate_rejects_unknown_current_step() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.current_step = "csv_conversion".to_string();
    assert!(matches!(
        job.validate(),
        Err(ValidationError::UnknownCurrentStep(_))
    ));
}

#[test]
fn validate_rejects_first_step_mismatch() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.input.kind = InputKind::HttpUrl;
    assert!(matches!(
        job.validate(),
        Err(ValidationError::FirstStepMismatch {
            expected: StepKind::HttpImport,
            got: StepKind::LocalImport,
        })
    ));
}

#[test]
fn validate_rejects_completed_step_without_timestamps() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.steps[0].status = StepStatus::Completed;
    assert!(matches!(
        job.validate(),
        Err(ValidationError::StepMissingStartedAt(StepKind::LocalImport, _))
    ));
    job.steps[0].started_at = Some(clock.now());
    assert!(matches!(
        job.validate(),
        Err(ValidationError::StepMissingCompletedAt(StepKind::LocalImport))
    ));
}

#[test]
fn record_data_file_bumps_totals() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.record_data_file(DataFile {
        file_name: "Patient_1.ndjson".to_string(),
        file_path: "import/Patient_1.ndjson".into(),
        resource_type: "Patient".to_string(),
        file_size: 1200,
        line_count: 3,
        step: StepKind::LocalImport,
    });
    job.record_data_file(DataFile {
        file_name: "Observation_1.ndjson".to_string(),
        file_path: "import/Observation_1.ndjson".into(),
        resource_type: "Observation".to_string(),
        file_size: 800,
        line_count: 5,
        step: StepKind::LocalImport,
    });
    assert_eq!(job.total_files, 2);
    assert_eq!(job.total_bytes, 2000);
}

#[test]
fn resource_type_inference() {
    assert_eq!(DataFile::resource_type_of("Patient_1.ndjson"), "Patient");
    assert_eq!(DataFile::resource_type_of("Observation.ndjson"), "Observation");
    assert_eq!(DataFile::resource_type_of("torch-batch-0.ndjson"), "torch");
}

#[test]
fn next_step_after_walks_the_enabled_order() {
    let clock = FakeClock::new();
    let job = test_job(&clock);
    assert_eq!(job.next_step_after(StepKind::LocalImport), Some(StepKind::Dimp));
    assert_eq!(job.next_step_after(StepKind::Dimp), None);
}

#[test]
fn job_round_trips_through_json() {
    let clock = FakeClock::new();
    let mut job = test_job(&clock);
    job.start(&clock).unwrap();
    job.start_step(StepKind::LocalImport, &clock).unwrap();
    job.extraction_url = Some("https://base/fhir/extraction/1".to_string());
    let json = serde_json::to_string_pretty(&job).unwrap();
    let back: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(back, job);
}
