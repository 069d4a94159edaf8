//! Shared helpers for the CLI specs.

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

/// A scratch workspace: config file, jobs dir, and a source data dir.
pub struct Workspace {
    _root: tempfile::TempDir,
    pub config_path: PathBuf,
    pub jobs_dir: PathBuf,
    pub source_dir: PathBuf,
}

impl Workspace {
    /// Workspace with a [local_import, dimp] pipeline against `dimp_url`.
    pub fn with_dimp(dimp_url: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let jobs_dir = root.path().join("jobs");
        let source_dir = root.path().join("source");
        std::fs::create_dir_all(&source_dir).unwrap();

        let config_path = root.path().join("dup.yaml");
        std::fs::write(
            &config_path,
            format!(
                "services:\n  dimp:\n    url: {dimp_url}\n\
                 pipeline:\n  enabled_steps: [local_import, dimp]\n\
                 retry:\n  max_attempts: 1\n  initial_backoff_ms: 1\n  max_backoff_ms: 2\n\
                 jobs_dir: {}\n",
                jobs_dir.display()
            ),
        )
        .unwrap();

        Self {
            _root: root,
            config_path,
            jobs_dir,
            source_dir,
        }
    }

    /// Workspace without any services configured.
    pub fn bare() -> Self {
        Self::with_dimp("http://127.0.0.1:9/unused")
    }

    pub fn write_source(&self, name: &str, lines: &[Value]) {
        let content: String = lines.iter().map(|v| format!("{v}\n")).collect();
        std::fs::write(self.source_dir.join(name), content).unwrap();
    }

    pub fn dup(&self) -> Command {
        let mut cmd = Command::cargo_bin("dup").unwrap();
        cmd.arg("--config").arg(&self.config_path);
        cmd
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(job_id)
    }
}

/// Dimp stand-in: returns the posted resource with `pseudo-` prefixed ids.
pub struct PseudoResponder;

impl Respond for PseudoResponder {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let mut resource: Value = serde_json::from_slice(&request.body).unwrap();
        if let Some(id) = resource.get("id").and_then(Value::as_str) {
            let pseudo = format!("pseudo-{id}");
            resource["id"] = Value::String(pseudo);
        }
        ResponseTemplate::new(200).set_body_json(resource)
    }
}

/// Start a mock de-identification service.
pub async fn start_dimp_stub() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/$de-identify"))
        .respond_with(PseudoResponder)
        .mount(&server)
        .await;
    server
}

/// Pull the job id out of `created job <id>` stdout.
pub fn job_id_from(stdout: &[u8]) -> String {
    let text = String::from_utf8_lossy(stdout);
    text.lines()
        .find_map(|l| l.strip_prefix("created job "))
        .expect("stdout names the created job")
        .trim()
        .to_string()
}

/// Read and parse a job's state.json.
pub fn read_state(job_dir: &Path) -> Value {
    let raw = std::fs::read_to_string(job_dir.join("state.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}
