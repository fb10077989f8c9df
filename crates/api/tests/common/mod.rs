#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use trending_core::artifacts::artifact_filename;
use trending_core::jobs::{TRENDING_SCRIPT, TRENDS_ARTIFACT};
use trending_core::scripting::env::{build_child_env, ChildEnv};
use trending_core::scripting::executor::{ScriptError, ScriptExecutor, ScriptInput, ScriptOutput};
use trending_core::scripting::interpreter::MinVersion;

use trending_api::config::{JobsConfig, ServerConfig};
use trending_api::jobs::service::JobService;
use trending_api::router::build_app_router;
use trending_api::state::AppState;

/// Credential variable the test config forwards.
pub const TOKEN_VAR: &str = "GITHUB_TOKEN_TEST";

/// What the stub does when asked to run a script.
#[derive(Debug, Clone)]
pub enum StubBehavior {
    /// Exit 0. Analysis scripts write the canonical artifact with this
    /// body and the trending collector writes the trends file; other
    /// scripts write nothing.
    WriteArtifact(String),
    /// Exit 0 without writing anything.
    NoOutput,
    /// Exit non-zero with this stderr.
    Fail { exit_code: i32, stderr: String },
    /// Exit 1 with this stderr for `script`; every other script exits 0.
    FailOn { script: &'static str, stderr: String },
    /// Never finish on its own.
    Hang,
}

/// [`ScriptExecutor`] that never spawns a process.
pub struct StubExecutor {
    behavior: StubBehavior,
    calls: Mutex<Vec<(PathBuf, ScriptInput)>>,
}

impl StubExecutor {
    pub fn new(behavior: StubBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every `(script_path, input)` the stub has been asked to run.
    pub fn calls(&self) -> Vec<(PathBuf, ScriptInput)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptExecutor for StubExecutor {
    async fn execute(
        &self,
        script_path: &Path,
        input: ScriptInput,
    ) -> Result<ScriptOutput, ScriptError> {
        self.calls
            .lock()
            .unwrap()
            .push((script_path.to_path_buf(), input.clone()));

        let output = |exit_code: i32, stderr: &str| ScriptOutput {
            stdout: "done\n".to_string(),
            stderr: stderr.to_string(),
            exit_code,
            duration_ms: 5,
            parsed_output: None,
        };

        match &self.behavior {
            StubBehavior::WriteArtifact(body) => {
                let path = if script_path.ends_with(TRENDING_SCRIPT) {
                    let cwd = input.working_directory.as_deref().unwrap_or(".");
                    Some(Path::new(cwd).join(TRENDS_ARTIFACT))
                } else if script_path.ends_with("data_analysis.py") {
                    let dir = PathBuf::from(&input.env["ARTIFACTS_DIR"]);
                    Some(dir.join(artifact_filename("analysis", &input.args[1])))
                } else {
                    None
                };
                if let Some(path) = path {
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&path, body).await?;
                }
                Ok(output(0, ""))
            }
            StubBehavior::NoOutput => Ok(output(0, "")),
            StubBehavior::Fail { exit_code, stderr } => output(*exit_code, stderr).into_result(),
            StubBehavior::FailOn { script, stderr } => {
                if script_path.ends_with(script) {
                    output(1, stderr).into_result()
                } else {
                    Ok(output(0, ""))
                }
            }
            StubBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(output(0, ""))
            }
        }
    }
}

/// Build a test `ServerConfig` rooted at `dir`.
///
/// Artifacts live in `dir/analytics`, which is created here.
pub fn test_config(dir: &Path) -> ServerConfig {
    let artifacts_dir = dir.join("analytics");
    std::fs::create_dir_all(&artifacts_dir).unwrap();

    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jobs: JobsConfig {
            python_bin: None,
            python_min_version: MinVersion::default(),
            scripts_dir: dir.to_path_buf(),
            artifacts_dir,
            trends_artifact: dir.join(TRENDS_ARTIFACT),
            credential_vars: vec![TOKEN_VAR.to_string()],
            database_url: Some("postgres://localhost/trending_test".to_string()),
            analysis_timeout: Duration::from_secs(10),
            crawl_timeout: Duration::from_secs(10),
            trending_timeout: Duration::from_secs(10),
            legacy_artifact_lookup: true,
            migrate_legacy_artifacts: false,
            job_history_limit: 50,
        },
    }
}

/// Base environment with no credentials set.
pub fn empty_env() -> ChildEnv {
    build_child_env([("PATH", "/usr/bin:/bin")], &[])
}

/// Base environment carrying a GitHub token.
pub fn env_with_token() -> ChildEnv {
    build_child_env([("PATH", "/usr/bin:/bin"), (TOKEN_VAR, "ghp_testtoken")], &[])
}

/// Build the full application router around `executor`.
///
/// Uses the production [`build_app_router`] so tests exercise the same
/// middleware stack. The service is returned for direct assertions and
/// shutdown.
pub fn build_test_app(
    dir: &Path,
    executor: Arc<StubExecutor>,
    base_env: ChildEnv,
) -> (Router, Arc<JobService>) {
    let config = test_config(dir);
    let jobs = Arc::new(JobService::new(config.jobs.clone(), executor, base_env));
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs: Arc::clone(&jobs),
    };
    (build_app_router(state, &config), jobs)
}

/// Read the full response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read the full response body as UTF-8 text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, &body.to_string()).await
}

/// Send a POST request with no body and no content type.
pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a raw body labelled as JSON.
pub async fn post_raw(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Poll `GET /api/v1/jobs/{id}` until its status is terminal.
pub async fn wait_for_terminal(app: &Router, job_id: &str) -> serde_json::Value {
    for _ in 0..200 {
        let response = get(app.clone(), &format!("/api/v1/jobs/{job_id}")).await;
        let json = body_json(response).await;
        if json["data"]["status"] != "running" {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}
