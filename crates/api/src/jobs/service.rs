//! Central job service.
//!
//! Coordinates key validation, environment construction, duplicate
//! detection, launch (sync or supervised async), artifact lookup, and
//! outcome recording.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use trending_core::artifacts::{ArtifactStatus, ArtifactStore, ArtifactTarget, MigrationReport};
use trending_core::error::CoreError;
use trending_core::jobs::{CrawlOptions, JobKind, JobMode, ValidKey};
use trending_core::scripting::env::{build_child_env, credential_overrides, has_github_token, ChildEnv};
use trending_core::scripting::executor::{ScriptError, ScriptExecutor, ScriptInput, ScriptOutput};
use trending_core::scripting::status::JobStatus;
use trending_core::types::JobId;

use crate::config::JobsConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::registry::{JobCompletion, JobRegistry, RunningJob};

/// One script of a plan, with its path resolved.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// Script path relative to the scripts directory, used in logs and errors.
    pub script: &'static str,
    pub script_path: PathBuf,
    pub args: Vec<String>,
}

/// Everything needed to launch one job.
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub kind: JobKind,
    pub key: ValidKey,
    pub mode: JobMode,
    /// Run in order; the first failure stops the job.
    pub steps: Vec<PlannedStep>,
    pub env: ChildEnv,
    pub working_directory: PathBuf,
    /// Deadline for all steps together.
    pub timeout: Duration,
    pub artifact: ArtifactTarget,
}

/// Result of a job that ran to completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    /// Every step exited 0. Artifact presence is reported separately.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Exit code of the last step.
    pub exit_code: i32,
    pub artifact_path: Option<String>,
}

/// What a launch produced.
#[derive(Debug)]
pub enum LaunchResult {
    /// Sync job finished successfully; `outcome.artifact_path` may be `None`.
    Finished { job_id: JobId, outcome: JobOutcome },
    /// Async job handed to the background tracker.
    Dispatched {
        job_id: JobId,
        estimated_duration: &'static str,
    },
}

/// The parts of the service a running job needs, cheap to clone into a task.
#[derive(Clone)]
struct JobContext {
    executor: Arc<dyn ScriptExecutor>,
    artifacts: ArtifactStore,
}

/// Orchestrates external job scripts.
pub struct JobService {
    ctx: JobContext,
    registry: Arc<JobRegistry>,
    tracker: TaskTracker,
    config: JobsConfig,
    base_env: ChildEnv,
}

impl JobService {
    /// Create a service.
    ///
    /// `base_env` is the environment every child starts from, captured once
    /// by the caller (normally `std::env::vars()` at startup).
    pub fn new(config: JobsConfig, executor: Arc<dyn ScriptExecutor>, base_env: ChildEnv) -> Self {
        let artifacts = ArtifactStore::new(
            config.artifacts_dir.clone(),
            config.legacy_artifact_lookup,
        );
        Self {
            ctx: JobContext {
                executor,
                artifacts,
            },
            registry: Arc::new(JobRegistry::new(config.job_history_limit)),
            tracker: TaskTracker::new(),
            config,
            base_env,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.ctx.artifacts
    }

    /// Validate a request and build its launch plan.
    pub fn plan(
        &self,
        kind: JobKind,
        raw_key: Option<&str>,
        options: &CrawlOptions,
        mode: Option<JobMode>,
    ) -> AppResult<JobPlan> {
        let key = kind.validate_key(raw_key)?;
        kind.validate_options(options)?;
        let env = self.child_env();

        if kind.requires_github_token() && !has_github_token(&env, &self.config.credential_vars) {
            return Err(CoreError::MissingCredential(format!(
                "No GitHub token configured; set one of {}",
                self.config.credential_vars.join(", ")
            ))
            .into());
        }

        let steps = kind
            .steps(&key, options)
            .into_iter()
            .map(|step| PlannedStep {
                script: step.script,
                script_path: self.config.scripts_dir.join(step.script),
                args: step.args,
            })
            .collect();

        Ok(JobPlan {
            kind,
            mode: mode.unwrap_or_else(|| kind.default_mode()),
            steps,
            env,
            working_directory: self.config.scripts_dir.clone(),
            timeout: self.config.timeout_for(kind),
            artifact: self.artifact_target(kind, &key),
            key,
        })
    }

    /// Where a job of `kind` for `key` leaves its result.
    fn artifact_target(&self, kind: JobKind, key: &ValidKey) -> ArtifactTarget {
        match kind.artifact_prefix() {
            Some(prefix) => ArtifactTarget::Keyed {
                prefix,
                key: key.raw.clone(),
            },
            None => ArtifactTarget::Fixed(self.config.trends_artifact.clone()),
        }
    }

    /// Child environment: the captured base plus credentials, database URL,
    /// and the paths scripts need.
    fn child_env(&self) -> ChildEnv {
        let mut overrides = credential_overrides(&self.base_env, &self.config.credential_vars);
        if let Some(url) = &self.config.database_url {
            overrides.push(("DATABASE_URL".to_string(), url.clone()));
        }
        overrides.push((
            "PYTHONPATH".to_string(),
            self.config.scripts_dir.display().to_string(),
        ));
        overrides.push((
            "ARTIFACTS_DIR".to_string(),
            self.config.artifacts_dir.display().to_string(),
        ));
        build_child_env(self.base_env.clone(), &overrides)
    }

    /// Launch a planned job in its mode.
    pub async fn launch(&self, plan: JobPlan) -> AppResult<LaunchResult> {
        let job = self
            .registry
            .begin(plan.kind, &plan.key, plan.artifact.slot(), plan.mode)?;
        let job_id = job.id();

        match plan.mode {
            JobMode::Sync => {
                let outcome = run_job(self.ctx.clone(), plan, job).await?;
                Ok(LaunchResult::Finished { job_id, outcome })
            }
            JobMode::Async => {
                let estimated_duration = plan.kind.estimated_duration();
                let ctx = self.ctx.clone();
                self.tracker.spawn(async move {
                    // Outcome is recorded in the registry and logged by `run_job`.
                    let _ = run_job(ctx, plan, job).await;
                });
                tracing::info!(job_id = %job_id, "Job dispatched to background");
                Ok(LaunchResult::Dispatched {
                    job_id,
                    estimated_duration,
                })
            }
        }
    }

    /// Re-run a job whose artifact already exists. Always synchronous.
    pub async fn regenerate(&self, mut plan: JobPlan) -> AppResult<LaunchResult> {
        if self.ctx.artifacts.locate_target(&plan.artifact).await.is_none() {
            return Err(CoreError::NotFound {
                entity: "artifact",
                key: plan.key.clean.clone(),
            }
            .into());
        }
        plan.mode = JobMode::Sync;
        self.launch(plan).await
    }

    /// Artifact status for a key, with the key as the job would see it.
    pub async fn status(
        &self,
        kind: JobKind,
        raw_key: Option<&str>,
    ) -> AppResult<(ValidKey, ArtifactStatus)> {
        let key = kind.validate_key(raw_key)?;
        let status = self
            .ctx
            .artifacts
            .status_target(&self.artifact_target(kind, &key))
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to read artifact: {e}")))?;
        Ok((key, status))
    }

    /// Rename legacy-named artifacts for the given kinds.
    ///
    /// Kinds sharing a prefix are migrated once; fixed-path kinds have no
    /// legacy names.
    pub async fn migrate_artifacts(&self, kinds: &[JobKind]) -> AppResult<MigrationReport> {
        let mut prefixes: Vec<&'static str> =
            kinds.iter().filter_map(|kind| kind.artifact_prefix()).collect();
        prefixes.sort_unstable();
        prefixes.dedup();

        let mut report = MigrationReport::default();
        for prefix in prefixes {
            let part = self
                .ctx
                .artifacts
                .migrate_legacy(prefix)
                .await
                .map_err(|e| AppError::InternalError(format!("Artifact migration failed: {e}")))?;
            report.migrated.extend(part.migrated);
            report.skipped.extend(part.skipped);
        }
        tracing::info!(
            migrated = report.migrated.len(),
            skipped = report.skipped.len(),
            "Legacy artifact migration finished",
        );
        Ok(report)
    }

    /// Cancel every running job and wait up to `grace` for background tasks.
    pub async fn shutdown(&self, grace: Duration) {
        let signalled = self.registry.cancel_all();
        self.tracker.close();
        tracing::info!(signalled, "Cancelling running jobs");
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Background jobs did not stop within the grace period",
            );
        }
    }
}

/// A step that failed, with the script that failed.
struct StepFailure {
    script: &'static str,
    error: ScriptError,
}

/// Run one job to a terminal state and record it.
///
/// The job is killed if its cancellation token fires: dropping the
/// executor future drops the child, which was spawned with `kill_on_drop`.
async fn run_job(ctx: JobContext, plan: JobPlan, job: RunningJob) -> AppResult<JobOutcome> {
    let job_id = job.id();
    let cancel: CancellationToken = job.cancel_token();
    let JobPlan {
        kind,
        key,
        steps,
        env,
        working_directory,
        timeout,
        artifact,
        ..
    } = plan;

    tracing::info!(job_id = %job_id, kind = %kind, key = %key.clean, steps = steps.len(), "Job started");

    let started = Instant::now();
    let deadline = started + timeout;
    let mut outputs: Vec<ScriptOutput> = Vec::with_capacity(steps.len());
    let mut failure = None;

    for step in steps {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            failure = Some(StepFailure {
                script: step.script,
                error: ScriptError::Timeout {
                    elapsed_ms: elapsed_ms(started),
                },
            });
            break;
        }

        tracing::debug!(job_id = %job_id, script = step.script, "Running job step");
        let input = ScriptInput {
            args: step.args,
            env: env.clone(),
            working_directory: Some(working_directory.display().to_string()),
            timeout: remaining,
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!(job_id = %job_id, kind = %kind, key = %key.clean, script = step.script, "Job cancelled");
                job.finish(JobCompletion::cancelled("Cancelled before completion"));
                return Err(CoreError::Conflict(format!("Job {job_id} was cancelled")).into());
            }
            result = ctx.executor.execute(&step.script_path, input) => result,
        };

        match result {
            Ok(output) => outputs.push(output),
            Err(error) => {
                failure = Some(StepFailure {
                    script: step.script,
                    error,
                });
                break;
            }
        }
    }

    if let Some(failure) = failure {
        record_failure(job, &failure, kind, &key);
        return Err(failure.error.into());
    }

    let artifact_path = ctx
        .artifacts
        .locate_target(&artifact)
        .await
        .map(|p| p.display().to_string());
    let outcome = JobOutcome {
        success: true,
        stdout: join_streams(outputs.iter().map(|o| o.stdout.as_str())),
        stderr: join_streams(outputs.iter().map(|o| o.stderr.as_str())),
        duration_ms: elapsed_ms(started),
        exit_code: outputs.last().map_or(0, |o| o.exit_code),
        artifact_path,
    };
    record_success(job, &outcome, kind, &key);
    Ok(outcome)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Concatenate per-step output, skipping steps that wrote nothing.
fn join_streams<'a>(streams: impl Iterator<Item = &'a str>) -> String {
    streams
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn record_success(job: RunningJob, outcome: &JobOutcome, kind: JobKind, key: &ValidKey) {
    let status = if outcome.artifact_path.is_some() {
        tracing::info!(
            job_id = %job.id(),
            kind = %kind,
            key = %key.clean,
            duration_ms = outcome.duration_ms,
            "Job completed",
        );
        JobStatus::Completed
    } else {
        tracing::warn!(
            job_id = %job.id(),
            kind = %kind,
            key = %key.clean,
            duration_ms = outcome.duration_ms,
            "Job exited cleanly but produced no artifact",
        );
        JobStatus::NoOutput
    };

    job.finish(JobCompletion {
        status,
        duration_ms: Some(outcome.duration_ms),
        exit_code: Some(outcome.exit_code),
        artifact_path: outcome.artifact_path.clone(),
        error: None,
    });
}

fn record_failure(job: RunningJob, failure: &StepFailure, kind: JobKind, key: &ValidKey) {
    let err = &failure.error;
    let (status, exit_code, duration_ms) = match err {
        ScriptError::Timeout { elapsed_ms } => (JobStatus::TimedOut, None, Some(*elapsed_ms)),
        ScriptError::ExecutionFailed {
            exit_code,
            duration_ms,
            ..
        } => (JobStatus::Failed, Some(*exit_code), Some(*duration_ms)),
        _ => (JobStatus::Failed, None, None),
    };

    tracing::error!(
        job_id = %job.id(),
        kind = %kind,
        key = %key.clean,
        script = failure.script,
        exit_code = ?exit_code,
        stderr = err.stderr().unwrap_or_default(),
        error = %err,
        "Job failed",
    );

    job.finish(JobCompletion {
        status,
        duration_ms,
        exit_code,
        artifact_path: None,
        error: Some(format!("{}: {err}", failure.script)),
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
