//! Handlers for launching, polling, cancelling, and exporting jobs.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use trending_core::artifacts::ArtifactStatus;
use trending_core::error::CoreError;
use trending_core::export::to_csv_with_bom;
use trending_core::jobs::{CrawlOptions, JobKind, JobMode};
use trending_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::jobs::registry::{CancelOutcome, JobRecord};
use crate::jobs::service::LaunchResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /jobs` and `POST /jobs/regenerate`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Ignored for `trending`, which always refreshes every period.
    pub logical_key: Option<String>,
    pub mode: Option<JobMode>,
    /// Defaults to `analysis`.
    pub kind: Option<JobKind>,
    /// `languages` and `limits`, for `crawl` only.
    #[serde(flatten)]
    pub options: CrawlOptions,
}

/// Query parameters for `GET /jobs/status`.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub key: Option<String>,
    pub kind: Option<JobKind>,
}

/// Reported outcome of a launch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub success: bool,
    /// `completed`, `no_output`, or `started`.
    pub status: &'static str,
    pub job_id: JobId,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<&'static str>,
}

impl JobResponse {
    fn from_launch(kind: JobKind, key: &str, result: LaunchResult) -> Self {
        match result {
            LaunchResult::Finished { job_id, outcome } => {
                let found = outcome.artifact_path.is_some();
                Self {
                    success: found,
                    status: if found { "completed" } else { "no_output" },
                    job_id,
                    message: if found {
                        format!("{kind} for '{key}' completed")
                    } else {
                        format!("{kind} for '{key}' finished but produced no output")
                    },
                    artifact_path: outcome.artifact_path,
                    duration_ms: Some(outcome.duration_ms),
                    stdout: Some(outcome.stdout),
                    stderr: Some(outcome.stderr),
                    estimated_duration: None,
                }
            }
            LaunchResult::Dispatched {
                job_id,
                estimated_duration,
            } => Self {
                success: true,
                status: "started",
                job_id,
                message: format!("{kind} for '{key}' started in the background"),
                artifact_path: None,
                duration_ms: None,
                stdout: None,
                stderr: None,
                estimated_duration: Some(estimated_duration),
            },
        }
    }
}

/// Body of `GET /jobs/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub key: String,
    pub kind: JobKind,
    #[serde(flatten)]
    pub artifact: ArtifactStatus,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /jobs
///
/// Launch a job in the requested (or the kind's default) mode.
pub async fn create_job(
    State(state): State<AppState>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> AppResult<Json<JobResponse>> {
    let input = parse_body(body)?;
    let kind = input.kind.unwrap_or_default();
    let plan = state
        .jobs
        .plan(kind, input.logical_key.as_deref(), &input.options, input.mode)?;
    let key = plan.key.clean.clone();

    let result = state.jobs.launch(plan).await?;
    Ok(Json(JobResponse::from_launch(kind, &key, result)))
}

/// POST /jobs/regenerate
///
/// Re-run a job synchronously. Only valid once an artifact exists for the key.
pub async fn regenerate_job(
    State(state): State<AppState>,
    body: Result<Json<CreateJobRequest>, JsonRejection>,
) -> AppResult<Json<JobResponse>> {
    let input = parse_body(body)?;
    let kind = input.kind.unwrap_or_default();
    let plan = state.jobs.plan(
        kind,
        input.logical_key.as_deref(),
        &input.options,
        Some(JobMode::Sync),
    )?;
    let key = plan.key.clean.clone();

    let result = state.jobs.regenerate(plan).await?;
    Ok(Json(JobResponse::from_launch(kind, &key, result)))
}

/// GET /jobs/status?key=&kind=
pub async fn job_status(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> AppResult<Json<StatusResponse>> {
    let Query(query) = query.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let kind = query.kind.unwrap_or_default();
    let (key, artifact) = state.jobs.status(kind, query.key.as_deref()).await?;
    Ok(Json(StatusResponse {
        key: key.clean,
        kind,
        artifact,
    }))
}

/// GET /jobs
///
/// Supervised job history, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> Json<DataResponse<Vec<JobRecord>>> {
    Json(DataResponse {
        data: state.jobs.registry().list(),
    })
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<Json<DataResponse<JobRecord>>> {
    let record = state.jobs.registry().get(id).ok_or_else(|| job_not_found(id))?;
    Ok(Json(DataResponse { data: record }))
}

/// POST /jobs/{id}/cancel
///
/// Signal a running job to stop. Its child process is killed.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<StatusCode> {
    match state.jobs.registry().cancel(id) {
        CancelOutcome::Signalled => {
            tracing::info!(job_id = %id, "Job cancellation requested");
            Ok(StatusCode::NO_CONTENT)
        }
        CancelOutcome::AlreadyFinished => Err(AppError::Core(CoreError::Conflict(format!(
            "Job {id} has already finished"
        )))),
        CancelOutcome::Unknown => Err(job_not_found(id)),
    }
}

/// GET /jobs/export
///
/// Job history as CSV with a UTF-8 BOM so spreadsheet tools detect the encoding.
pub async fn export_jobs(State(state): State<AppState>) -> impl IntoResponse {
    let csv = to_csv_with_bom(&state.jobs.registry().list());
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"jobs.csv\"",
            ),
        ],
        csv,
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a JSON extractor rejection to a JSON 400 instead of axum's plain text.
pub(crate) fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(input)| input)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

fn job_not_found(id: JobId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "job",
        key: id.to_string(),
    })
}
