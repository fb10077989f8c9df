use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    running_jobs: usize,
    limits: Limits,
}

/// Limits a client needs to pick a mode and a polling window.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Limits {
    request_timeout_secs: u64,
    max_job_timeout_secs: u64,
    job_history_limit: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        running_jobs: state.jobs.registry().running_count(),
        limits: Limits {
            request_timeout_secs: state.config.effective_request_timeout().as_secs(),
            max_job_timeout_secs: state.config.jobs.max_timeout().as_secs(),
            job_history_limit: state.config.jobs.job_history_limit,
        },
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
