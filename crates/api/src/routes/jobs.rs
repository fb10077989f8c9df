//! Route definitions for job endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                 -> create_job
/// GET    /                 -> list_jobs
/// POST   /regenerate       -> regenerate_job
/// GET    /status           -> job_status
/// GET    /export           -> export_jobs
/// GET    /{id}             -> get_job
/// POST   /{id}/cancel      -> cancel_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route("/regenerate", post(jobs::regenerate_job))
        .route("/status", get(jobs::job_status))
        .route("/export", get(jobs::export_jobs))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
}
