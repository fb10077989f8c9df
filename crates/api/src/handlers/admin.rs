//! Maintenance handlers for the artifact directory.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use trending_core::artifacts::MigrationReport;
use trending_core::jobs::JobKind;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /admin/artifacts/migrate`. The body may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct MigrateRequest {
    /// Migrate only this kind. All kinds when absent.
    pub kind: Option<JobKind>,
}

/// POST /admin/artifacts/migrate
///
/// Rename legacy raw-key artifacts to their canonical sanitized names.
/// Files whose canonical name is already taken are left in place.
/// An empty body (with or without a content type) migrates every kind.
pub async fn migrate_artifacts(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<MigrationReport>> {
    let input: MigrateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        MigrateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid migrate request: {e}")))?
    };
    let kinds: Vec<JobKind> = match input.kind {
        Some(kind) => vec![kind],
        None => JobKind::ALL.to_vec(),
    };
    let report = state.jobs.migrate_artifacts(&kinds).await?;
    Ok(Json(report))
}
