pub mod admin;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                                 launch (POST), history (GET)
/// /jobs/regenerate                      re-run an existing artifact (POST)
/// /jobs/status                          artifact status (GET)
/// /jobs/export                          history as CSV (GET)
/// /jobs/{id}                            one job record (GET)
/// /jobs/{id}/cancel                     cancel a running job (POST)
///
/// /admin/artifacts/migrate              legacy artifact rename (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/admin", admin::router())
}
