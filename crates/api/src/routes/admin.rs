//! Route definitions for maintenance endpoints.

use axum::routing::post;
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// POST   /artifacts/migrate  -> migrate_artifacts
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/artifacts/migrate", post(admin::migrate_artifacts))
}
