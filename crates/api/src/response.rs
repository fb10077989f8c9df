//! Shared response envelope types for API handlers.
//!
//! Collection and lookup routes use a `{ "data": ... }` envelope. Job
//! launch and status routes return their flat documents directly because
//! the dashboard reads `success` and `artifactPath` at the top level.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// # Example
///
/// ```ignore
/// Ok(Json(DataResponse { data: records }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
