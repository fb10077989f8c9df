use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use trending_core::error::CoreError;
use trending_core::scripting::executor::ScriptError;

/// Longest stderr excerpt returned to clients (the tail is kept).
const MAX_STDERR_CHARS: usize = 4000;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`ScriptError`] for launcher
/// failures, and adds HTTP-specific variants. Implements [`IntoResponse`]
/// to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `trending_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The external script could not be resolved, launched, or completed.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut stderr = None;

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, key } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} not found for key '{key}'"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::MissingCredential(msg) => {
                    (StatusCode::BAD_REQUEST, "NO_GITHUB_TOKEN", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Launcher errors ---
            AppError::Script(err) => {
                let (code, message) = classify_script_error(err);
                stderr = err.stderr().map(stderr_tail);
                (StatusCode::INTERNAL_SERVER_ERROR, code, message)
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let mut body = json!({
            "success": false,
            "error": message,
            "code": code,
        });
        if let Some(stderr) = stderr {
            body["stderr"] = json!(stderr);
        }

        (status, axum::Json(body)).into_response()
    }
}

/// Map a launcher error to an error code and a short client-facing message.
///
/// Raw stderr is never the message; it travels separately in `stderr`.
fn classify_script_error(err: &ScriptError) -> (&'static str, String) {
    match err {
        ScriptError::InterpreterNotFound { .. } => {
            tracing::error!(error = %err, "No compatible interpreter");
            ("INTERPRETER_NOT_FOUND", err.to_string())
        }
        ScriptError::ScriptNotFound(path) => {
            tracing::error!(path = %path, "Job script missing");
            (
                "SCRIPT_NOT_FOUND",
                "Job script is not installed on the server".to_string(),
            )
        }
        ScriptError::Timeout { elapsed_ms } => (
            "JOB_TIMEOUT",
            format!("Job timed out after {elapsed_ms}ms and was stopped"),
        ),
        ScriptError::ExecutionFailed { exit_code, .. } => {
            ("JOB_FAILED", format!("Job failed with exit code {exit_code}"))
        }
        ScriptError::IoError(e) => {
            tracing::error!(error = %e, "Failed to launch job process");
            ("JOB_LAUNCH_FAILED", "Failed to launch job process".to_string())
        }
    }
}

/// Keep the last [`MAX_STDERR_CHARS`] characters; tracebacks end with the cause.
fn stderr_tail(stderr: &str) -> String {
    let count = stderr.chars().count();
    if count <= MAX_STDERR_CHARS {
        return stderr.to_string();
    }
    stderr.chars().skip(count - MAX_STDERR_CHARS).collect()
}
