//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no router needed.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use trending_api::error::AppError;
use trending_core::error::CoreError;
use trending_core::scripting::executor::ScriptError;
use trending_core::scripting::interpreter::MinVersion;

/// Convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "artifact",
        key: "vue".to_string(),
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "artifact not found for key 'vue'");
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("bad field".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "bad field");
}

#[tokio::test]
async fn missing_credential_returns_no_github_token() {
    let err = AppError::Core(CoreError::MissingCredential("no token".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "NO_GITHUB_TOKEN");
}

#[tokio::test]
async fn conflict_returns_409() {
    let (status, json) =
        error_to_response(AppError::Core(CoreError::Conflict("busy".into()))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn interpreter_not_found_names_the_override() {
    let err = AppError::Script(ScriptError::InterpreterNotFound {
        required: MinVersion::default(),
        tried: vec!["python3.12".into(), "python3".into()],
    });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERPRETER_NOT_FOUND");
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("3.12"));
    assert!(message.contains("PYTHON_BIN"));
}

#[tokio::test]
async fn timeout_returns_job_timeout() {
    let err = AppError::Script(ScriptError::Timeout { elapsed_ms: 600_000 });

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "JOB_TIMEOUT");
    assert!(json.get("stderr").is_none());
}

#[tokio::test]
async fn long_stderr_is_truncated_to_its_tail() {
    let stderr = format!("{}Error: the real cause", "x".repeat(10_000));
    let err = AppError::Script(ScriptError::ExecutionFailed {
        exit_code: 1,
        stdout: String::new(),
        stderr,
        duration_ms: 10,
    });

    let (_, json) = error_to_response(err).await;

    let tail = json["stderr"].as_str().unwrap();
    assert_eq!(tail.chars().count(), 4000);
    assert!(tail.ends_with("Error: the real cause"));
}

#[tokio::test]
async fn internal_error_is_sanitized() {
    let err = AppError::InternalError("disk path /secret leaked".into());

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}
