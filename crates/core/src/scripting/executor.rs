//! The launcher seam and the types that cross it.
//!
//! Defines [`ScriptExecutor`], the seam every launcher implements, along
//! with [`ScriptInput`], [`ScriptOutput`], and [`ScriptError`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::env::ChildEnv;
use super::interpreter::MinVersion;

/// Input handed to a script executor.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    /// Arguments appended after the script path.
    pub args: Vec<String>,
    /// Complete environment for the child process. The parent environment is
    /// NOT inherited implicitly; build this with [`super::env::build_child_env`].
    pub env: ChildEnv,
    /// Working directory for the child process (uses current dir if `None`).
    pub working_directory: Option<String>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

/// Captured output from a script execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutput {
    /// Complete stdout captured from the process.
    pub stdout: String,
    /// Complete stderr captured from the process.
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Stdout parsed as JSON, or `None` if stdout is not valid JSON.
    pub parsed_output: Option<Value>,
}

impl ScriptOutput {
    /// Turn a non-zero exit into [`ScriptError::ExecutionFailed`].
    pub fn into_result(self) -> Result<ScriptOutput, ScriptError> {
        if self.exit_code == 0 {
            Ok(self)
        } else {
            Err(ScriptError::ExecutionFailed {
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
                duration_ms: self.duration_ms,
            })
        }
    }
}

/// Errors that can occur while resolving, spawning, or supervising a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// No candidate interpreter satisfied the version floor.
    #[error(
        "No Python interpreter >= {required} found (tried: {}). \
         Install Python {required}+ or set PYTHON_BIN to a compatible interpreter",
        tried.join(", ")
    )]
    InterpreterNotFound {
        required: MinVersion,
        tried: Vec<String>,
    },

    /// The script file was not found at the specified path.
    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    /// The script exceeded its configured timeout and was killed.
    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed wall-clock time before the process was killed.
        elapsed_ms: u64,
    },

    /// The script ran but exited with a non-zero exit code.
    #[error("Script failed with exit code {exit_code}")]
    ExecutionFailed {
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    },

    /// An I/O error occurred while spawning or communicating with the process.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScriptError {
    /// Captured stderr, when the process got far enough to produce any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ExecutionFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Trait implemented by every job launcher.
///
/// Object-safe so that the HTTP layer can hold an `Arc<dyn ScriptExecutor>`
/// and tests can substitute a stub.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute the script at `script_path` with the given `input`.
    ///
    /// Implementations must map a non-zero exit to
    /// [`ScriptError::ExecutionFailed`] rather than returning `Ok`.
    async fn execute(
        &self,
        script_path: &Path,
        input: ScriptInput,
    ) -> Result<ScriptOutput, ScriptError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
