//! Python job launcher.
//!
//! Resolves a compatible interpreter on every launch, then runs
//! `<interpreter> <script> <args...>` under [`subprocess::run_command`].

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;

use super::executor::{ScriptError, ScriptExecutor, ScriptInput, ScriptOutput};
use super::interpreter::{split_command, InterpreterResolver};
use super::subprocess;

/// Executor for Python scripts.
pub struct PythonLauncher {
    resolver: InterpreterResolver,
}

impl PythonLauncher {
    pub fn new(resolver: InterpreterResolver) -> Self {
        Self { resolver }
    }

    /// Build the command line for `interpreter script args...`.
    fn build_command(interpreter: &str, script_path: &Path, args: &[String]) -> Option<Command> {
        let (program, prefix) = split_command(interpreter)?;
        let mut cmd = Command::new(program);
        cmd.args(prefix).arg(script_path).args(args);
        Some(cmd)
    }
}

#[async_trait]
impl ScriptExecutor for PythonLauncher {
    async fn execute(
        &self,
        script_path: &Path,
        input: ScriptInput,
    ) -> Result<ScriptOutput, ScriptError> {
        if fs::metadata(script_path).await.is_err() {
            return Err(ScriptError::ScriptNotFound(script_path.display().to_string()));
        }

        let interpreter = self.resolver.resolve().await?;
        let mut cmd = Self::build_command(&interpreter, script_path, &input.args).ok_or_else(|| {
            ScriptError::InterpreterNotFound {
                required: self.resolver.required(),
                tried: vec![interpreter.clone()],
            }
        })?;

        tracing::info!(
            interpreter = %interpreter,
            script = %script_path.display(),
            args = ?input.args,
            timeout_ms = input.timeout.as_millis() as u64,
            "Launching script",
        );

        subprocess::run_command(&mut cmd, input).await?.into_result()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::scripting::interpreter::{MinVersion, VersionProbe};
    use crate::scripting::test_helpers::{default_input, write_temp_script};

    /// Reports every candidate as Python 3.12 so `/bin/sh` can stand in as
    /// the "interpreter" for shell-script fixtures.
    struct ShellAsPython;

    #[async_trait]
    impl VersionProbe for ShellAsPython {
        async fn probe(&self, candidate: &str) -> Option<String> {
            (candidate == "/bin/sh").then(|| "Python 3.12.0".to_string())
        }
    }

    struct NothingInstalled;

    #[async_trait]
    impl VersionProbe for NothingInstalled {
        async fn probe(&self, _candidate: &str) -> Option<String> {
            None
        }
    }

    fn shell_launcher() -> PythonLauncher {
        PythonLauncher::new(InterpreterResolver::new(
            Arc::new(ShellAsPython),
            Some("/bin/sh".to_string()),
            MinVersion::new(3, 12),
        ))
    }

    #[tokio::test]
    async fn passes_arguments_after_script() {
        let script = write_temp_script("echo \"$1 $2\"\n");
        let mut input = default_input();
        input.args = vec!["--keywords".to_string(), "vue".to_string()];

        let output = shell_launcher()
            .execute(script.path(), input)
            .await
            .expect("execute");
        assert_eq!(output.stdout.trim(), "--keywords vue");
    }

    #[tokio::test]
    async fn nonzero_exit_becomes_execution_failed() {
        let script = write_temp_script("echo bad >&2\nexit 2\n");
        let result = shell_launcher().execute(script.path(), default_input()).await;
        assert_matches!(
            result,
            Err(ScriptError::ExecutionFailed { exit_code: 2, ref stderr, .. }) if stderr.trim() == "bad"
        );
    }

    #[tokio::test]
    async fn missing_script_is_reported_before_resolution() {
        let launcher = PythonLauncher::new(InterpreterResolver::new(
            Arc::new(NothingInstalled),
            None,
            MinVersion::new(3, 12),
        ));
        let result = launcher
            .execute(Path::new("/nonexistent/job.py"), default_input())
            .await;
        assert_matches!(result, Err(ScriptError::ScriptNotFound(_)));
    }

    #[tokio::test]
    async fn missing_interpreter_is_reported() {
        let script = write_temp_script("exit 0\n");
        let launcher = PythonLauncher::new(InterpreterResolver::new(
            Arc::new(NothingInstalled),
            None,
            MinVersion::new(3, 12),
        ));
        let result = launcher.execute(script.path(), default_input()).await;
        assert_matches!(result, Err(ScriptError::InterpreterNotFound { .. }));
    }

    #[tokio::test]
    async fn timeout_is_propagated() {
        let script = write_temp_script("sleep 30\n");
        let mut input = default_input();
        input.timeout = Duration::from_millis(150);
        let result = shell_launcher().execute(script.path(), input).await;
        assert_matches!(result, Err(ScriptError::Timeout { .. }));
    }
}
