//! Spawning and supervising one job child process.
//!
//! Provides [`run_command`], the spawn + capture + timeout logic used by
//! every launcher. The launcher builds a [`tokio::process::Command`] with
//! program and arguments; environment, working directory and supervision
//! are applied here.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::executor::{ScriptError, ScriptInput, ScriptOutput};

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output beyond this limit is read and discarded so the child never blocks
/// on a full pipe.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Spawn `cmd`, capture stdout/stderr, and enforce the configured timeout.
///
/// The child sees exactly `input.env`; nothing is inherited implicitly. The
/// process is killed when the timeout fires, and also when the returned
/// future is dropped (e.g. the HTTP request driving it was aborted).
pub async fn run_command(
    cmd: &mut Command,
    input: ScriptInput,
) -> Result<ScriptOutput, ScriptError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env_clear()
        .envs(&input.env)
        .kill_on_drop(true);

    if let Some(dir) = &input.working_directory {
        cmd.current_dir(dir);
    }

    let start = Instant::now();

    let mut child = cmd.spawn()?;

    // Read the pipes in spawned tasks so `child.wait()` can borrow `&mut child`.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let wait_result = tokio::time::timeout(input.timeout, child.wait()).await;

    match wait_result {
        Ok(Ok(status)) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
            let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
            let exit_code = status.code().unwrap_or(-1);
            let parsed_output = serde_json::from_str(stdout.trim()).ok();

            Ok(ScriptOutput {
                stdout,
                stderr,
                exit_code,
                duration_ms,
                parsed_output,
            })
        }
        Ok(Err(e)) => Err(ScriptError::IoError(e)),
        Err(_elapsed) => {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill timed-out process");
            }
            stdout_task.abort();
            stderr_task.abort();
            Err(ScriptError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Read an entire output stream, keeping the first [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    read_capped(handle, MAX_OUTPUT_BYTES).await
}

async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>, cap: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut h) = handle else {
        return buf;
    };

    if let Err(e) = (&mut h).take(cap as u64).read_to_end(&mut buf).await {
        tracing::warn!(error = %e, captured = buf.len(), "Failed to read child output");
        return buf;
    }
    if buf.len() == cap {
        match tokio::io::copy(&mut h, &mut tokio::io::sink()).await {
            Ok(0) => {}
            Ok(discarded) => {
                tracing::warn!(captured = cap, discarded, "Child output truncated");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to drain child output"),
        }
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::scripting::env::build_child_env;
    use crate::scripting::test_helpers::{default_input, write_temp_script};

    fn sh(script: &tempfile::NamedTempFile) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg(script.path());
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let script = write_temp_script("echo hello\necho oops >&2\n");
        let output = run_command(&mut sh(&script), default_input())
            .await
            .expect("run");
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_raised() {
        let script = write_temp_script("exit 42\n");
        let output = run_command(&mut sh(&script), default_input())
            .await
            .expect("run");
        assert_eq!(output.exit_code, 42);
    }

    #[tokio::test]
    async fn child_sees_only_the_built_environment() {
        let script = write_temp_script("echo \"$JOB_VAR|${UNSET_IN_CHILD:-none}\"\n");
        let mut input = default_input();
        input.env = build_child_env(
            [("JOB_VAR", "hello_world")],
            &[],
        );
        let output = run_command(&mut sh(&script), input).await.expect("run");
        assert_eq!(output.stdout.trim(), "hello_world|none");
    }

    #[tokio::test]
    async fn timeout_kills_within_margin() {
        let script = write_temp_script("sleep 30\n");
        let mut input = default_input();
        input.timeout = Duration::from_millis(200);

        let start = Instant::now();
        let result = run_command(&mut sh(&script), input).await;
        let elapsed = start.elapsed();

        assert_matches!(result, Err(ScriptError::Timeout { elapsed_ms }) if elapsed_ms >= 200);
        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn parses_json_stdout() {
        let script = write_temp_script(r#"echo '{"result": 123}'"#);
        let output = run_command(&mut sh(&script), default_input())
            .await
            .expect("run");
        let parsed = output.parsed_output.expect("should parse JSON");
        assert_eq!(parsed["result"], 123);
    }

    #[tokio::test]
    async fn honours_working_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = write_temp_script("pwd\n");
        let mut input = default_input();
        input.working_directory = Some(dir.path().to_str().expect("path").to_string());

        let output = run_command(&mut sh(&script), input).await.expect("run");
        let expected = dir.path().canonicalize().expect("canonicalize dir");
        let actual = std::path::Path::new(output.stdout.trim())
            .canonicalize()
            .expect("canonicalize pwd");
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn output_beyond_cap_is_drained() {
        let data = vec![b'x'; 64 * 1024];
        let captured = read_capped(Some(&data[..]), 1024).await;
        assert_eq!(captured.len(), 1024);

        let short = read_capped(Some(&b"abc"[..]), 1024).await;
        assert_eq!(short, b"abc");
    }

    #[tokio::test]
    async fn chatty_child_is_not_blocked_by_a_full_pipe() {
        // Several pipe buffers' worth of stderr before exiting.
        let script = write_temp_script(
            "i=0\nwhile [ $i -lt 4000 ]; do echo 'line of noise for the pipe' >&2; i=$((i+1)); done\necho done\n",
        );
        let output = run_command(&mut sh(&script), default_input())
            .await
            .expect("run");
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "done");
        assert_eq!(output.stderr.lines().count(), 4000);
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let mut cmd = Command::new("/nonexistent/interpreter");
        let result = run_command(&mut cmd, default_input()).await;
        assert_matches!(result, Err(ScriptError::IoError(_)));
    }
}
