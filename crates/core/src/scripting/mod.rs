//! External script orchestration.
//!
//! Resolves a Python interpreter, builds the child environment explicitly,
//! and supervises the spawned process (capture, timeout, kill). Nothing in
//! here knows about HTTP; handlers talk to it through [`executor::ScriptExecutor`]
//! so tests can swap in a stub without spawning real processes.

pub mod env;
pub mod executor;
pub mod interpreter;
pub mod python;
pub mod status;
pub mod subprocess;

/// Shared test helpers for executor tests.
#[cfg(test)]
pub(crate) mod test_helpers {
    use std::time::Duration;

    use super::env::build_child_env;
    use super::executor::ScriptInput;

    /// Build a default [`ScriptInput`] for tests.
    ///
    /// Inherits the test process environment (so `PATH` resolves), passes
    /// no arguments, and uses a 5-second timeout.
    pub fn default_input() -> ScriptInput {
        ScriptInput {
            args: vec![],
            env: build_child_env(std::env::vars(), &[]),
            working_directory: None,
            timeout: Duration::from_secs(5),
        }
    }

    /// Write `body` to a temporary `.sh` file run through `/bin/sh`.
    pub fn write_temp_script(body: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/sh").expect("write shebang");
        write!(f, "{body}").expect("write body");
        f
    }
}
