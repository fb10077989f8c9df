//! Python interpreter resolution.
//!
//! Probes a prioritized list of candidate commands (configured override
//! first, then platform defaults) and picks the first one whose reported
//! version meets the floor. Nothing is cached; every call probes afresh.

use std::collections::HashSet;
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use super::executor::ScriptError;

/// Matches the `Python X.Y[.Z]` banner printed by `--version`.
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Python (\d+)\.(\d+)(?:\.(\d+))?").expect("valid regex"));

/// Upper bound on a single `--version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum acceptable interpreter version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinVersion {
    pub major: u32,
    pub minor: u32,
}

impl MinVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse a `"3.12"`-style string.
    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = s.trim().split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl Default for MinVersion {
    fn default() -> Self {
        Self::new(3, 12)
    }
}

impl fmt::Display for MinVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Version reported by an interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
}

impl PythonVersion {
    /// Extract a version from `--version` output. Returns `None` when the
    /// banner is missing or malformed.
    pub fn parse(output: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(output)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps.get(3).and_then(|m| m.as_str().parse().ok()),
        })
    }

    pub fn satisfies(&self, required: MinVersion) -> bool {
        (self.major, self.minor) >= (required.major, required.minor)
    }
}

/// Runs `<candidate> --version` and returns whatever it printed.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    /// `None` means the candidate could not be executed at all.
    async fn probe(&self, candidate: &str) -> Option<String>;
}

/// Probe that actually spawns the candidate.
pub struct CommandProbe;

#[async_trait]
impl VersionProbe for CommandProbe {
    async fn probe(&self, candidate: &str) -> Option<String> {
        let (program, prefix) = split_command(candidate)?;
        let mut cmd = Command::new(program);
        cmd.args(prefix)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(PROBE_TIMEOUT, cmd.output())
            .await
            .ok()?
            .ok()?;

        // Python < 3.4 prints the banner on stderr.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Some(text)
    }
}

/// Split a candidate such as `py -3.12` into program and leading arguments.
pub fn split_command(candidate: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = candidate.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Candidate commands in probe order.
pub fn candidate_commands(required: MinVersion, override_bin: Option<&str>) -> Vec<String> {
    let MinVersion { major, minor } = required;
    let mut candidates = Vec::new();

    if let Some(bin) = override_bin.map(str::trim).filter(|b| !b.is_empty()) {
        candidates.push(bin.to_string());
    }
    if cfg!(windows) {
        candidates.push(format!("py -{major}.{minor}"));
    }
    candidates.push(format!("python{major}.{minor}"));
    candidates.push(format!("python{major}"));
    candidates.push("python".to_string());

    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.clone()));
    candidates
}

/// Finds a compatible interpreter among the candidate commands.
#[derive(Clone)]
pub struct InterpreterResolver {
    probe: Arc<dyn VersionProbe>,
    override_bin: Option<String>,
    required: MinVersion,
}

impl InterpreterResolver {
    pub fn new(probe: Arc<dyn VersionProbe>, override_bin: Option<String>, required: MinVersion) -> Self {
        Self {
            probe,
            override_bin,
            required,
        }
    }

    pub fn required(&self) -> MinVersion {
        self.required
    }

    /// Return the first candidate whose version is at least the floor.
    ///
    /// Candidates that are missing or print an unparsable banner are
    /// skipped; only exhausting the list is an error.
    pub async fn resolve(&self) -> Result<String, ScriptError> {
        let candidates = candidate_commands(self.required, self.override_bin.as_deref());

        for candidate in &candidates {
            let Some(output) = self.probe.probe(candidate).await else {
                tracing::debug!(candidate = %candidate, "Interpreter candidate not executable");
                continue;
            };

            match PythonVersion::parse(&output) {
                Some(version) if version.satisfies(self.required) => {
                    tracing::debug!(
                        candidate = %candidate,
                        major = version.major,
                        minor = version.minor,
                        "Resolved Python interpreter",
                    );
                    return Ok(candidate.clone());
                }
                Some(version) => {
                    let is_override = self.override_bin.as_deref() == Some(candidate.as_str());
                    if is_override {
                        tracing::warn!(
                            candidate = %candidate,
                            found = %format!("{}.{}", version.major, version.minor),
                            required = %self.required,
                            "PYTHON_BIN does not meet the version requirement",
                        );
                    }
                }
                None => {
                    tracing::debug!(candidate = %candidate, output = %output.trim(), "Unparsable version banner");
                }
            }
        }

        Err(ScriptError::InterpreterNotFound {
            required: self.required,
            tried: candidates,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
