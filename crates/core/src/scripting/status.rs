//! Lifecycle states for launched jobs.

use serde::{Deserialize, Serialize};

/// Where a job is in its lifecycle.
///
/// `Running` is the only non-terminal state; a job enters the registry
/// already running because launching is immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Script process is currently running.
    Running,
    /// Script exited 0 and its artifact exists.
    Completed,
    /// Script exited 0 but no artifact was found.
    NoOutput,
    /// Script could not be launched or exited non-zero.
    Failed,
    /// Script was killed because it exceeded its timeout.
    TimedOut,
    /// Script was killed by a cancel request, shutdown, or an aborted caller.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::NoOutput => "no_output",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!JobStatus::Running.is_terminal());
        for status in [
            JobStatus::Completed,
            JobStatus::NoOutput,
            JobStatus::Failed,
            JobStatus::TimedOut,
            JobStatus::Cancelled,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn as_str_matches_serde_name() {
        for status in [
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::NoOutput,
            JobStatus::Failed,
            JobStatus::TimedOut,
            JobStatus::Cancelled,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
    }
}
