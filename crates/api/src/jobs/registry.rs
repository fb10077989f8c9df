//! In-memory registry of launched jobs.
//!
//! Tracks every job from launch to a terminal state so async outcomes can
//! be polled, guards against two running jobs writing the same file, and holds
//! the cancellation token for each running job.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use trending_core::error::CoreError;
use trending_core::export::CsvRecord;
use trending_core::jobs::{JobKind, JobMode, ValidKey};
use trending_core::scripting::status::JobStatus;
use trending_core::types::{JobId, Timestamp};

/// Snapshot of one job, as returned by the polling and export routes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    /// Cleaned logical key, as passed to the script.
    pub key: String,
    pub mode: JobMode,
    pub status: JobStatus,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub artifact_path: Option<String>,
    pub error: Option<String>,
}

impl CsvRecord for JobRecord {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "kind",
            "key",
            "mode",
            "status",
            "startedAt",
            "finishedAt",
            "durationMs",
            "exitCode",
            "artifactPath",
            "error",
        ]
    }

    fn fields(&self) -> Vec<Option<String>> {
        let mode = match self.mode {
            JobMode::Sync => "sync",
            JobMode::Async => "async",
        };
        vec![
            Some(self.id.to_string()),
            Some(self.kind.to_string()),
            Some(self.key.clone()),
            Some(mode.to_string()),
            Some(self.status.to_string()),
            Some(self.started_at.to_rfc3339()),
            self.finished_at.map(|t| t.to_rfc3339()),
            self.duration_ms.map(|d| d.to_string()),
            self.exit_code.map(|c| c.to_string()),
            self.artifact_path.clone(),
            self.error.clone(),
        ]
    }
}

/// Terminal details recorded when a job stops.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub status: JobStatus,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub artifact_path: Option<String>,
    pub error: Option<String>,
}

impl JobCompletion {
    pub fn cancelled(reason: &str) -> Self {
        Self {
            status: JobStatus::Cancelled,
            duration_ms: None,
            exit_code: None,
            artifact_path: None,
            error: Some(reason.to_string()),
        }
    }
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was running; its token has been triggered.
    Signalled,
    /// The job already reached a terminal state.
    AlreadyFinished,
    /// No job with that ID is known.
    Unknown,
}

#[derive(Default)]
struct RegistryInner {
    records: HashMap<JobId, JobRecord>,
    /// Artifact slot of every running job.
    running: HashMap<String, JobId>,
    tokens: HashMap<JobId, CancellationToken>,
}

/// Thread-safe job registry; designed to be wrapped in `Arc` and shared.
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
    history_limit: usize,
}

impl JobRegistry {
    /// Create an empty registry that keeps at most `history_limit` finished jobs.
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            history_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new running job.
    ///
    /// `slot` names the artifact the job writes (see
    /// [`ArtifactTarget::slot`](trending_core::artifacts::ArtifactTarget::slot)).
    /// Fails with [`CoreError::Conflict`] while another job writing the same
    /// slot is still running, whatever its kind.
    pub fn begin(
        self: &Arc<Self>,
        kind: JobKind,
        key: &ValidKey,
        slot: String,
        mode: JobMode,
    ) -> Result<RunningJob, CoreError> {
        let mut inner = self.lock();

        if let Some(existing) = inner.running.get(&slot) {
            return Err(CoreError::Conflict(format!(
                "A job writing '{slot}' is already running (job {existing})"
            )));
        }

        let id = JobId::new_v4();
        let cancel = CancellationToken::new();
        inner.running.insert(slot, id);
        inner.tokens.insert(id, cancel.clone());
        inner.records.insert(
            id,
            JobRecord {
                id,
                kind,
                key: key.clean.clone(),
                mode,
                status: JobStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
                duration_ms: None,
                exit_code: None,
                artifact_path: None,
                error: None,
            },
        );

        Ok(RunningJob {
            id,
            cancel,
            registry: Arc::clone(self),
            finished: false,
        })
    }

    /// Move a running job to a terminal state. No-op if it already is.
    fn finish(&self, id: JobId, completion: JobCompletion) {
        let mut inner = self.lock();

        let Some(record) = inner.records.get_mut(&id) else {
            return;
        };
        if record.status.is_terminal() {
            return;
        }

        record.status = completion.status;
        record.finished_at = Some(Utc::now());
        record.duration_ms = completion.duration_ms;
        record.exit_code = completion.exit_code;
        record.artifact_path = completion.artifact_path;
        record.error = completion.error;

        inner.running.retain(|_, running_id| *running_id != id);
        inner.tokens.remove(&id);

        Self::prune(&mut inner, self.history_limit);
    }

    /// Drop the oldest finished records beyond the history limit.
    fn prune(inner: &mut RegistryInner, limit: usize) {
        let mut finished: Vec<(Timestamp, JobId)> = inner
            .records
            .values()
            .filter(|r| r.status.is_terminal())
            .map(|r| (r.finished_at.unwrap_or(r.started_at), r.id))
            .collect();

        if finished.len() <= limit {
            return;
        }

        finished.sort();
        let excess = finished.len() - limit;
        for (_, id) in finished.into_iter().take(excess) {
            inner.records.remove(&id);
        }
    }

    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// All known jobs, newest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.lock().records.values().cloned().collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    /// Trigger cancellation of a running job.
    ///
    /// The job's own task records the `cancelled` state once its child
    /// process has been killed.
    pub fn cancel(&self, id: JobId) -> CancelOutcome {
        let inner = self.lock();
        match (inner.tokens.get(&id), inner.records.get(&id)) {
            (Some(token), _) => {
                token.cancel();
                CancelOutcome::Signalled
            }
            (None, Some(_)) => CancelOutcome::AlreadyFinished,
            (None, None) => CancelOutcome::Unknown,
        }
    }

    /// Trigger cancellation of every running job. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let inner = self.lock();
        for token in inner.tokens.values() {
            token.cancel();
        }
        inner.tokens.len()
    }
}

/// Handle to a job that is still running.
///
/// Dropping it without calling [`finish`](Self::finish) records the job as
/// cancelled, which covers aborted requests and panicking tasks.
pub struct RunningJob {
    id: JobId,
    cancel: CancellationToken,
    registry: Arc<JobRegistry>,
    finished: bool,
}

impl std::fmt::Debug for RunningJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningJob")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl RunningJob {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn finish(mut self, completion: JobCompletion) {
        self.finished = true;
        self.registry.finish(self.id, completion);
    }
}

impl Drop for RunningJob {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(job_id = %self.id, "Job handle dropped before completion");
            self.registry
                .finish(self.id, JobCompletion::cancelled("Job was abandoned before completion"));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
