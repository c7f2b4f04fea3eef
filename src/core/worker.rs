//! # Worker state machine and result snapshots.
//!
//! Every runnable entity (probe, task, group, script) embeds a [`Worker`]:
//! a mutex-guarded `New → Running → Finished` state machine paired with two
//! [`RunResult`] snapshots:
//!
//! - `current` — the in-flight or just-finished run,
//! - `previous` — the last fully finished run.
//!
//! Readers that must never observe partial state (status endpoints, metric
//! exporters) ask for [`Worker::finished_result`], which returns `previous`
//! and therefore cannot race with a run in progress.
//!
//! ## Rules
//! - `run()` is legal from `New` or `Finished` only; from `Running` it fails
//!   with [`StateError::AlreadyRunning`].
//! - `finish(success)` is legal from `Running` only; otherwise it fails with
//!   [`StateError::InvalidTransition`].
//! - Every accessor copies the snapshot out of the mutex — no caller ever
//!   aliases mutable state or observes a torn [`RunResult`].

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StateError;

/// Lifecycle status of a runnable entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Created, never started.
    #[default]
    New,
    /// A run is in progress (or a background probe is still alive).
    Running,
    /// The last run has completed.
    Finished,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerStatus::New => "new",
            WorkerStatus::Running => "running",
            WorkerStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// Timestamped outcome of a single run.
///
/// Immutable snapshot semantics: instances handed out by [`Worker`] are
/// copies and never change after being returned.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Wall-clock start of the run (`None` until the first run).
    pub started_at: Option<DateTime<Utc>>,
    /// Total run duration; zero while the run is still in progress.
    #[serde(rename = "runtimeMs", with = "crate::util::duration_ms")]
    pub runtime: Duration,
    /// Whether the run succeeded.
    pub success: bool,
    /// Number of runs started so far (1 after the first `run()`).
    pub run_counter: u64,
}

impl RunResult {
    /// Resets the snapshot for a new run: zero runtime, success cleared,
    /// start stamped, run counter incremented.
    fn prepare_to_start(&mut self) {
        self.success = false;
        self.started_at = Some(Utc::now());
        self.runtime = Duration::ZERO;
        self.run_counter += 1;
    }

    /// Stamps the runtime and records the outcome.
    fn end(&mut self, success: bool) {
        self.runtime = self
            .started_at
            .map(|t| (Utc::now() - t).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(Duration::ZERO);
        self.success = success;
    }

    /// True iff the run has ended (`runtime != 0`).
    pub fn completed(&self) -> bool {
        self.runtime != Duration::ZERO
    }
}

#[derive(Debug, Default)]
struct WorkerState {
    status: WorkerStatus,
    current: RunResult,
    previous: RunResult,
}

/// Guarded `New → Running → Finished` lifecycle with dual result snapshots.
///
/// Concurrent calls are serialized by an internal mutex; the lock is never
/// held across an await point.
#[derive(Debug, Default)]
pub struct Worker {
    state: Mutex<WorkerState>,
}

impl Worker {
    /// Creates a worker in the `New` state.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transitions to `Running` and prepares the current result.
    ///
    /// Fails with [`StateError::AlreadyRunning`] if a run is in progress.
    pub fn run(&self) -> Result<(), StateError> {
        let mut st = self.lock();
        if st.status == WorkerStatus::Running {
            return Err(StateError::AlreadyRunning);
        }
        st.status = WorkerStatus::Running;
        st.current.prepare_to_start();
        Ok(())
    }

    /// Transitions to `Finished`, ends the current result, and copies it
    /// into the `previous` slot.
    ///
    /// Fails with [`StateError::InvalidTransition`] unless `Running`.
    pub fn finish(&self, success: bool) -> Result<(), StateError> {
        let mut st = self.lock();
        if st.status != WorkerStatus::Running {
            return Err(StateError::InvalidTransition {
                from: st.status,
                to: WorkerStatus::Finished,
            });
        }
        st.status = WorkerStatus::Finished;
        st.current.end(success);
        st.previous = st.current.clone();
        Ok(())
    }

    /// Returns a copy of the current (possibly in-flight) result and the
    /// status. Safe to call concurrently with a running entity; the
    /// returned result has zero runtime if still in progress.
    pub fn status(&self) -> (RunResult, WorkerStatus) {
        let st = self.lock();
        (st.current.clone(), st.status)
    }

    /// Returns the last **completed** snapshot, ignoring any run currently
    /// in progress.
    pub fn finished_result(&self) -> RunResult {
        self.lock().previous.clone()
    }

    /// Convenience accessor for the status alone.
    pub fn current_status(&self) -> WorkerStatus {
        self.lock().status
    }
}
