//! # Task: a named binding of a probe to a concurrency group.
//!
//! A [`Task`] wraps probe execution in its own worker state machine and
//! carries the metadata the reporting layer needs (name, group label,
//! optional metric labels).
//!
//! ## Rules
//! - A task owns its probe; the only other holder of the probe reference is
//!   the retirement queue, for stay-alive probes.
//! - `start` returns the state-transition error separately from the probe's
//!   own error (retrievable via [`Probe::error`](crate::Probe::error)).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::core::{RunResult, Worker, WorkerStatus};
use crate::error::StateError;
use crate::probes::{ProbeRef, ProbeResult};

/// A named probe bound to a concurrency group within a script.
pub struct Task {
    name: String,
    cgroup: Option<String>,
    labels: BTreeMap<String, String>,
    probe: ProbeRef,
    worker: Worker,
}

/// Serializable snapshot of one task execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// Task name from the script declaration.
    pub name: String,
    /// Lifecycle status at snapshot time.
    pub status: WorkerStatus,
    /// Timing/outcome of the task run.
    pub result: RunResult,
    /// Optional metric labels from the declaration.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Nested probe snapshot.
    pub probe: ProbeResult,
}

impl Task {
    /// Creates a task. `cgroup = None` buckets it into the current
    /// anonymous group when added to a script.
    pub fn new(name: impl Into<String>, cgroup: Option<String>, probe: ProbeRef) -> Self {
        Self {
            name: name.into(),
            cgroup,
            labels: BTreeMap::new(),
            probe,
            worker: Worker::new(),
        }
    }

    /// Attaches metric labels.
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared concurrency-group name, if any.
    pub fn cgroup(&self) -> Option<&str> {
        self.cgroup.as_deref()
    }

    /// The probe this task drives.
    pub fn probe(&self) -> &dyn crate::probes::Probe {
        self.probe.as_ref()
    }

    /// Shared handle to the probe, for the retirement queue.
    pub fn probe_ref(&self) -> ProbeRef {
        Arc::clone(&self.probe)
    }

    /// Runs the task once: drives its own state machine around the probe.
    ///
    /// Returns the probe's success, or a [`StateError`] when the task was
    /// already running (overlapping invocation).
    pub async fn start(&self, token: CancellationToken) -> Result<bool, StateError> {
        self.worker.run()?;
        let span = info_span!("task", task = %self.name);
        let succ = self.probe.start(token).instrument(span).await;
        self.worker.finish(succ)?;
        Ok(succ)
    }

    /// Snapshot of the current (possibly in-flight) run.
    pub fn result(&self) -> TaskResult {
        let (result, status) = self.worker.status();
        TaskResult {
            name: self.name.clone(),
            status,
            result,
            labels: self.labels.clone(),
            probe: self.probe.result(),
        }
    }

    /// Snapshot of the last completed run only.
    pub fn finished_result(&self) -> TaskResult {
        let result = self.worker.finished_result();
        let status = if result.completed() {
            WorkerStatus::Finished
        } else {
            WorkerStatus::New
        };
        TaskResult {
            name: self.name.clone(),
            status,
            result,
            labels: self.labels.clone(),
            probe: self.probe.finished_result(),
        }
    }
}
