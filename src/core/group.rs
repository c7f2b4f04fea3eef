//! # Concurrency group: parallel fan-out with a join barrier.
//!
//! A [`Group`] is a bag of tasks that run fully in parallel; groups within a
//! script execute strictly one after another. Groups provide controlled
//! parallelism boundaries (isolate a slow probe from fast ones) while the
//! sequential group order keeps inter-group effects deterministic.
//!
//! ## Run flow
//! ```text
//! run(token, retired)
//!   ├─► worker.run()          (log & abort this group if already running;
//!   │                          the script continues)
//!   ├─► JoinSet: one task per member, each Task::start(token)
//!   ├─► barrier: join all     (no partial cancellation of siblings)
//!   ├─► enqueue probes with is_alive() onto the retirement queue
//!   └─► worker.finish(AND of this group's task successes)
//! ```
//!
//! ## Rules
//! - No ordering between tasks inside a group is guaranteed or observable.
//! - One task's failure never cancels its siblings.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::core::{RetireQueue, Task, Worker};
use crate::probes::ProbeRef;

/// A named (or anonymous) set of tasks executed in parallel.
pub struct Group {
    name: Option<String>,
    worker: Worker,
    tasks: Vec<Arc<Task>>,
}

impl Group {
    /// Creates an empty group. `name = None` marks an anonymous group.
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            worker: Worker::new(),
            tasks: Vec::new(),
        }
    }

    /// Declared group name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for logging: the declared name or `"anonymous"`.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }

    /// Tasks in this group, in declaration order.
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub(crate) fn push(&mut self, task: Arc<Task>) {
        self.tasks.push(task);
    }

    /// Runs every task in parallel and blocks until all have returned.
    ///
    /// Probes still alive after their task returned are enqueued onto
    /// `retired` for deferred finish at script completion. Group success is
    /// the AND of this group's own task results.
    pub async fn run(&self, token: CancellationToken, retired: &RetireQueue) -> bool {
        if let Err(e) = self.worker.run() {
            warn!(cgroup = self.label(), error = %e, "group can't start");
            return false;
        }

        let mut set: JoinSet<Option<ProbeRef>> = JoinSet::new();
        for task in &self.tasks {
            let task = Arc::clone(task);
            let token = token.clone();
            set.spawn(async move {
                if let Err(e) = task.start(token).await {
                    warn!(task = task.name(), error = %e, "task can't start");
                }
                if task.probe().is_alive() {
                    Some(task.probe_ref())
                } else {
                    None
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(probe)) => retired.push(probe),
                Ok(None) => {}
                // Task futures contain no panicking code of their own
                // (probe faults are caught at the probe boundary).
                Err(e) => error!(cgroup = self.label(), error = %e, "task join failed"),
            }
        }

        let succ = self.tasks.iter().all(|t| t.result().result.success);
        let _ = self.worker.finish(succ);
        succ
    }

    /// Snapshot of the group's own worker state.
    pub fn result(&self) -> (crate::core::RunResult, crate::core::WorkerStatus) {
        self.worker.status()
    }
}
