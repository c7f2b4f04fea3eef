//! # Script: the top-level orchestrated unit.
//!
//! A [`Script`] holds an ordered sequence of concurrency groups, runs them
//! one after another, aggregates success across every task, and drains the
//! background-probe retirement queue once the whole run completes. The same
//! instance is runnable repeatedly (scheduled invocations); the run counter
//! on its result distinguishes invocations.
//!
//! ## Run flow
//! ```text
//! run(token)
//!   ├─► worker.run()          ← the sole guard against overlapping
//!   │                           invocations of the same script
//!   ├─► for each group, in declaration order:
//!   │     ├─ token cancelled? → skip remaining groups
//!   │     └─ group.run(token, retired)   (synchronous to completion)
//!   ├─► success = AND of every task's latest result
//!   ├─► worker.finish(success)
//!   └─► drain retirement queue: probe.finish() for each stay-alive probe
//!       (always after the full run, even when the token was cancelled)
//! ```
//!
//! ## Group assignment
//! `add_task` is order-sensitive, not name-keyed: a new group is created
//! only when the immediately preceding task's group name differs from the
//! current one. Two non-adjacent declarations with the same group name
//! produce two distinct groups, and anonymous tasks separated by a named
//! group land in distinct anonymous groups.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::core::{Group, RetireQueue, RunResult, Task, TaskResult, Worker, WorkerStatus};

/// Default whole-script timeout applied by the configuration layer.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Ordered groups of tasks, runnable as one unit.
pub struct Script {
    tasks: Vec<Arc<Task>>,
    groups: Vec<Group>,
    worker: Worker,
    timeout: Duration,
    retired: RetireQueue,
}

/// Full serializable snapshot of a script run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    /// Lifecycle status at snapshot time.
    pub status: WorkerStatus,
    /// Timing/outcome of the script run.
    pub result: RunResult,
    /// Per-task snapshots, in declaration order.
    pub tasks: Vec<TaskResult>,
}

impl Default for Script {
    fn default() -> Self {
        Self::new()
    }
}

impl Script {
    /// Creates an empty script with the default timeout.
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            groups: Vec::new(),
            worker: Worker::new(),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
            retired: RetireQueue::new(),
        }
    }

    /// Sets the whole-script timeout (enforced by the caller via the
    /// cancellation token; see the CLI and scheduler).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured whole-script timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Flat task list, in declaration order.
    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    /// Groups, in creation (declaration) order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Appends a task, bucketing it into a group by the order-sensitive
    /// algorithm described in the module docs.
    ///
    /// Ignored (with a warning) once the script has left the `New` state —
    /// structure is frozen after the first run.
    pub fn add_task(&mut self, task: Task) {
        if self.worker.current_status() != WorkerStatus::New {
            warn!(task = task.name(), "can't add a task to a started script");
            return;
        }
        let task = Arc::new(task);
        let same_group = self
            .groups
            .last()
            .is_some_and(|g| g.name() == task.cgroup());
        if !same_group {
            self.groups.push(Group::new(task.cgroup().map(String::from)));
        }
        if let Some(group) = self.groups.last_mut() {
            group.push(Arc::clone(&task));
        }
        self.tasks.push(task);
    }

    /// Runs all groups sequentially and blocks until finish.
    ///
    /// Returns the aggregate success (AND over every task). If this script
    /// instance is already running, the call logs and returns `false`
    /// without touching any state — the sole guard against overlapping
    /// scheduled invocations.
    pub async fn run(&self, token: CancellationToken) -> bool {
        if let Err(e) = self.worker.run() {
            warn!(error = %e, "script can't start");
            return false;
        }

        for group in &self.groups {
            if token.is_cancelled() {
                debug!(cgroup = group.label(), "cancelled, skipping remaining groups");
                break;
            }
            let span = info_span!("cgroup", cgroup = group.label());
            group.run(token.clone(), &self.retired).instrument(span).await;
        }

        let succ = self.tasks.iter().all(|t| t.result().result.success);
        let _ = self.worker.finish(succ);

        // The only place long-lived probes are cleaned up; runs after the
        // whole script even when the token was cancelled mid-run.
        while let Some(probe) = self.retired.pop() {
            probe.finish(token.clone()).await;
        }
        succ
    }

    /// Snapshot reflecting in-flight state; safe to call concurrently with
    /// a run in progress.
    pub fn result(&self) -> ScriptResult {
        let (result, status) = self.worker.status();
        ScriptResult {
            status,
            result,
            tasks: self.tasks.iter().map(|t| t.result()).collect(),
        }
    }

    /// Snapshot of the last fully completed run only — never shows a
    /// half-updated run.
    pub fn finished_result(&self) -> ScriptResult {
        let result = self.worker.finished_result();
        let status = if result.completed() {
            WorkerStatus::Finished
        } else {
            WorkerStatus::New
        };
        ScriptResult {
            status,
            result,
            tasks: self.tasks.iter().map(|t| t.finished_result()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::ProbeError;
    use crate::probes::{
        ProbeHandler, ProbeOptions, ProbeOutcome, ProbeRef, ProbeRunner, RunContext,
    };

    /// Configurable in-memory probe runner for orchestration tests.
    #[derive(Default)]
    struct FakeRunner {
        delay: Duration,
        passed: bool,
        keep_alive: bool,
        panic: bool,
        finished: Option<Arc<AtomicBool>>,
        /// Captures, at run time, the value of `observes` (another probe's
        /// finished flag).
        observes: Option<(Arc<AtomicBool>, Arc<AtomicBool>)>,
    }

    #[async_trait]
    impl ProbeRunner for FakeRunner {
        async fn run(&self, _cx: &RunContext) -> ProbeOutcome {
            if self.panic {
                panic!("fake probe fault");
            }
            if let Some((source, sink)) = &self.observes {
                sink.store(source.load(Ordering::SeqCst), Ordering::SeqCst);
            }
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            ProbeOutcome {
                passed: self.passed,
                data: Some(json!({"fake": true})),
                error: None,
                keep_alive: self.keep_alive,
            }
        }

        async fn finish(&self) {
            if let Some(flag) = &self.finished {
                flag.store(true, Ordering::SeqCst);
            }
        }

        fn can_stay_background(&self) -> bool {
            true
        }
    }

    fn probe(runner: FakeRunner, options: ProbeOptions) -> ProbeRef {
        Arc::new(ProbeHandler::new("fake", options, runner))
    }

    fn ok_task(name: &str, cgroup: Option<&str>, delay: Duration) -> Task {
        let runner = FakeRunner {
            delay,
            passed: true,
            ..FakeRunner::default()
        };
        Task::new(name, cgroup.map(String::from), probe(runner, ProbeOptions::default()))
    }

    fn failing_task(name: &str, cgroup: Option<&str>) -> Task {
        let runner = FakeRunner {
            passed: false,
            ..FakeRunner::default()
        };
        Task::new(name, cgroup.map(String::from), probe(runner, ProbeOptions::default()))
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_run_counter_counts_invocations() {
        let mut script = Script::new();
        script.add_task(ok_task("t", None, Duration::ZERO));

        for k in 1..=3u64 {
            assert!(script.run(token()).await);
            assert_eq!(script.finished_result().result.run_counter, k);
        }
    }

    #[tokio::test]
    async fn test_tasks_in_group_run_in_parallel() {
        let mut script = Script::new();
        for name in ["a", "b", "c"] {
            script.add_task(ok_task(name, Some("g"), Duration::from_millis(80)));
        }

        let started = Instant::now();
        assert!(script.run(token()).await);
        let elapsed = started.elapsed();
        assert!(
            elapsed < Duration::from_millis(200),
            "3 parallel 80ms tasks took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_groups_run_sequentially() {
        let mut script = Script::new();
        script.add_task(ok_task("a", Some("g1"), Duration::from_millis(80)));
        script.add_task(ok_task("b", Some("g2"), Duration::from_millis(80)));

        let started = Instant::now();
        assert!(script.run(token()).await);
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(160),
            "2 sequential 80ms groups took only {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_one_failing_task_fails_the_script() {
        let mut script = Script::new();
        script.add_task(ok_task("a", None, Duration::ZERO));
        script.add_task(failing_task("b", None));
        script.add_task(ok_task("c", None, Duration::ZERO));

        assert!(!script.run(token()).await);
        let snapshot = script.finished_result();
        assert!(!snapshot.result.success);
        assert!(snapshot.tasks[0].result.success);
        assert!(!snapshot.tasks[1].result.success);
        assert!(snapshot.tasks[2].result.success);
    }

    #[tokio::test]
    async fn test_all_passing_tasks_succeed() {
        let mut script = Script::new();
        script.add_task(ok_task("a", None, Duration::ZERO));
        script.add_task(ok_task("b", Some("g"), Duration::ZERO));
        assert!(script.run(token()).await);
        assert!(script.finished_result().result.success);
    }

    #[tokio::test]
    async fn test_background_probe_finished_only_after_script() {
        let finished = Arc::new(AtomicBool::new(false));
        let seen_by_later_task = Arc::new(AtomicBool::new(true));

        let bg_runner = FakeRunner {
            passed: true,
            keep_alive: true,
            finished: Some(Arc::clone(&finished)),
            ..FakeRunner::default()
        };
        let bg_options = ProbeOptions {
            stay_background: true,
            ..ProbeOptions::default()
        };
        let bg_task = Task::new("tunnel", Some("g1".to_string()), probe(bg_runner, bg_options));

        // Runs in a later group; records whether the background probe was
        // already finished when it started.
        let observer = FakeRunner {
            passed: true,
            observes: Some((Arc::clone(&finished), Arc::clone(&seen_by_later_task))),
            ..FakeRunner::default()
        };
        let observer_task = Task::new(
            "check",
            Some("g2".to_string()),
            probe(observer, ProbeOptions::default()),
        );

        let mut script = Script::new();
        script.add_task(bg_task);
        script.add_task(observer_task);

        assert!(script.run(token()).await);
        assert!(
            !seen_by_later_task.load(Ordering::SeqCst),
            "background probe was finished before the script completed"
        );
        assert!(
            finished.load(Ordering::SeqCst),
            "retirement queue was not drained"
        );
    }

    #[tokio::test]
    async fn test_panicking_probe_does_not_stop_the_script() {
        let mut script = Script::new();
        let faulty = FakeRunner {
            panic: true,
            ..FakeRunner::default()
        };
        script.add_task(Task::new(
            "faulty",
            Some("g1".to_string()),
            probe(faulty, ProbeOptions::default()),
        ));
        script.add_task(ok_task("later", Some("g2"), Duration::ZERO));

        assert!(!script.run(token()).await);
        let snapshot = script.finished_result();
        assert!(!snapshot.tasks[0].result.success);
        assert!(snapshot.tasks[1].result.success, "later group must still run");
        assert!(matches!(
            script.tasks()[0].probe().error(),
            Some(ProbeError::Panicked(_))
        ));
    }

    #[tokio::test]
    async fn test_finished_result_is_stable_during_a_run() {
        let mut script = Script::new();
        script.add_task(ok_task("slow", None, Duration::from_millis(100)));
        let script = Arc::new(script);

        assert!(script.run(token()).await);
        let first = script.finished_result();
        assert_eq!(first.result.run_counter, 1);

        let handle = {
            let script = Arc::clone(&script);
            tokio::spawn(async move { script.run(token()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Second run is in flight; the finished snapshot must still be the
        // first run, not a torn current one.
        let snapshot = script.finished_result();
        assert_eq!(snapshot.result.run_counter, 1);
        assert!(snapshot.result.completed());
        assert!(snapshot.result.success);

        assert!(handle.await.unwrap());
        assert_eq!(script.finished_result().result.run_counter, 2);
    }

    #[tokio::test]
    async fn test_overlapping_run_is_rejected() {
        let mut script = Script::new();
        script.add_task(ok_task("slow", None, Duration::from_millis(100)));
        let script = Arc::new(script);

        let handle = {
            let script = Arc::clone(&script);
            tokio::spawn(async move { script.run(token()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!script.run(token()).await, "overlapping invocation must abort");
        assert!(handle.await.unwrap(), "original run must be unaffected");
    }

    #[tokio::test]
    async fn test_anonymous_groups_split_around_named_group() {
        let mut script = Script::new();
        script.add_task(ok_task("t1", None, Duration::ZERO));
        script.add_task(ok_task("t2", None, Duration::ZERO));
        script.add_task(ok_task("t3", Some("g1"), Duration::ZERO));
        script.add_task(ok_task("t4", None, Duration::ZERO));

        let groups = script.groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].name(), None);
        assert_eq!(groups[0].tasks().len(), 2);
        assert_eq!(groups[1].name(), Some("g1"));
        assert_eq!(groups[1].tasks().len(), 1);
        assert_eq!(groups[2].name(), None);
        assert_eq!(groups[2].tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_non_adjacent_same_named_groups_do_not_merge() {
        let mut script = Script::new();
        script.add_task(ok_task("t1", Some("g"), Duration::ZERO));
        script.add_task(ok_task("t2", Some("other"), Duration::ZERO));
        script.add_task(ok_task("t3", Some("g"), Duration::ZERO));

        let names: Vec<_> = script.groups().iter().map(|g| g.name().map(String::from)).collect();
        assert_eq!(
            names,
            vec![
                Some("g".to_string()),
                Some("other".to_string()),
                Some("g".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_add_task_after_start_is_ignored() {
        let mut script = Script::new();
        script.add_task(ok_task("t1", None, Duration::ZERO));
        assert!(script.run(token()).await);

        script.add_task(ok_task("t2", None, Duration::ZERO));
        assert_eq!(script.tasks().len(), 1, "structure is frozen after first run");
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining_groups() {
        let mut script = Script::new();
        script.add_task(ok_task("a", Some("g1"), Duration::from_millis(50)));
        script.add_task(ok_task("b", Some("g2"), Duration::from_millis(50)));

        let token = CancellationToken::new();
        token.cancel();
        assert!(!script.run(token).await);

        // No group ran; every task result is still untouched.
        let snapshot = script.result();
        assert!(snapshot.tasks.iter().all(|t| !t.result.success));
    }

    #[tokio::test]
    async fn test_script_snapshot_serializes() {
        let mut script = Script::new();
        script.add_task(ok_task("t", None, Duration::ZERO));
        assert!(script.run(token()).await);

        let value = serde_json::to_value(script.finished_result()).unwrap();
        assert_eq!(value["status"], "finished");
        assert_eq!(value["result"]["success"], true);
        assert_eq!(value["result"]["runCounter"], 1);
        assert_eq!(value["tasks"][0]["name"], "t");
        assert_eq!(value["tasks"][0]["probe"]["data"]["fake"], true);
    }
}
