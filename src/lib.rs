//! # probescript
//!
//! **Probescript** is a declarative probe/check orchestrator: scripted
//! health checks with grouped parallel execution, reusable as a library or
//! through the bundled CLI (one-shot and cron-scheduled daemon modes).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   TaskDecl   │   │   TaskDecl   │   │   TaskDecl   │
//!     │ (yaml entry) │   │ (yaml entry) │   │ (yaml entry) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ScriptConfig::build (against an explicit ProbeRegistry)          │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Script (its own Worker state machine + retirement queue)         │
//! │    ├─ Group #1 ── tasks run in parallel (JoinSet fan-out)         │
//! │    ├─ Group #2 ── runs only after #1 fully joined                 │
//! │    └─ Group #N                                                    │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │     Task     │   │     Task     │   │     Task     │
//!     │   (Worker)   │   │   (Worker)   │   │   (Worker)   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ ProbeHandler │   │ ProbeHandler │   │ ProbeHandler │
//!     │   (Worker)   │   │   (Worker)   │   │   (Worker)   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      ▼                  ▼                  ▼
//!     ProbeRunner        ProbeRunner        ProbeRunner
//!     ("cmd")            ("web")            (user-defined)
//! ```
//!
//! ### Lifecycle
//! ```text
//! Script::run(token)
//!   ├─► worker.run()                      guard against overlapping runs
//!   ├─► for each group, in order:
//!   │     └─ JoinSet: Task::start(token) per member
//!   │            └─ ProbeHandler::start
//!   │                 ├─ runner.run(cx)   (catch_unwind, timeout, token)
//!   │                 ├─ succ = passed == options.expect
//!   │                 └─ stay-background? ─ yes ─► stays Running,
//!   │                                              queued for retirement
//!   ├─► success = AND over every task
//!   ├─► worker.finish(success)
//!   └─► drain retirement queue: probe.finish() kills lingering children
//! ```
//!
//! Every orchestrated entity (script, task, probe) carries the same
//! [`Worker`] state machine and exposes dual result snapshots: the current
//! (possibly in-flight) run and the last fully completed one. Readers
//! always get copies, never references into locked state.
//!
//! ## Quick start
//! ```no_run
//! use probescript::{ProbeOptions, ProbeRegistry, Script, Task};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main] async fn main() {
//! let registry = ProbeRegistry::with_builtins();
//! let probe = registry
//!     .construct("cmd", ProbeOptions::default(), &json!("true"))
//!     .unwrap();
//!
//! let mut script = Script::new();
//! script.add_task(Task::new("smoke", None, probe));
//!
//! let succ = script.run(CancellationToken::new()).await;
//! println!("{}", serde_json::to_string_pretty(&script.finished_result()).unwrap());
//! assert!(succ);
//! # }
//! ```

pub mod config;
pub mod sched;
pub mod shutdown;

mod core;
mod error;
mod probes;
mod util;

pub use crate::core::{
    Group, RetireQueue, RunResult, Script, ScriptResult, Task, TaskResult, Worker, WorkerStatus,
    DEFAULT_SCRIPT_TIMEOUT,
};
pub use crate::error::{ConfigError, ProbeError, StateError};
pub use crate::probes::{
    cmd, web, ConstructorFn, Probe, ProbeHandler, ProbeOptions, ProbeOutcome, ProbeRef,
    ProbeRegistry, ProbeResult, ProbeRunner, RunContext, Timings,
};
