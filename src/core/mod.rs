//! Orchestration core: worker state machine, tasks, groups, scripts, and
//! the background-probe retirement queue.

mod group;
mod retire;
mod script;
mod task;
mod worker;

pub use group::Group;
pub use retire::RetireQueue;
pub use script::{Script, ScriptResult, DEFAULT_SCRIPT_TIMEOUT};
pub use task::{Task, TaskResult};
pub use worker::{RunResult, Worker, WorkerStatus};
