//! # Default probe bookkeeping: `ProbeHandler` + injected `ProbeRunner`.
//!
//! [`ProbeHandler`] implements everything in the [`Probe`] contract that is
//! common across probe types — the worker state machine, panic containment,
//! `expect` inversion, error/data slots, the stay-background gate — while
//! the probe-specific check is an injected [`ProbeRunner`].
//!
//! ## Start flow
//! ```text
//! start(token)
//!   ├─► worker.run()                (log & continue on AlreadyRunning:
//!   │                                the runner fails fast on its own)
//!   ├─► runner.run(cx)              (wrapped in catch_unwind)
//!   │      └─ panic ──► ProbeOutcome{passed: false, error: Panicked}
//!   ├─► succ = outcome.passed == options.expect
//!   ├─► store data + error
//!   └─► stay-background gate:
//!         can_stay_background && options.stay_background
//!         && outcome.keep_alive && succ && error.is_none()
//!           ├─ yes → state machine stays Running (deferred finish)
//!           └─ no  → worker.finish(succ)
//! ```
//!
//! ## Rules
//! - A faulting runner never leaves the state machine stuck in `Running`.
//! - `finish` runs the runner's cleanup at most once per script run and
//!   always drives the state machine to `Finished`.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::probes::{Probe, ProbeOptions, ProbeResult};
use crate::core::Worker;

/// Execution context handed to a probe runner.
pub struct RunContext {
    /// Ambient cancellation token; observe it at blocking points.
    pub token: CancellationToken,
    /// Options of the owning probe (timeout, stay-background, ...).
    pub options: ProbeOptions,
}

/// Raw outcome of one probe runner invocation, before `expect` inversion.
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    /// Raw check outcome.
    pub passed: bool,
    /// Probe-defined payload, preserved opaquely end-to-end.
    pub data: Option<Value>,
    /// Execution error, for diagnostics only.
    pub error: Option<ProbeError>,
    /// The runner left something alive and wants a deferred finish.
    pub keep_alive: bool,
}

impl ProbeOutcome {
    /// A passing outcome.
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    /// A failing outcome carrying its error.
    pub fn fail(error: ProbeError) -> Self {
        Self {
            passed: false,
            error: Some(error),
            ..Self::default()
        }
    }

    /// Attaches a payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Marks that the runner stays alive in background.
    pub fn keep_alive(mut self) -> Self {
        self.keep_alive = true;
        self
    }
}

/// Probe-specific check logic, injected into a [`ProbeHandler`].
#[async_trait]
pub trait ProbeRunner: Send + Sync + 'static {
    /// Performs one check. Must race its blocking operation against
    /// `cx.options.timeout` and `cx.token`, whichever fires first.
    async fn run(&self, cx: &RunContext) -> ProbeOutcome;

    /// Cleanup for a stay-alive runner (kill child process, close
    /// connection). Default: nothing to clean up.
    async fn finish(&self) {}

    /// Whether this probe type supports staying in background at all.
    fn can_stay_background(&self) -> bool {
        false
    }

    /// Opaque configuration for reporting; `Null` when there is none.
    fn configuration(&self) -> Value {
        Value::Null
    }
}

/// Composable [`Probe`] implementation wrapping a [`ProbeRunner`].
pub struct ProbeHandler<R> {
    name: &'static str,
    options: ProbeOptions,
    worker: Worker,
    data: Mutex<Option<Value>>,
    error: Mutex<Option<ProbeError>>,
    runner: R,
}

impl<R: ProbeRunner> ProbeHandler<R> {
    /// Wraps `runner` with the common probe bookkeeping.
    pub fn new(name: &'static str, options: ProbeOptions, runner: R) -> Self {
        Self {
            name,
            options,
            worker: Worker::new(),
            data: Mutex::new(None),
            error: Mutex::new(None),
            runner,
        }
    }

    /// The options this probe was constructed with.
    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    fn set_error(&self, err: Option<ProbeError>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = err;
    }

    fn snapshot(&self, result: crate::core::RunResult, with_data: bool) -> ProbeResult {
        let data = if with_data {
            self.data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        } else {
            None
        };
        ProbeResult {
            name: self.name.to_string(),
            options: self.options.clone(),
            configuration: self.runner.configuration(),
            result,
            data,
        }
    }
}

#[async_trait]
impl<R: ProbeRunner> Probe for ProbeHandler<R> {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self, token: CancellationToken) -> bool {
        if let Err(e) = self.worker.run() {
            // A stay-alive probe from a previous invocation may still be
            // running; the runner detects that and fails fast.
            warn!(probe = self.name, error = %e, "wrong runner status");
        }

        if self.options.debug {
            info!(probe = self.name, "starting the probe runner");
        }

        let cx = RunContext {
            token,
            options: self.options.clone(),
        };
        let outcome = std::panic::AssertUnwindSafe(self.runner.run(&cx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                ProbeOutcome::fail(ProbeError::Panicked(panic_message(panic)))
            });

        let succ = outcome.passed == self.options.expect;
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) = outcome.data;
        self.set_error(outcome.error);

        let stay = self.runner.can_stay_background()
            && self.options.stay_background
            && outcome.keep_alive
            && succ
            && self.error().is_none();

        if stay {
            debug!(probe = self.name, "the probe process stays alive");
        } else {
            let _ = self.worker.finish(succ);
            if succ {
                info!(probe = self.name, "SUCCESS");
            } else {
                info!(probe = self.name, "FAIL");
            }
        }
        succ
    }

    async fn finish(&self, _token: CancellationToken) {
        debug!(probe = self.name, "finishing a background probe process");
        self.runner.finish().await;
        let _ = self.worker.finish(true);
    }

    fn error(&self) -> Option<ProbeError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_alive(&self) -> bool {
        self.worker.current_status() == crate::core::WorkerStatus::Running
    }

    fn result(&self) -> ProbeResult {
        let (current, _) = self.worker.status();
        if current.completed() {
            self.snapshot(self.worker.finished_result(), true)
        } else {
            self.snapshot(current, false)
        }
    }

    fn finished_result(&self) -> ProbeResult {
        self.snapshot(self.worker.finished_result(), true)
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
