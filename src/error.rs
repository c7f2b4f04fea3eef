//! Error types used by the probescript runtime and probes.
//!
//! This module defines three error families:
//!
//! - [`StateError`] — illegal worker state-machine transitions (caller bugs,
//!   e.g. overlapping invocations); logged and absorbed by the orchestrator.
//! - [`ProbeError`] — failures of individual probe executions; stored on the
//!   probe and reflected in `success = false`, never propagated as a crash.
//! - [`ConfigError`] — malformed configuration; surfaced synchronously at
//!   script-build time and aborts startup.
//!
//! [`StateError`] and [`ProbeError`] provide `as_label()` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::core::WorkerStatus;

/// Illegal worker state-machine transition.
///
/// These indicate a caller or scheduler bug (e.g. two overlapping invocations
/// of the same script). The offending `run`/`finish` call is aborted; the
/// surrounding orchestration continues unaffected.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// `run()` was called while the entity is already running.
    #[error("already running")]
    AlreadyRunning,

    /// `finish()` was called while the entity is not running.
    #[error("can't switch from status {from} to {to}")]
    InvalidTransition {
        /// Status the entity was in.
        from: WorkerStatus,
        /// Status the caller tried to switch to.
        to: WorkerStatus,
    },
}

impl StateError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StateError::AlreadyRunning => "already_running",
            StateError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Failure of a single probe execution.
///
/// Stored on the probe via its handler and retrievable through
/// [`Probe::error`](crate::Probe::error) for diagnostics. The orchestrator
/// aggregates success purely from the boolean outcome.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    /// Probe execution exceeded its configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Probe was cancelled by the ambient cancellation token.
    #[error("cancelled")]
    Canceled,

    /// Probe runner panicked; recovered at the start boundary.
    #[error("probe runner panicked: {0}")]
    Panicked(String),

    /// External command could not be run or failed unexpectedly.
    #[error("command failed: {0}")]
    Command(String),

    /// Command exited with an unexpected code.
    #[error("wrong exit code {got}, expected {want}")]
    ExitCode {
        /// Observed exit code (`-1` when killed by a signal).
        got: i32,
        /// Exit code the configuration expects.
        want: i32,
    },

    /// HTTP-level failure (connect error, wrong status, bad URL).
    #[error("http error: {0}")]
    Http(String),
}

impl ProbeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "probe_timeout",
            ProbeError::Canceled => "probe_canceled",
            ProbeError::Panicked(_) => "probe_panicked",
            ProbeError::Command(_) => "probe_command",
            ProbeError::ExitCode { .. } => "probe_exit_code",
            ProbeError::Http(_) => "probe_http",
        }
    }
}

/// Malformed probe or script configuration.
///
/// Raised at script-build time; aborts startup and is never retried.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Probe type name is not present in the registry.
    #[error("unknown probe '{0}'")]
    UnknownProbe(String),

    /// Probe-specific configuration could not be interpreted.
    #[error("wrong configuration: {0}")]
    Invalid(String),

    /// Wraps a probe construction error with the declaring task's name.
    #[error("[{task}] {source}")]
    Task {
        /// Name of the task whose probe failed to build.
        task: String,
        #[source]
        source: Box<ConfigError>,
    },

    /// Configuration file could not be read.
    #[error("can't read {path}: {source}")]
    Io {
        /// Path of the offending file.
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("can't parse {path}: {source}")]
    Yaml {
        /// Path of the offending file.
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Cron schedule expression could not be parsed.
    #[error("invalid schedule '{expr}': {source}")]
    Schedule {
        /// The offending expression.
        expr: String,
        #[source]
        source: cron::error::Error,
    },
}

impl ConfigError {
    /// Wraps this error with the name of the task it belongs to.
    pub fn for_task(self, task: impl Into<String>) -> Self {
        ConfigError::Task {
            task: task.into(),
            source: Box::new(self),
        }
    }
}
