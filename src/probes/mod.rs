//! # Probe contract and shared probe types.
//!
//! A probe is a pluggable unit of work performing one kind of check (run a
//! command, fetch a set of URLs). The orchestration core only knows the
//! [`Probe`] trait; concrete probes implement [`ProbeRunner`] and are wrapped
//! in a [`ProbeHandler`] that supplies the common bookkeeping (state machine,
//! panic containment, expect inversion, stay-background gating).
//!
//! ## Rules
//! - `start` must not be called concurrently on the same probe instance.
//! - A probe that wants to stay in background keeps its state machine in
//!   `Running` after `start` returns; `is_alive()` then reports `true` and
//!   the script finishes it later through the retirement queue.
//! - `data` payloads are probe-defined and round-trip through the core
//!   unmodified.

mod handler;
mod registry;

pub mod cmd;
pub mod web;

pub use handler::{ProbeHandler, ProbeOutcome, ProbeRunner, RunContext};
pub use registry::{ConstructorFn, ProbeRegistry};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::RunResult;
use crate::error::ProbeError;

/// Shared handle to a probe, as held by tasks and the retirement queue.
pub type ProbeRef = Arc<dyn Probe>;

/// Polymorphic unit of work exposing start/finish/error/liveness/result.
///
/// See the module docs for the `start` contract; in short: drive the state
/// machine, run the probe-specific runner, contain its faults, and either
/// finish immediately or stay alive for deferred cleanup.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Stable probe-type name (`"cmd"`, `"web"`, ...).
    fn name(&self) -> &str;

    /// Runs one check, returning its success (after `expect` inversion).
    async fn start(&self, token: CancellationToken) -> bool;

    /// Cleanup hook for a stay-alive probe (e.g. kill a lingering child
    /// process); always drives the state machine to `Finished`.
    async fn finish(&self, token: CancellationToken);

    /// Last execution error, if any.
    fn error(&self) -> Option<ProbeError>;

    /// True while the probe intentionally stays running in background.
    fn is_alive(&self) -> bool;

    /// In-flight or just-completed result; `data` is omitted while a run is
    /// still in progress.
    fn result(&self) -> ProbeResult;

    /// Last fully completed result, ignoring any run in progress.
    fn finished_result(&self) -> ProbeResult;
}

/// Per-probe execution options, immutable after construction.
///
/// Wire format: `timeout` in milliseconds. `expect` inverts the pass/fail
/// semantic — a probe succeeds when its raw outcome equals `expect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProbeOptions {
    /// Per-probe execution timeout.
    #[serde(with = "crate::util::duration_ms")]
    pub timeout: Duration,
    /// The probe runner should stay alive after the check finishes.
    pub stay_background: bool,
    /// Expected raw outcome; `false` turns a failing check into a pass.
    pub expect: bool,
    /// Raises the probe's own log verbosity.
    pub debug: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            stay_background: false,
            expect: true,
            debug: false,
        }
    }
}

/// Serializable snapshot of one probe execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Probe-type name.
    pub name: String,
    /// Options the probe was constructed with.
    pub options: ProbeOptions,
    /// Opaque probe-specific configuration, for reporting only.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub configuration: Value,
    /// Timing/outcome of the execution.
    pub result: RunResult,
    /// Probe-defined payload (per-URL timings, exit code, ...); present only
    /// once the run has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Per-target duration map, the payload shape used by multi-target probes.
///
/// Serializes as `{target: milliseconds}`.
#[derive(Debug, Clone, Default)]
pub struct Timings(BTreeMap<String, Duration>);

impl Timings {
    /// Records the duration for one target.
    pub fn set(&mut self, name: impl Into<String>, dur: Duration) {
        self.0.insert(name.into(), dur);
    }

    /// Number of recorded targets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts to an opaque JSON payload (`{target: ms}`).
    pub fn to_value(&self) -> Value {
        let ms: BTreeMap<&str, u64> = self
            .0
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_millis().min(u128::from(u64::MAX)) as u64))
            .collect();
        serde_json::to_value(ms).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let opts = ProbeOptions::default();
        assert_eq!(opts.timeout, Duration::from_millis(5000));
        assert!(opts.expect);
        assert!(!opts.stay_background);
        assert!(!opts.debug);
    }

    #[test]
    fn test_options_partial_yaml_keeps_defaults() {
        let opts: ProbeOptions = serde_yaml::from_str("timeout: 250").unwrap();
        assert_eq!(opts.timeout, Duration::from_millis(250));
        assert!(opts.expect, "expect must default to true");
    }

    #[test]
    fn test_timings_payload_shape() {
        let mut t = Timings::default();
        t.set("https://example.org", Duration::from_millis(42));
        assert_eq!(
            t.to_value(),
            serde_json::json!({"https://example.org": 42})
        );
    }
}
