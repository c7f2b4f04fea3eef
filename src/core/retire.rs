//! # Background-probe retirement queue.
//!
//! A concurrency-safe FIFO of probes whose owning task completed but whose
//! underlying process/connection was asked to persist (`stay_background`).
//!
//! Enqueue happens during group execution, from the task fan-out; dequeue
//! happens only once, after the whole script run completes. A background
//! probe's lifetime is tied to the script's run, not to its originating task
//! or group — e.g. a tunnel that should stay up while the remaining checks
//! in the same script execute.
//!
//! ## Rules
//! - FIFO order is preserved but carries no semantics; each probe is
//!   finished independently.
//! - A probe that never went alive is never enqueued and never finished.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::probes::ProbeRef;

/// Thread-safe FIFO of stay-alive probes awaiting deferred `finish`.
#[derive(Default)]
pub struct RetireQueue {
    inner: Mutex<VecDeque<ProbeRef>>,
}

impl RetireQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ProbeRef>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a probe; called concurrently from task fan-out.
    pub fn push(&self, probe: ProbeRef) {
        self.lock().push_back(probe);
    }

    /// Pops the oldest probe, or `None` when drained.
    pub fn pop(&self) -> Option<ProbeRef> {
        self.lock().pop_front()
    }

    /// Number of probes currently queued.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
