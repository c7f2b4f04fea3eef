//! # Daemon scheduler: cron-driven script invocations.
//!
//! Each job owns one compiled [`Script`] instance and invokes it on a cron
//! schedule (or a single time at startup for `once` jobs). Invocations of
//! *different* jobs run concurrently; overlapping invocations of the *same*
//! job are rejected by the script's own state machine and logged.
//!
//! ## Job loop
//! ```text
//! loop:
//!   ├─► next = schedule.upcoming(Utc).next()
//!   ├─► sleep until next    (or stop on the ambient token)
//!   └─► invoke: child token + timeout watchdog, script.run(child)
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::DaemonConfig;
use crate::core::Script;
use crate::error::ConfigError;
use crate::probes::ProbeRegistry;

/// One scheduled job: a compiled script plus its invocation policy.
pub struct ScheduledJob {
    name: String,
    script: Arc<Script>,
    schedule: Option<Schedule>,
    once: bool,
    timeout: Duration,
}

impl ScheduledJob {
    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The script this job runs.
    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    /// Runs the script once under a child token that a watchdog cancels
    /// after the job timeout.
    async fn invoke(&self, token: &CancellationToken) -> bool {
        let child = token.child_token();
        let watchdog = child.clone();
        let timeout = self.timeout;
        let guard = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "job timed out");
                    watchdog.cancel();
                }
                _ = watchdog.cancelled() => {}
            }
        });

        let succ = self.script.run(child.clone()).await;
        child.cancel();
        let _ = guard.await;
        info!(succ, "job finished");
        succ
    }

    /// The job loop: fire per schedule until the token is cancelled, or
    /// once for `once` jobs.
    async fn run(self, token: CancellationToken) {
        if self.once {
            self.invoke(&token).await;
            return;
        }
        // build_jobs guarantees a schedule for non-once jobs.
        let Some(schedule) = self.schedule.clone() else {
            return;
        };
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("schedule yields no further invocations");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.invoke(&token).await;
                }
                _ = token.cancelled() => return,
            }
        }
    }
}

/// Compiles every job in `config` into a [`ScheduledJob`].
///
/// Relative script paths are resolved against `base` (the daemon file's
/// directory). Fails on the first bad job.
pub fn build_jobs(
    config: &DaemonConfig,
    registry: &ProbeRegistry,
    base: &std::path::Path,
) -> Result<Vec<ScheduledJob>, ConfigError> {
    let mut jobs = Vec::with_capacity(config.jobs.len());
    for job in &config.jobs {
        let path = if job.script.is_absolute() {
            job.script.clone()
        } else {
            base.join(&job.script)
        };
        let script_config = crate::config::ScriptConfig::load(&path)?;
        let script = script_config
            .build(registry)
            .map_err(|e| e.for_task(&job.name))?;

        let schedule = match (&job.schedule, job.once) {
            (Some(expr), _) => Some(Schedule::from_str(expr).map_err(|source| {
                ConfigError::Schedule {
                    expr: expr.clone(),
                    source,
                }
            })?),
            (None, true) => None,
            (None, false) => {
                return Err(ConfigError::Invalid(format!(
                    "job '{}' needs a schedule or once: true",
                    job.name
                )))
            }
        };

        jobs.push(ScheduledJob {
            name: job.name.clone(),
            timeout: job.timeout.unwrap_or_else(|| script.timeout()),
            script: Arc::new(script),
            schedule,
            once: job.once,
        });
    }
    Ok(jobs)
}

/// Runs every job concurrently until all finish or `token` is cancelled.
pub async fn run_jobs(jobs: Vec<ScheduledJob>, token: CancellationToken) {
    let mut set = JoinSet::new();
    for job in jobs {
        let token = token.clone();
        let span = info_span!("job", job = %job.name);
        set.spawn(job.run(token).instrument(span));
    }
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "job loop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::config::DaemonConfig;

    const SCRIPT: &str = r#"
timeout: 10000
script:
  - name: ok
    probe:
      name: cmd
      configuration: "true"
"#;

    fn write_script(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("script.yml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SCRIPT.as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn test_build_jobs_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path());

        let yaml = r#"
jobs:
  - name: every5s
    script: script.yml
    schedule: "*/5 * * * * *"
"#;
        let config: DaemonConfig = serde_yaml::from_str(yaml).unwrap();
        let jobs = build_jobs(&config, &ProbeRegistry::with_builtins(), dir.path()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name(), "every5s");
        assert_eq!(jobs[0].timeout, Duration::from_millis(10000));
    }

    #[test]
    fn test_job_without_schedule_or_once_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path());

        let yaml = "jobs: [{ name: bad, script: script.yml }]";
        let config: DaemonConfig = serde_yaml::from_str(yaml).unwrap();
        let err = build_jobs(&config, &ProbeRegistry::with_builtins(), dir.path()).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_cron_expression_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path());

        let yaml = r#"jobs: [{ name: bad, script: script.yml, schedule: "not cron" }]"#;
        let config: DaemonConfig = serde_yaml::from_str(yaml).unwrap();
        let err = build_jobs(&config, &ProbeRegistry::with_builtins(), dir.path()).err().unwrap();
        assert!(matches!(err, ConfigError::Schedule { .. }));
    }

    #[tokio::test]
    async fn test_once_job_runs_and_returns() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path());

        let yaml = "jobs: [{ name: smoke, script: script.yml, once: true }]";
        let config: DaemonConfig = serde_yaml::from_str(yaml).unwrap();
        let jobs = build_jobs(&config, &ProbeRegistry::with_builtins(), dir.path()).unwrap();
        let script = Arc::clone(jobs[0].script());

        run_jobs(jobs, CancellationToken::new()).await;
        assert!(script.finished_result().result.success);
    }
}
