//! # `cmd` probe: run an external command and check its exit code.
//!
//! The check passes when the command exits with the configured code within
//! the probe timeout. With `stayBackground`, a timeout while the process is
//! still running is the *expected* outcome: the child is kept alive, the
//! probe reports success and stays in background until the script finishes
//! it (the finisher kills the child). A backgrounded process that exits
//! before the wait window is a failed check, whatever its exit code.
//!
//! Configuration: either a structured record
//! `{cmd, args, exitCode, logDump}` or a plain command-line string split on
//! whitespace.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ConfigError, ProbeError};
use crate::probes::{ProbeHandler, ProbeOptions, ProbeOutcome, ProbeRef, ProbeRunner, RunContext};

/// Registry name of this probe type.
pub const NAME: &str = "cmd";

/// Probe-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CmdConfig {
    /// Path or name of the binary to run.
    pub cmd: String,
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Exit code counted as a pass.
    pub exit_code: i32,
    /// Forward the child's stdout/stderr lines to the log.
    pub log_dump: bool,
}

impl Default for CmdConfig {
    fn default() -> Self {
        Self {
            cmd: String::new(),
            args: Vec::new(),
            exit_code: 0,
            log_dump: false,
        }
    }
}

/// Constructs a `cmd` probe from an opaque configuration value.
pub fn construct(options: ProbeOptions, configuration: &Value) -> Result<ProbeRef, ConfigError> {
    let config = parse_config(configuration)?;
    Ok(std::sync::Arc::new(ProbeHandler::new(
        NAME,
        options,
        CmdRunner {
            config,
            child: Mutex::new(None),
        },
    )))
}

fn parse_config(value: &Value) -> Result<CmdConfig, ConfigError> {
    let config = if let Some(line) = value.as_str() {
        let mut parts = line.split_whitespace().map(String::from);
        let cmd = parts.next().unwrap_or_default();
        CmdConfig {
            cmd,
            args: parts.collect(),
            ..CmdConfig::default()
        }
    } else {
        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?
    };
    if config.cmd.is_empty() {
        return Err(ConfigError::Invalid("cmd is empty".to_string()));
    }
    Ok(config)
}

struct CmdRunner {
    config: CmdConfig,
    /// Holds the child while it stays alive in background.
    child: Mutex<Option<Child>>,
}

#[async_trait]
impl ProbeRunner for CmdRunner {
    fn can_stay_background(&self) -> bool {
        true
    }

    fn configuration(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    async fn run(&self, cx: &RunContext) -> ProbeOutcome {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return ProbeOutcome::fail(ProbeError::Command(
                "another cmd is still running".to_string(),
            ));
        }

        let mut command = Command::new(&self.config.cmd);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.config.log_dump {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProbeOutcome::fail(ProbeError::Command(format!(
                    "can't run {}: {}",
                    self.config.cmd, e
                )))
            }
        };
        if self.config.log_dump {
            dump_output(&mut child);
        }

        let waited = tokio::time::timeout(cx.options.timeout, async {
            tokio::select! {
                status = child.wait() => Some(status),
                _ = cx.token.cancelled() => None,
            }
        })
        .await;

        match waited {
            Ok(Some(Ok(status))) => {
                let got = status.code().unwrap_or(-1);
                if cx.options.stay_background {
                    // A backgrounded process is expected to outlive the wait
                    // window; exiting early is a failure whatever the code.
                    return ProbeOutcome::fail(ProbeError::Command(format!(
                        "process exited with code {got} before backgrounding"
                    )));
                }
                let passed = got == self.config.exit_code;
                let mut outcome = ProbeOutcome {
                    passed,
                    data: Some(json!({ "exitCode": got })),
                    error: None,
                    keep_alive: false,
                };
                if !passed {
                    outcome.error = Some(ProbeError::ExitCode {
                        got,
                        want: self.config.exit_code,
                    });
                }
                outcome
            }
            Ok(Some(Err(e))) => ProbeOutcome::fail(ProbeError::Command(e.to_string())),
            Ok(None) => {
                let _ = child.kill().await;
                ProbeOutcome::fail(ProbeError::Canceled)
            }
            Err(_elapsed) => {
                if cx.options.stay_background {
                    // The waiting timeout hit while the process is still
                    // alive; that is what backgrounding asks for.
                    *slot = Some(child);
                    ProbeOutcome::pass().keep_alive()
                } else {
                    let _ = child.kill().await;
                    ProbeOutcome::fail(ProbeError::Timeout(cx.options.timeout))
                }
            }
        }
    }

    async fn finish(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(cmd = %self.config.cmd, error = %e, "unexpected error on stopping cmd process");
            }
        }
    }
}

/// Forwards the child's stdout/stderr lines to the log.
fn dump_output(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(stream = "stdout", "{}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(stream = "stderr", "{}", line);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    fn options_with_timeout(ms: u64) -> ProbeOptions {
        ProbeOptions {
            timeout: Duration::from_millis(ms),
            ..ProbeOptions::default()
        }
    }

    #[test]
    fn test_config_from_string() {
        let config = parse_config(&json!("echo hello world")).unwrap();
        assert_eq!(config.cmd, "echo");
        assert_eq!(config.args, vec!["hello", "world"]);
        assert_eq!(config.exit_code, 0);
    }

    #[test]
    fn test_empty_config_is_rejected() {
        assert!(parse_config(&json!("")).is_err());
        assert!(parse_config(&json!({"args": ["x"]})).is_err());
    }

    #[tokio::test]
    async fn test_zero_exit_passes() {
        let probe = construct(options_with_timeout(5000), &json!("true")).unwrap();
        assert!(probe.start(CancellationToken::new()).await);
        assert_eq!(probe.result().data, Some(json!({"exitCode": 0})));
    }

    #[tokio::test]
    async fn test_wrong_exit_code_fails() {
        let probe = construct(options_with_timeout(5000), &json!("false")).unwrap();
        assert!(!probe.start(CancellationToken::new()).await);
        assert!(matches!(
            probe.error(),
            Some(ProbeError::ExitCode { got: 1, want: 0 })
        ));
    }

    #[tokio::test]
    async fn test_expected_nonzero_exit_passes() {
        let config = json!({"cmd": "sh", "args": ["-c", "exit 3"], "exitCode": 3});
        let probe = construct(options_with_timeout(5000), &config).unwrap();
        assert!(probe.start(CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_timeout_kills_foreground_process() {
        let probe = construct(options_with_timeout(50), &json!("sleep 10")).unwrap();
        assert!(!probe.start(CancellationToken::new()).await);
        assert!(matches!(probe.error(), Some(ProbeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_stay_background_early_exit_fails() {
        let options = ProbeOptions {
            timeout: Duration::from_millis(2000),
            stay_background: true,
            ..ProbeOptions::default()
        };
        let probe = construct(options, &json!("true")).unwrap();
        assert!(
            !probe.start(CancellationToken::new()).await,
            "a backgrounded process that exits early must fail the check"
        );
        assert!(!probe.is_alive());
        assert!(matches!(probe.error(), Some(ProbeError::Command(_))));
    }

    #[tokio::test]
    async fn test_stay_background_survives_timeout() {
        let options = ProbeOptions {
            timeout: Duration::from_millis(50),
            stay_background: true,
            ..ProbeOptions::default()
        };
        let probe = construct(options, &json!("sleep 10")).unwrap();
        assert!(probe.start(CancellationToken::new()).await);
        assert!(probe.is_alive());

        probe.finish(CancellationToken::new()).await;
        assert!(!probe.is_alive());
    }
}
