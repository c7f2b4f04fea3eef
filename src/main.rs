//! probescript CLI: one-shot script runs and the scheduled daemon mode.
//!
//! Exit codes (one-shot mode): `0` all checks passed, `1` at least one
//! check failed, `2` configuration error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use probescript::config::{DaemonConfig, ScriptConfig};
use probescript::sched;
use probescript::shutdown::wait_for_shutdown_signal;
use probescript::ProbeRegistry;

#[derive(Parser)]
#[command(name = "probescript", version, about = "Scripted probe/check orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script file once and exit.
    Run {
        /// Path to the script file.
        script: PathBuf,
        /// Print the full result snapshot as JSON to stdout.
        #[arg(long)]
        json: bool,
    },
    /// Run scheduled jobs from a daemon configuration file.
    Daemon {
        /// Path to the daemon configuration file.
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run { script, json } => run_once(&script, json).await,
        Command::Daemon { config } => run_daemon(&config).await,
    }
}

async fn run_once(path: &Path, json: bool) -> ExitCode {
    let registry = ProbeRegistry::with_builtins();
    let script = match ScriptConfig::load(path).and_then(|c| c.build(&registry)) {
        Ok(script) => script,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(2);
        }
    };

    let token = CancellationToken::new();
    let watchdog = token.clone();
    let timeout = script.timeout();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "script timed out");
                watchdog.cancel();
            }
            _ = watchdog.cancelled() => {}
        }
    });
    let signals = token.clone();
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("shutdown signal received");
            signals.cancel();
        }
    });

    let succ = script.run(token.clone()).await;
    token.cancel();

    if json {
        match serde_json::to_string_pretty(&script.finished_result()) {
            Ok(out) => println!("{out}"),
            Err(e) => error!(error = %e, "can't serialize the result"),
        }
    }
    if succ {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

async fn run_daemon(path: &Path) -> ExitCode {
    let registry = ProbeRegistry::with_builtins();
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let jobs = match DaemonConfig::load(path).and_then(|c| sched::build_jobs(&c, &registry, base)) {
        Ok(jobs) => jobs,
        Err(e) => {
            error!(error = %e, "configuration error");
            return ExitCode::from(2);
        }
    };
    info!(jobs = jobs.len(), "daemon started");

    let token = CancellationToken::new();
    let signals = token.clone();
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("shutdown signal received, stopping jobs");
            signals.cancel();
        }
    });

    sched::run_jobs(jobs, token).await;
    info!("daemon stopped");
    ExitCode::SUCCESS
}
