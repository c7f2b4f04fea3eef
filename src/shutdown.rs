//! Process shutdown signal handling.
//!
//! [`wait_for_shutdown_signal`] completes when the process is asked to
//! terminate. The CLI awaits it to cancel the ambient token: a one-shot run
//! stops dispatching further groups, the daemon stops its job loops; in
//! both cases the retirement queue is still drained so backgrounded probe
//! processes are not leaked.
//!
//! On Unix this covers SIGINT, SIGTERM and SIGQUIT, with
//! [`tokio::signal::ctrl_c`] as a fallback; elsewhere only Ctrl-C is
//! available.

#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
