//! # Cross-platform OS signal handling.
//!
//! Two async helpers back the supervisor's signal surface:
//! - [`wait_for_shutdown_signal`] completes when the process receives a
//!   termination signal and reports which one, for logging.
//! - [`wait_for_user_signal`] completes on `SIGUSR1`, the trigger for the
//!   lazy status-server start.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGHUP` (terminal hangup)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//! - `SIGUSR1` (lazy status-server start)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]; the user signal never fires.

/// Waits for a termination signal and returns its name.
///
/// Each call creates independent signal listeners.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = tokio::signal::ctrl_c() => "interrupt",
        _ = sigint.recv()  => "interrupt",
        _ = sighup.recv()  => "hangup",
        _ = sigterm.recv() => "terminated",
        _ = sigquit.recv() => "quit",
    };
    Ok(name)
}

/// Waits for a termination signal and returns its name.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("interrupt")
}

/// Waits for the designated user signal (`SIGUSR1`).
#[cfg(unix)]
pub async fn wait_for_user_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    sigusr1.recv().await;
    Ok(())
}

/// Waits for the designated user signal. Never resolves on platforms
/// without user signals.
#[cfg(not(unix))]
pub async fn wait_for_user_signal() -> std::io::Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
