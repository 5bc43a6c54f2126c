//! Signal-driven graceful shutdown and the self-restart escalation path.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum_server::Handle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::manager::ScriptManager;

/// Drain deadline when shutting down ahead of a self-restart.
const RESTART_SHUTDOWN_LIMIT: Duration = Duration::from_secs(5);

/// How the wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// A termination signal arrived; the process should exit.
    Graceful,
    /// The watchdog escalated; the caller should respawn and exit.
    Restart,
}

/// Block until a termination signal or a restart request, then run the
/// shutdown sequence: stop accepting and drain the server, cancel every
/// running script, and (for signals) pause before exit.
pub async fn wait(
    manager: Arc<ScriptManager>,
    server_handle: Handle,
    mut server: JoinHandle<Result<()>>,
    mut restart: mpsc::Receiver<()>,
    config: &Config,
) -> Result<Shutdown> {
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let outcome = tokio::select! {
        _ = sigint.recv() => Shutdown::Graceful,
        _ = sigterm.recv() => Shutdown::Graceful,
        Some(()) = restart.recv() => Shutdown::Restart,
        result = &mut server => {
            result.context("http server task failed")??;
            bail!("http server exited unexpectedly");
        }
    };

    match outcome {
        Shutdown::Graceful => {
            info!("shutting down server gracefully");
            drain(&server_handle, server, config.shutdown_time_limit).await;
            manager.stop();
            info!(
                pause = ?config.shutdown_pause,
                "all workers stopped, pausing for cleanup before exit"
            );
            tokio::time::sleep(config.shutdown_pause).await;
        }
        Shutdown::Restart => {
            info!("shutting down the server gracefully before restart");
            drain(&server_handle, server, RESTART_SHUTDOWN_LIMIT).await;
            warn!("stopping script manager before restart");
            manager.stop();
        }
    }
    Ok(outcome)
}

async fn drain(handle: &Handle, server: JoinHandle<Result<()>>, limit: Duration) {
    handle.graceful_shutdown(Some(limit));
    match tokio::time::timeout(limit + Duration::from_secs(1), server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "http server shutdown error"),
        Ok(Err(e)) => error!(error = %e, "http server task failed during shutdown"),
        Err(_) => error!(?limit, "http server did not drain within the deadline"),
    }
}

/// Spawn a new instance of the current executable with the same arguments
/// and environment, inheriting stdout and stderr. The caller exits
/// afterwards; nothing carries over to the fresh process.
pub fn respawn_process() -> Result<()> {
    let exe = std::env::current_exe().context("failed to find executable")?;
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();

    info!(exe = %exe.display(), ?args, "restarting application");
    std::process::Command::new(&exe)
        .args(&args)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .context("failed to restart application")?;

    warn!("exiting current instance to allow restart");
    Ok(())
}
