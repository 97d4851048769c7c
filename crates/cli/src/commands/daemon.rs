//! Daemon command

use anyhow::{Context, Result};
use ckanserver::{Daemon, RuntimeConfig, dirs};
use tracing::info;

/// Start the daemon.
///
/// With `spawn_only` the current process just launches a detached daemon and
/// returns; otherwise it becomes the daemon.
pub async fn cmd_daemon(runtime: RuntimeConfig, spawn_only: bool) -> Result<()> {
  if spawn_only {
    if dirs::is_daemon_running(&runtime.socket_path) {
      println!("Daemon already running at {}", runtime.socket_path.display());
      return Ok(());
    }
    let pid = Daemon::spawn_background().context("Failed to start daemon")?;
    println!("Started daemon (pid {pid})");
    return Ok(());
  }

  info!("Starting ckanserver daemon");
  Daemon::new(runtime).run().await;
  Ok(())
}
