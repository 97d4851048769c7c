//! Daemon lifecycle management
//!
//! # Architecture
//!
//! ```text
//! Daemon (Supervisor)
//!   ├── Server (IPC listener, spawns connection tasks)
//!   └── ActionWorker (owns instances, registries and repository data)
//! ```
//!
//! # Lifecycle
//!
//! 1. Create master `CancellationToken`
//! 2. Load domain state and spawn the action worker with a child token
//! 3. Create `Server` with the gateway
//! 4. Run server until cancelled (ctrl-c)
//! 5. Cancel the worker and wait for it to stop

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  actor::{DomainState, Gateway},
  dirs,
  domain::{
    config::{Config, WorkerSettings},
    downloader::HttpDownloader,
  },
  ipc::{Client, IpcError},
  server::{Server, ServerConfig},
};

// ============================================================================
// Configuration
// ============================================================================

/// Daemon runtime configuration, resolved from the config file and environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Path to the Unix socket for IPC
  pub socket_path: PathBuf,
  /// Instance list and log files
  pub data_dir: PathBuf,
  /// Repository caches and downloaded archives
  pub cache_dir: PathBuf,
  /// Run in foreground mode (logs to the console)
  pub foreground: bool,
  pub config: Config,
}

impl RuntimeConfig {
  pub async fn load() -> Self {
    Self::ensure_user_config().await;

    let config = Config::load_global().await;
    let socket_path = config
      .server
      .socket_path
      .clone()
      .unwrap_or_else(dirs::default_socket_path);

    Self {
      socket_path,
      data_dir: dirs::default_data_dir(),
      cache_dir: dirs::default_cache_dir(),
      foreground: false,
      config,
    }
  }

  /// Write the commented config template on first run.
  async fn ensure_user_config() {
    let Some(path) = Config::user_config_path() else {
      return;
    };
    if tokio::fs::try_exists(&path).await.unwrap_or(true) {
      return;
    }

    let written = async {
      if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
      }
      tokio::fs::write(&path, Config::generate_template()).await
    }
    .await;
    match written {
      Ok(()) => info!(path = %path.display(), "Wrote default config"),
      Err(e) => warn!(path = %path.display(), error = %e, "Could not write default config"),
    }
  }

  pub fn worker_settings(&self) -> WorkerSettings {
    WorkerSettings::from_config(&self.config, self.data_dir.clone(), self.cache_dir.clone())
  }
}

// ============================================================================
// Daemon
// ============================================================================

const STARTUP_POLL_ATTEMPTS: u32 = 10;
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Daemon {
  runtime_config: RuntimeConfig,
}

impl Daemon {
  pub fn new(runtime_config: RuntimeConfig) -> Self {
    Self { runtime_config }
  }

  /// Connect to a running daemon, starting one in the background if necessary.
  pub async fn connect_or_start(socket_path: &std::path::Path) -> Result<Client, IpcError> {
    if dirs::is_daemon_running(socket_path) {
      return Client::connect_to(socket_path).await;
    }

    let pid = Self::spawn_background()?;
    info!(pid, "Started daemon in the background");

    for attempt in 1..=STARTUP_POLL_ATTEMPTS {
      tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
      match Client::connect_to(socket_path).await {
        Ok(client) => return Ok(client),
        Err(e) => debug!(attempt, error = %e, "Daemon not accepting connections yet"),
      }
    }

    Err(IpcError::Connection(format!(
      "daemon did not open {} after startup",
      socket_path.display()
    )))
  }

  /// Launch `<current exe> daemon --background` with no attached stdio.
  pub fn spawn_background() -> std::io::Result<u32> {
    use std::process::{Command, Stdio};

    let child = Command::new(std::env::current_exe()?)
      .args(["daemon", "--background"])
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .spawn()?;
    Ok(child.id())
  }

  /// Run the daemon until ctrl-c.
  pub async fn run(self) {
    info!(
      socket = %self.runtime_config.socket_path.display(),
      data_dir = %self.runtime_config.data_dir.display(),
      cache_dir = %self.runtime_config.cache_dir.display(),
      "Starting ckanserver daemon"
    );

    let cancel = CancellationToken::new();

    let timeout = Duration::from_secs(self.runtime_config.config.registry.download_timeout_secs);
    let downloader = match HttpDownloader::new(timeout) {
      Ok(d) => Arc::new(d),
      Err(e) => {
        error!(error = %e, "Failed to create HTTP client, shutting down daemon");
        return;
      }
    };

    let domain = match DomainState::load(self.runtime_config.worker_settings(), downloader) {
      Ok(domain) => domain,
      Err(e) => {
        error!(error = %e, "Failed to load instances, shutting down daemon");
        return;
      }
    };
    info!(instances = domain.instances.instances().len(), "Loaded game instances");

    let (gateway, worker) = Gateway::spawn(domain, cancel.child_token());

    let server = Server::new(ServerConfig {
      socket_path: self.runtime_config.socket_path.clone(),
      gateway,
    });

    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    if let Err(e) = server.run(cancel.child_token()).await {
      error!(error = %e, "Server stopped with an error");
    }

    cancel.cancel();
    if let Err(e) = worker.await {
      error!(error = %e, "Action worker task failed");
    }
    info!("Daemon stopped");
  }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
  match signal::ctrl_c().await {
    Ok(()) => {
      info!("Interrupted, stopping");
      cancel.cancel();
    }
    Err(e) => warn!(error = %e, "Ctrl-c handler unavailable"),
  }
}
