//! The action worker - sole owner of the domain state
//!
//! Takes one [`QueuedAction`] at a time off the queue and runs it to
//! completion before looking at the next. Nothing else touches the domain
//! managers, so they need no locks.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
  action::{Action, ActionError, ActionIo},
  handlers,
  message::QueuedAction,
};
use crate::domain::{
  config::WorkerSettings,
  downloader::Downloader,
  error::DomainResult,
  instance::InstanceManager,
  repo_data::RepositoryDataManager,
  user::{LogUser, User},
};

// ============================================================================
// Domain state
// ============================================================================

/// Everything the handlers read and mutate.
pub struct DomainState {
  pub instances: InstanceManager,
  pub repo_data: RepositoryDataManager,
  pub downloader: Arc<dyn Downloader>,
  pub user: Arc<dyn User>,
  pub settings: WorkerSettings,
}

impl DomainState {
  pub fn load(settings: WorkerSettings, downloader: Arc<dyn Downloader>) -> DomainResult<Self> {
    let instances = InstanceManager::load(&settings.data_dir, settings.search_paths.clone())?;
    let repo_data = RepositoryDataManager::new(&settings.cache_dir);
    Ok(Self {
      instances,
      repo_data,
      downloader,
      user: Arc::new(LogUser),
      settings,
    })
  }

  /// Register default game installs when nothing is registered yet.
  fn bootstrap_instances(&mut self) {
    if !self.settings.auto_register || !self.instances.instances().is_empty() {
      return;
    }
    match self.instances.find_and_register_default_instances() {
      Ok(0) => debug!("No default game instances found"),
      Ok(found) => info!(found, "Registered default game instances"),
      Err(e) => warn!(error = %e, "Failed to register default game instances"),
    }
  }
}

// ============================================================================
// Worker
// ============================================================================

pub struct ActionWorker {
  domain: DomainState,
  queue: mpsc::UnboundedReceiver<QueuedAction>,
  cancel: CancellationToken,
}

impl ActionWorker {
  pub fn new(domain: DomainState, queue: mpsc::UnboundedReceiver<QueuedAction>, cancel: CancellationToken) -> Self {
    Self { domain, queue, cancel }
  }

  pub async fn run(mut self) {
    info!("Action worker starting");

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("Action worker received shutdown signal");
          break;
        }

        queued = self.queue.recv() => {
          match queued {
            Some(queued) => self.process_one(queued).await,
            None => {
              debug!("Action queue closed");
              break;
            }
          }
        }
      }
    }

    info!("Action worker stopped");
  }

  async fn process_one(&mut self, queued: QueuedAction) {
    let QueuedAction {
      id,
      client,
      cancel,
      completion,
    } = queued;
    let started = Instant::now();
    debug!(action_id = %id, "Action dequeued");

    let mut action = Action {
      io: ActionIo::new(id, client, cancel),
      domain: &mut self.domain,
    };

    match AssertUnwindSafe(execute(&mut action)).catch_unwind().await {
      Ok(Ok(())) => {}
      Ok(Err(ActionError::Cancelled)) => debug!(action_id = %id, "Action cancelled"),
      Ok(Err(e)) => {
        error!(action_id = %id, error = %e, "Action failed");
        let _ = action.io.fail(e.to_string()).await;
      }
      Err(panic) => {
        let reason = panic
          .downcast_ref::<&str>()
          .map(|s| s.to_string())
          .or_else(|| panic.downcast_ref::<String>().cloned())
          .unwrap_or_default();
        error!(action_id = %id, panic = %reason, "Action handler panicked");
        let _ = action.io.fail("Internal error").await;
      }
    }

    // Drops the writer so the transport can flush and close
    drop(action);
    completion.fire();
    debug!(action_id = %id, elapsed_ms = started.elapsed().as_millis() as u64, "Action completed");
  }
}

async fn execute(action: &mut Action<'_>) -> Result<(), ActionError> {
  let Some(message) = action.io.read_message().await? else {
    debug!(action_id = %action.io.id, "Client sent no message");
    return Ok(());
  };
  debug!(action_id = %action.io.id, kind = message.kind(), "Dispatching action");

  action.domain.bootstrap_instances();
  handlers::dispatch(action, message).await
}
