//! The gateway - the transport's only way into the action worker
//!
//! The gateway is cheap to clone and can be shared across connection tasks.
//! Every submitted call goes through the queue, even when the worker is idle.

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::trace;
use uuid::Uuid;

use super::{
  message::{ClientHandle, Completion, QueuedAction},
  worker::{ActionWorker, DomainState},
};

/// Handle to the action queue.
#[derive(Clone, Debug)]
pub struct Gateway {
  tx: mpsc::UnboundedSender<QueuedAction>,
}

impl Gateway {
  /// Start the worker that owns `domain` and return a gateway to it.
  ///
  /// The worker stops when `cancel` fires; actions still queued at that
  /// point are dropped and their submitters get [`GatewayError::WorkerGone`].
  pub fn spawn(domain: DomainState, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = ActionWorker::new(domain, rx, cancel);
    let task = tokio::spawn(worker.run());
    (Self { tx }, task)
  }

  /// Queue a call and wait until the worker has finished it.
  ///
  /// Cancelling `cancel` while the call is queued doesn't remove it; the
  /// worker still takes it in turn and completes it right away.
  pub async fn submit(&self, client: ClientHandle, cancel: CancellationToken) -> Result<(), GatewayError> {
    let id = Uuid::now_v7();
    let (completion, done) = Completion::new();

    self
      .tx
      .send(QueuedAction {
        id,
        client,
        cancel,
        completion,
      })
      .map_err(|_| GatewayError::WorkerGone)?;
    trace!(action_id = %id, "Action queued");

    done.await.map_err(|_| GatewayError::WorkerGone)
  }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when submitting to the worker
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
  #[error("Action worker has shut down")]
  WorkerGone,
}
