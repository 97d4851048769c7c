//! Message types passed between the transport, the gateway and the worker
//!
//! The transport hands the gateway a [`ClientHandle`] per call. The gateway
//! wraps it in a [`QueuedAction`] with a fresh id and a [`Completion`], and
//! the worker consumes it.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ipc::{ActionMessage, ActionReply};

/// Unique identifier for an action (for correlation in logs)
pub type ActionId = Uuid;

// ============================================================================
// Client handle
// ============================================================================

/// Inbound reader and outbound writer of one call.
///
/// The reader ends when the client half-closes or disconnects. A failed
/// send on the writer means the connection is gone.
#[derive(Debug)]
pub struct ClientHandle {
  pub reader: mpsc::Receiver<ActionMessage>,
  pub writer: mpsc::Sender<ActionReply>,
}

/// The transport's side of a [`ClientHandle`].
#[derive(Debug)]
pub struct ClientEnd {
  pub inbound: mpsc::Sender<ActionMessage>,
  pub outbound: mpsc::Receiver<ActionReply>,
}

impl ClientHandle {
  /// Create a connected handle/end pair with bounded channels.
  pub fn channel(capacity: usize) -> (ClientHandle, ClientEnd) {
    let (inbound, reader) = mpsc::channel(capacity);
    let (writer, outbound) = mpsc::channel(capacity);
    (ClientHandle { reader, writer }, ClientEnd { inbound, outbound })
  }
}

// ============================================================================
// Queued action
// ============================================================================

/// One-shot, payload-free completion signal with a single waiter.
#[derive(Debug)]
pub struct Completion {
  tx: oneshot::Sender<()>,
}

impl Completion {
  pub fn new() -> (Self, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    (Self { tx }, rx)
  }

  /// Fire the signal. Consumes the completion so it can only fire once.
  pub fn fire(self) {
    // The waiter may already be gone if its connection task was aborted
    let _ = self.tx.send(());
  }
}

/// An entry in the action queue.
#[derive(Debug)]
pub struct QueuedAction {
  pub id: ActionId,
  pub client: ClientHandle,
  pub cancel: CancellationToken,
  pub completion: Completion,
}
