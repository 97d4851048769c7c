//! One in-flight call as seen by a handler
//!
//! [`Action`] pairs the call's stream ([`ActionIo`]) with the worker's domain
//! state. The two halves are separate fields so a handler can hold a borrow
//! of a domain manager while it writes replies.

use tracing::trace;

use super::{
  chunk::paginate,
  message::{ActionId, ClientHandle},
  worker::DomainState,
};
use crate::{
  domain::error::DomainError,
  ipc::{ActionMessage, ActionReply, system::ContinueRequest},
};
use tokio_util::sync::CancellationToken;

pub struct Action<'d> {
  pub io: ActionIo,
  pub domain: &'d mut DomainState,
}

/// The stream halves and cancellation token of one call.
pub struct ActionIo {
  pub id: ActionId,
  client: ClientHandle,
  cancel: CancellationToken,
}

impl ActionIo {
  pub fn new(id: ActionId, client: ClientHandle, cancel: CancellationToken) -> Self {
    Self { id, client, cancel }
  }

  /// Next inbound message, or `None` once the client has stopped sending.
  pub async fn read_message(&mut self) -> Result<Option<ActionMessage>, ActionError> {
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(ActionError::Cancelled),
      msg = self.client.reader.recv() => Ok(msg),
    }
  }

  /// Write one reply. A closed connection counts as cancellation.
  pub async fn write(&self, reply: ActionReply) -> Result<(), ActionError> {
    if self.cancel.is_cancelled() {
      return Err(ActionError::Cancelled);
    }
    trace!(action_id = %self.id, ?reply, "Writing reply");
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(ActionError::Cancelled),
      res = self.client.writer.send(reply) => res.map_err(|_| ActionError::Cancelled),
    }
  }

  pub async fn fail(&self, message: impl Into<String>) -> Result<(), ActionError> {
    self.write(ActionReply::failure(message)).await
  }

  pub async fn progress(&self, percent: u8, message: impl Into<String>) -> Result<(), ActionError> {
    self.write(ActionReply::progress(percent, message)).await
  }

  /// Write `prompt` and wait for the client's `continue` answer.
  ///
  /// Blocks the whole queue until the client answers or goes away.
  pub async fn request_continuation(&mut self, prompt: ActionReply) -> Result<ContinueRequest, ActionError> {
    self.write(prompt).await?;
    match self.read_message().await? {
      Some(ActionMessage::Continue(answer)) => Ok(answer),
      Some(other) => Err(ActionError::UnexpectedMessage {
        expected: "continue",
        actual: other.kind().to_string(),
      }),
      None => Err(ActionError::UnexpectedMessage {
        expected: "continue",
        actual: "client disconnected".to_string(),
      }),
    }
  }

  /// Write `items` as consecutive pages, `wrap` turning each page and its
  /// remaining count into a reply.
  pub async fn emit_chunks<T>(
    &self,
    items: Vec<T>,
    page_size: usize,
    wrap: impl Fn(Vec<T>, usize) -> ActionReply,
  ) -> Result<(), ActionError> {
    for page in paginate(items, page_size) {
      self.write(wrap(page.items, page.remaining)).await?;
    }
    Ok(())
  }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
  #[error("Action was cancelled")]
  Cancelled,
  #[error("Expected a {expected} message, got a {actual} message")]
  UnexpectedMessage { expected: &'static str, actual: String },
  #[error(transparent)]
  Domain(#[from] DomainError),
}
