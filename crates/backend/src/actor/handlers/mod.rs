//! Routing from an opening message to its handler
//!
//! Handlers write zero or more replies through [`Action::io`] and return
//! `Ok(())` once their terminal reply is written. Domain errors they can't
//! map to an operation-result code are returned and become a failure reply.

mod install;
mod instances;
mod registry;

use super::action::{Action, ActionError};
use crate::ipc::ActionMessage;

pub async fn dispatch(action: &mut Action<'_>, message: ActionMessage) -> Result<(), ActionError> {
  match message {
    ActionMessage::Instances(request) => instances::handle(action, request).await,
    ActionMessage::Registry(request) => registry::handle(action, request).await,
    ActionMessage::Continue(_) => {
      action
        .io
        .fail("A continuation request cannot be the first message sent")
        .await
    }
    ActionMessage::Unknown(_) => action.io.fail("Unknown message type").await,
  }
}
