//! CLI command implementations

mod daemon;
mod instance;
mod registry;
mod version;

use std::path::Path;

use anyhow::{Context, Result, bail};
use ckanserver::{
  Daemon,
  ipc::{ActionMessage, ActionReply, Client, system::ContinueRequest},
};
pub use daemon::cmd_daemon;
pub use instance::{
  cmd_instance_add, cmd_instance_clone, cmd_instance_default, cmd_instance_fake, cmd_instance_forget, cmd_instance_list,
  cmd_instance_rename,
};
pub use registry::{
  cmd_registry_available, cmd_registry_compatible, cmd_registry_install, cmd_registry_load, cmd_registry_refresh,
  cmd_registry_states,
};
pub use version::cmd_version;

use crate::format;

async fn connect(socket_path: &Path) -> Result<Client> {
  Daemon::connect_or_start(socket_path)
    .await
    .context("Failed to connect to daemon")
}

/// Run one action call to completion.
///
/// Progress is printed to stderr as it arrives and every prompt is handed to
/// `answer`. A failure reply becomes an error; every other reply is returned.
async fn run_call<F>(client: &Client, message: impl Into<ActionMessage>, mut answer: F) -> Result<Vec<ActionReply>>
where
  F: FnMut(&ActionReply) -> Result<ContinueRequest>,
{
  let mut stream = client.open_action().await?;
  stream.send(message).await?;

  let mut replies = Vec::new();
  while let Some(reply) = stream.next_reply().await? {
    match reply {
      ActionReply::Progress(progress) => format::print_progress(&progress),
      ActionReply::Failure(failure) => bail!("{}", failure.message),
      reply if reply.is_prompt() => {
        let continuation = answer(&reply)?;
        stream.send(continuation).await?;
      }
      reply => replies.push(reply),
    }
  }
  Ok(replies)
}

/// Prompt handler for calls that never ask anything.
fn no_prompts(reply: &ActionReply) -> Result<ContinueRequest> {
  bail!("Daemon asked an unexpected question: {reply:?}")
}

/// The one reply a simple call produces.
fn single_reply(mut replies: Vec<ActionReply>) -> Result<ActionReply> {
  match replies.len() {
    1 => Ok(replies.remove(0)),
    n => bail!("Expected one reply from the daemon, got {n}"),
  }
}
