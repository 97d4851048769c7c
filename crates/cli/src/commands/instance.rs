//! Instance management commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ckanserver::{
  game::GameVersion,
  ipc::{
    ActionReply,
    instance::{
      AddInstanceParams, CloneInstanceParams, FakeInstanceParams, ForgetInstanceParams, InstanceRequest,
      RenameInstanceParams, SetDefaultInstanceParams, VersionParams,
    },
  },
};

use super::{connect, no_prompts, run_call, single_reply};
use crate::format;

/// Send one instance request and check its operation result.
async fn instance_operation(socket_path: &Path, request: InstanceRequest) -> Result<Option<String>> {
  let client = connect(socket_path).await?;
  let replies = run_call(&client, request, no_prompts).await?;
  format::instance_outcome(single_reply(replies)?)
}

fn parse_version(raw: &str) -> Result<VersionParams> {
  let version: GameVersion = raw.parse().with_context(|| format!("Invalid game version: {raw}"))?;
  Ok(version.into())
}

/// List registered instances
pub async fn cmd_instance_list(socket_path: &Path, json_output: bool) -> Result<()> {
  let client = connect(socket_path).await?;
  let replies = run_call(&client, InstanceRequest::List, no_prompts).await?;

  let ActionReply::InstancesList(list) = single_reply(replies)? else {
    bail!("Unexpected reply from daemon");
  };

  if json_output {
    println!("{}", serde_json::to_string_pretty(&list.instances)?);
  } else {
    format::print_instances(&list.instances);
  }
  Ok(())
}

pub async fn cmd_instance_add(socket_path: &Path, name: String, path: PathBuf) -> Result<()> {
  // The daemon resolves paths relative to its own working directory
  let path = std::path::absolute(&path).unwrap_or(path);
  instance_operation(socket_path, InstanceRequest::Add(AddInstanceParams { name: name.clone(), path })).await?;
  println!("Added instance '{name}'");
  Ok(())
}

pub async fn cmd_instance_forget(socket_path: &Path, name: String) -> Result<()> {
  instance_operation(socket_path, InstanceRequest::Forget(ForgetInstanceParams { name: name.clone() })).await?;
  println!("Forgot instance '{name}'");
  Ok(())
}

pub async fn cmd_instance_rename(socket_path: &Path, old_name: String, new_name: String) -> Result<()> {
  instance_operation(
    socket_path,
    InstanceRequest::Rename(RenameInstanceParams {
      old_name: old_name.clone(),
      new_name: new_name.clone(),
    }),
  )
  .await?;
  println!("Renamed '{old_name}' to '{new_name}'");
  Ok(())
}

pub async fn cmd_instance_default(socket_path: &Path, name: String) -> Result<()> {
  instance_operation(
    socket_path,
    InstanceRequest::SetDefault(SetDefaultInstanceParams { name: name.clone() }),
  )
  .await?;
  println!("'{name}' is now the default instance");
  Ok(())
}

/// Create a fake instance with optional DLC
#[allow(clippy::too_many_arguments)]
pub async fn cmd_instance_fake(
  socket_path: &Path,
  name: String,
  path: PathBuf,
  game: &str,
  version: &str,
  making_history: Option<&str>,
  breaking_ground: Option<&str>,
  set_default: bool,
) -> Result<()> {
  let params = FakeInstanceParams {
    name: name.clone(),
    path: std::path::absolute(&path).unwrap_or(path),
    game: game.to_string(),
    version: parse_version(version)?,
    making_history: making_history.map(parse_version).transpose()?,
    breaking_ground: breaking_ground.map(parse_version).transpose()?,
    use_as_new_default: set_default,
  };
  instance_operation(socket_path, InstanceRequest::Fake(params)).await?;
  println!("Created fake {game} {version} instance '{name}'");
  Ok(())
}

pub async fn cmd_instance_clone(
  socket_path: &Path,
  source: String,
  new_name: String,
  new_path: PathBuf,
  share_stock_folders: bool,
) -> Result<()> {
  let params = CloneInstanceParams {
    source: source.clone(),
    new_name: new_name.clone(),
    new_path: std::path::absolute(&new_path).unwrap_or(new_path),
    share_stock_folders,
  };
  instance_operation(socket_path, InstanceRequest::Clone(params)).await?;
  println!("Cloned '{source}' to '{new_name}'");
  Ok(())
}
