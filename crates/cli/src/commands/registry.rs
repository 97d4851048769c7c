//! Registry commands (load, refresh, list, install)

use std::{io::Write, path::Path};

use anyhow::{Result, bail};
use ckanserver::ipc::{
  ActionReply,
  registry::{
    CompatibleReleasesParams, InstanceParams, ModuleRequestParams, PerformInstallParams, PrepopulateParams,
    ProviderChoicePrompt, RefreshParams, RegistryRequest,
  },
  system::ContinueRequest,
};

use super::{connect, no_prompts, run_call, single_reply};
use crate::format;

async fn registry_operation(socket_path: &Path, request: RegistryRequest) -> Result<Option<String>> {
  let client = connect(socket_path).await?;
  let replies = run_call(&client, request, no_prompts).await?;
  format::registry_outcome(single_reply(replies)?)
}

/// Send a listing request; instance lookup failures come back as operation replies.
async fn listing(socket_path: &Path, request: RegistryRequest) -> Result<Vec<ActionReply>> {
  let client = connect(socket_path).await?;
  let replies = run_call(&client, request, no_prompts).await?;
  if let [reply @ (ActionReply::InstanceOperation(_) | ActionReply::RegistryOperation(_))] = replies.as_slice() {
    format::registry_outcome(reply.clone())?;
  }
  Ok(replies)
}

pub async fn cmd_registry_load(socket_path: &Path, instance: String, force_lock: bool) -> Result<()> {
  registry_operation(
    socket_path,
    RegistryRequest::Prepopulate(PrepopulateParams { instance, force_lock }),
  )
  .await?;
  println!("Registry loaded");
  Ok(())
}

pub async fn cmd_registry_refresh(socket_path: &Path, instance: String, force: bool) -> Result<()> {
  let details = registry_operation(socket_path, RegistryRequest::Refresh(RefreshParams { instance, force })).await?;
  println!("{}", details.unwrap_or_else(|| "Repositories refreshed".to_string()));
  Ok(())
}

/// List compatible modules, joining every page
pub async fn cmd_registry_available(socket_path: &Path, instance: String, json_output: bool) -> Result<()> {
  let replies = listing(socket_path, RegistryRequest::AvailableModules(InstanceParams { instance })).await?;
  let modules: Vec<_> = replies
    .into_iter()
    .filter_map(|reply| match reply {
      ActionReply::AvailableModules(page) => Some(page.modules),
      _ => None,
    })
    .flatten()
    .collect();

  if json_output {
    println!("{}", serde_json::to_string_pretty(&modules)?);
  } else {
    format::print_modules(&modules);
  }
  Ok(())
}

pub async fn cmd_registry_states(socket_path: &Path, instance: String, json_output: bool) -> Result<()> {
  let replies = listing(socket_path, RegistryRequest::ModuleStates(InstanceParams { instance })).await?;
  let states: Vec<_> = replies
    .into_iter()
    .filter_map(|reply| match reply {
      ActionReply::ModuleStates(page) => Some(page.states),
      _ => None,
    })
    .flatten()
    .collect();

  if json_output {
    println!("{}", serde_json::to_string_pretty(&states)?);
  } else {
    format::print_states(&states);
  }
  Ok(())
}

pub async fn cmd_registry_compatible(socket_path: &Path, instance: String, identifier: String) -> Result<()> {
  let replies = listing(
    socket_path,
    RegistryRequest::CompatibleReleases(CompatibleReleasesParams { instance, identifier }),
  )
  .await?;
  let ActionReply::CompatibleReleases(result) = single_reply(replies)? else {
    bail!("Unexpected reply from daemon");
  };

  if result.releases.is_empty() {
    println!("No compatible releases of {}", result.identifier);
  }
  for release in &result.releases {
    println!("{} {}", result.identifier, release.version);
  }
  Ok(())
}

/// Split `ID=VERSION` into a module request
fn parse_module_request(raw: &str) -> ModuleRequestParams {
  match raw.split_once('=') {
    Some((identifier, version)) if !version.is_empty() => ModuleRequestParams {
      identifier: identifier.to_string(),
      version: Some(version.to_string()),
    },
    _ => ModuleRequestParams {
      identifier: raw.trim_end_matches('=').to_string(),
      version: None,
    },
  }
}

fn read_line(prompt: &str) -> Result<String> {
  print!("{prompt}");
  std::io::stdout().flush()?;
  let mut input = String::new();
  std::io::stdin().read_line(&mut input)?;
  Ok(input.trim().to_string())
}

fn ask_provider(prompt: &ProviderChoicePrompt) -> Result<ContinueRequest> {
  println!("Several modules provide {}:", prompt.requested);
  for (n, candidate) in prompt.candidates.iter().enumerate() {
    println!("  {}) {} {}  {}", n + 1, candidate.identifier, candidate.version, candidate.summary);
  }

  let input = read_line("Choose one (empty to cancel): ")?;
  let identifier = input
    .parse::<usize>()
    .ok()
    .and_then(|n| n.checked_sub(1))
    .and_then(|n| prompt.candidates.get(n))
    .map(|c| c.identifier.clone());
  Ok(ContinueRequest::Choose { identifier })
}

/// Install and remove modules, answering the daemon's questions on stdin
pub async fn cmd_registry_install(
  socket_path: &Path,
  instance: String,
  identifiers: Vec<String>,
  remove: Vec<String>,
  assume_yes: bool,
) -> Result<()> {
  if identifiers.is_empty() && remove.is_empty() {
    bail!("Nothing to do: name modules to install or pass --remove");
  }

  let request = RegistryRequest::PerformInstall(PerformInstallParams {
    instance,
    install: identifiers.iter().map(|raw| parse_module_request(raw)).collect(),
    remove,
  });

  let client = connect(socket_path).await?;
  let replies = run_call(&client, request, |reply| match reply {
    ActionReply::ProviderChoice(prompt) => ask_provider(prompt),
    ActionReply::InstallPlan(plan) => {
      format::print_plan(plan);
      let accepted = assume_yes || read_line("Continue? [y/N] ")?.eq_ignore_ascii_case("y");
      Ok(ContinueRequest::Confirm { accepted })
    }
    other => bail!("Unexpected prompt from daemon: {other:?}"),
  })
  .await?;

  let details = format::registry_outcome(single_reply(replies)?)?;
  println!("{}", details.unwrap_or_else(|| "Done".to_string()));
  Ok(())
}
