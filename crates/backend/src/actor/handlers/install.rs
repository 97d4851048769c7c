//! Install/remove with interactive provider choice and plan confirmation
//!
//! Resolution runs in a loop: every ambiguous virtual dependency becomes a
//! `ProviderChoice` prompt, and the user's pick is fed back into the next
//! attempt. The finished plan is shown as an `InstallPlan` prompt and only
//! carried out once the client accepts it.

use std::collections::HashMap;

use tracing::info;

use super::registry::{find_instance, load_repositories, open_registry, percent};
use crate::{
  actor::action::{Action, ActionError, ActionIo},
  domain::{
    error::DomainError,
    installer::Installer,
    module::ModuleVersion,
    resolver::{InstallPlan, ModuleRequest, Resolver},
  },
  ipc::{
    ActionReply,
    registry::{
      InstallPlanPrompt, ModuleSummary, PerformInstallParams, ProviderChoicePrompt, RegistryOperationReply,
      RegistryOperationResult,
    },
    system::ContinueRequest,
  },
};

pub async fn perform_install(action: &mut Action<'_>, params: PerformInstallParams) -> Result<(), ActionError> {
  let Some(instance) = find_instance(action, &params.instance).await? else {
    return Ok(());
  };
  let mut registry = open_registry(&instance, &action.domain.settings.repositories, false)?;
  let repos = registry.registry().repositories().to_vec();
  load_repositories(&mut action.domain.repo_data, &repos)?;

  let requests: Vec<ModuleRequest> = params
    .install
    .iter()
    .map(|r| ModuleRequest {
      identifier: r.identifier.clone(),
      version: r.version.as_deref().map(ModuleVersion::from),
    })
    .collect();
  let criteria = instance.version_criteria();
  let stability = &instance.compat.stability_tolerance;

  let mut choices: HashMap<String, String> = HashMap::new();
  let plan: InstallPlan = {
    let index = action.domain.repo_data.available_modules(&repos);
    loop {
      let resolver = Resolver::new(registry.registry(), &index, &criteria, stability, &choices);
      match resolver.resolve(&requests, &params.remove) {
        Ok(plan) => break plan,
        Err(DomainError::TooManyProviders { requested, candidates }) => {
          let prompt = ProviderChoicePrompt {
            requested: requested.clone(),
            candidates: candidates
              .iter()
              .filter_map(|id| index.latest_compatible(id, &criteria, stability))
              .map(ModuleSummary::from)
              .collect(),
          };
          match action.io.request_continuation(ActionReply::ProviderChoice(prompt)).await? {
            ContinueRequest::Choose {
              identifier: Some(choice),
            } if candidates.contains(&choice) => {
              info!(action_id = %action.io.id, requested = %requested, choice = %choice, "Provider chosen");
              choices.insert(requested, choice);
            }
            _ => return declined(&action.io, format!("No module was chosen to provide {requested}")).await,
          }
        }
        Err(e) => return Err(e.into()),
      }
    }
  };

  if plan.is_empty() {
    let reply = RegistryOperationReply {
      result: RegistryOperationResult::Success,
      details: Some("Nothing to install or remove".to_string()),
    };
    return action.io.write(ActionReply::RegistryOperation(reply)).await;
  }

  let prompt = ActionReply::InstallPlan(InstallPlanPrompt::from(&plan));
  match action.io.request_continuation(prompt).await? {
    ContinueRequest::Confirm { accepted: true } => {}
    _ => return declined(&action.io, "The install plan was not accepted").await,
  }

  let installer = Installer::new(&action.domain.settings.cache_dir, action.domain.downloader.as_ref());
  let mut archives = Vec::with_capacity(plan.install.len());
  for (done, module) in plan.install.iter().enumerate() {
    action
      .io
      .progress(percent(done, plan.install.len()), format!("Downloading {}", module.key()))
      .await?;
    archives.push(installer.download(module).await?);
  }
  action.io.progress(100, "Updating registry").await?;
  installer.apply(&mut registry, &plan, &archives)?;

  action
    .io
    .write(ActionReply::RegistryOperation(RegistryOperationReply::success()))
    .await
}

async fn declined(io: &ActionIo, details: impl Into<String>) -> Result<(), ActionError> {
  let reply = RegistryOperationReply::failed(RegistryOperationResult::Declined, details);
  io.write(ActionReply::RegistryOperation(reply)).await
}
