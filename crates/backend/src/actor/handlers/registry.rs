//! Registry handlers - module listings, repository loading and refresh
//!
//! Every handler opens the instance's registry for the length of the call,
//! which holds its lock file until the handler returns.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::{
  actor::action::{Action, ActionError, ActionIo},
  domain::{
    error::{DomainError, DomainResult},
    instance::GameInstance,
    module::Module,
    registry::{RegistryManager, Repository},
    repo_data::{RefreshOutcome, RepositoryDataManager},
    resolver::Resolver,
  },
  ipc::{
    ActionReply,
    instance::{InstanceOperationReply, InstanceOperationResult},
    registry::{
      AvailableModulesPage, CompatibleReleasesParams, CompatibleReleasesResult, InstanceParams, ModuleState,
      ModuleStatesPage, ModuleSummary, OptionalDependenciesParams, OptionalDependenciesResult, PrepopulateParams,
      RefreshParams, RegistryOperationReply, RegistryOperationResult, RegistryRequest,
    },
  },
};

pub async fn handle(action: &mut Action<'_>, request: RegistryRequest) -> Result<(), ActionError> {
  let result = match request {
    RegistryRequest::Prepopulate(p) => prepopulate(action, p).await,
    RegistryRequest::AvailableModules(p) => available_modules(action, p).await,
    RegistryRequest::ModuleStates(p) => module_states(action, p).await,
    RegistryRequest::CompatibleReleases(p) => compatible_releases(action, p).await,
    RegistryRequest::OptionalDependencies(p) => optional_dependencies(action, p).await,
    RegistryRequest::Refresh(p) => refresh(action, p).await,
    RegistryRequest::PerformInstall(p) => super::install::perform_install(action, p).await,
  };
  finish(&action.io, result).await
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Turn a registry domain error into its operation-result reply. Errors
/// without a code are passed on.
pub(super) async fn finish(io: &ActionIo, result: Result<(), ActionError>) -> Result<(), ActionError> {
  match result {
    Err(ActionError::Domain(err)) => match RegistryOperationResult::for_error(&err) {
      Some(code) => {
        let reply = RegistryOperationReply::failed(code, err.to_string());
        io.write(ActionReply::RegistryOperation(reply)).await
      }
      None => Err(err.into()),
    },
    other => other,
  }
}

/// Look up `name`, replying `InstanceNotFound` when it isn't registered.
pub(super) async fn find_instance(action: &Action<'_>, name: &str) -> Result<Option<GameInstance>, ActionError> {
  if let Some(instance) = action.domain.instances.get(name) {
    return Ok(Some(instance.clone()));
  }
  let reply = InstanceOperationReply::failed(
    InstanceOperationResult::InstanceNotFound,
    format!("Instance not found: {name}"),
  );
  action.io.write(ActionReply::InstanceOperation(reply)).await?;
  Ok(None)
}

pub(super) fn open_registry(
  instance: &GameInstance,
  default_repositories: &[Repository],
  force_lock: bool,
) -> DomainResult<RegistryManager> {
  with_lock_retry(force_lock, || RegistryManager::open(instance, default_repositories))
}

/// Run `open`. With `force_lock`, a registry-in-use failure deletes the
/// reported lock file and runs `open` exactly once more.
pub(super) fn with_lock_retry<T>(force_lock: bool, mut open: impl FnMut() -> DomainResult<T>) -> DomainResult<T> {
  match open() {
    Err(DomainError::RegistryInUse { lockfile_path }) if force_lock => {
      warn!(lockfile = %lockfile_path.display(), "Deleting registry lock and retrying");
      match std::fs::remove_file(&lockfile_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
      }
      open()
    }
    other => other,
  }
}

/// Load whatever is cached for `repos`.
pub(super) fn load_repositories(repo_data: &mut RepositoryDataManager, repos: &[Repository]) -> DomainResult<()> {
  for repo in repos {
    if !repo_data.load_cached(repo)? {
      debug!(repo = %repo.name, "Repository not downloaded yet");
    }
  }
  Ok(())
}

pub(super) fn percent(done: usize, total: usize) -> u8 {
  if total == 0 {
    return 100;
  }
  (done * 100 / total).min(100) as u8
}

fn summaries(modules: &[&Module]) -> Vec<ModuleSummary> {
  modules.iter().map(|m| ModuleSummary::from(*m)).collect()
}

// ============================================================================
// Handlers
// ============================================================================

async fn prepopulate(action: &mut Action<'_>, params: PrepopulateParams) -> Result<(), ActionError> {
  let Some(instance) = find_instance(action, &params.instance).await? else {
    return Ok(());
  };
  let registry = open_registry(&instance, &action.domain.settings.repositories, params.force_lock)?;
  let repos = registry.registry().repositories();

  for (done, repo) in repos.iter().enumerate() {
    action
      .io
      .progress(percent(done, repos.len()), format!("Loading {}", repo.name))
      .await?;
    action.domain.repo_data.load_cached(repo)?;
  }
  action.io.progress(100, "Registry loaded").await?;

  action
    .io
    .write(ActionReply::RegistryOperation(RegistryOperationReply::success()))
    .await
}

async fn available_modules(action: &mut Action<'_>, params: InstanceParams) -> Result<(), ActionError> {
  let Some(instance) = find_instance(action, &params.instance).await? else {
    return Ok(());
  };
  let registry = open_registry(&instance, &action.domain.settings.repositories, false)?;
  let repos = registry.registry().repositories();
  load_repositories(&mut action.domain.repo_data, repos)?;

  let criteria = instance.version_criteria();
  let stability = &instance.compat.stability_tolerance;
  let repo_data = &action.domain.repo_data;
  let index = repo_data.available_modules(repos);

  let modules: Vec<ModuleSummary> = index
    .identifiers()
    .filter_map(|id| index.latest_compatible(id, &criteria, stability))
    .map(|m| ModuleSummary::from(m).with_download_count(repo_data.download_count(repos, &m.identifier)))
    .collect();
  debug!(instance = %instance.name, modules = modules.len(), "Listing available modules");

  action
    .io
    .emit_chunks(modules, action.domain.settings.page_size, |modules, remaining| {
      ActionReply::AvailableModules(AvailableModulesPage { modules, remaining })
    })
    .await
}

async fn module_states(action: &mut Action<'_>, params: InstanceParams) -> Result<(), ActionError> {
  let Some(instance) = find_instance(action, &params.instance).await? else {
    return Ok(());
  };
  let registry = open_registry(&instance, &action.domain.settings.repositories, false)?;
  let installed = registry.registry();
  load_repositories(&mut action.domain.repo_data, installed.repositories())?;

  let criteria = instance.version_criteria();
  let stability = &instance.compat.stability_tolerance;
  let index = action.domain.repo_data.available_modules(installed.repositories());

  let mut identifiers: BTreeSet<&str> = index.identifiers().collect();
  identifiers.extend(installed.installed().map(|i| i.module.identifier.as_str()));

  let states: Vec<ModuleState> = identifiers
    .into_iter()
    .map(|id| {
      let installed_version = installed.installed_version(id);
      let latest = index.latest_compatible(id, &criteria, stability);
      ModuleState {
        identifier: id.to_string(),
        upgradeable: matches!((&installed_version, latest), (Some(v), Some(m)) if m.version > *v),
        installed_version: installed_version.map(|v| v.to_string()),
        latest_compatible_version: latest.map(|m| m.version.to_string()),
        auto_installed: installed.installed_module(id).is_some_and(|i| i.auto_installed),
        compatible: latest.is_some(),
      }
    })
    .collect();

  action
    .io
    .emit_chunks(states, action.domain.settings.page_size, |states, remaining| {
      ActionReply::ModuleStates(ModuleStatesPage { states, remaining })
    })
    .await
}

async fn compatible_releases(action: &mut Action<'_>, params: CompatibleReleasesParams) -> Result<(), ActionError> {
  let Some(instance) = find_instance(action, &params.instance).await? else {
    return Ok(());
  };
  let registry = open_registry(&instance, &action.domain.settings.repositories, false)?;
  let repos = registry.registry().repositories();
  load_repositories(&mut action.domain.repo_data, repos)?;

  let index = action.domain.repo_data.available_modules(repos);
  if index.releases(&params.identifier).is_empty() {
    return Err(DomainError::module_not_found(&params.identifier, None).into());
  }
  let releases = index.compatible_releases(
    &params.identifier,
    &instance.version_criteria(),
    &instance.compat.stability_tolerance,
  );

  let result = CompatibleReleasesResult {
    identifier: params.identifier,
    releases: summaries(&releases),
  };
  action.io.write(ActionReply::CompatibleReleases(result)).await
}

async fn optional_dependencies(action: &mut Action<'_>, params: OptionalDependenciesParams) -> Result<(), ActionError> {
  let Some(instance) = find_instance(action, &params.instance).await? else {
    return Ok(());
  };
  let registry = open_registry(&instance, &action.domain.settings.repositories, false)?;
  let installed = registry.registry();
  load_repositories(&mut action.domain.repo_data, installed.repositories())?;

  let criteria = instance.version_criteria();
  let stability = &instance.compat.stability_tolerance;
  let index = action.domain.repo_data.available_modules(installed.repositories());

  let mut modules: Vec<&Module> = Vec::with_capacity(params.identifiers.len());
  for id in &params.identifiers {
    let module = installed
      .installed_module(id)
      .map(|i| &i.module)
      .or_else(|| index.latest_compatible(id, &criteria, stability))
      .ok_or_else(|| DomainError::module_not_found(id, None))?;
    modules.push(module);
  }

  let choices = HashMap::new();
  let optional = Resolver::new(installed, &index, &criteria, stability, &choices).optional_dependencies(&modules);

  let result = OptionalDependenciesResult {
    recommended: summaries(&optional.recommended),
    suggested: summaries(&optional.suggested),
    supporters: summaries(&optional.supporters),
  };
  action.io.write(ActionReply::OptionalDependencies(result)).await
}

async fn refresh(action: &mut Action<'_>, params: RefreshParams) -> Result<(), ActionError> {
  let Some(instance) = find_instance(action, &params.instance).await? else {
    return Ok(());
  };
  let registry = open_registry(&instance, &action.domain.settings.repositories, false)?;
  let repos = registry.registry().repositories();
  if repos.is_empty() {
    action
      .domain
      .user
      .raise_message(&format!("No repositories are configured for {}", instance.name));
  }

  let mut updated = 0;
  for (done, repo) in repos.iter().enumerate() {
    action
      .io
      .progress(percent(done, repos.len()), format!("Updating {}", repo.name))
      .await?;
    let domain = &mut *action.domain;
    let outcome = domain.repo_data.refresh(repo, domain.downloader.as_ref(), params.force).await?;
    if matches!(outcome, RefreshOutcome::Updated) {
      updated += 1;
    }
  }
  action.io.progress(100, "Repositories refreshed").await?;

  let reply = RegistryOperationReply {
    result: RegistryOperationResult::Success,
    details: Some(format!("{updated} of {} repositories updated", repos.len())),
  };
  action.io.write(ActionReply::RegistryOperation(reply)).await
}
