//! Registry IPC types - module metadata, install plans and refreshes
use serde::{Deserialize, Serialize};

use crate::domain::{
  error::DomainError,
  module::{Module, ModuleKind, ReleaseStatus},
  resolver::InstallPlan,
};

// ============================================================================
// Request types
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "params")]
pub enum RegistryRequest {
  Prepopulate(PrepopulateParams),
  AvailableModules(InstanceParams),
  ModuleStates(InstanceParams),
  CompatibleReleases(CompatibleReleasesParams),
  OptionalDependencies(OptionalDependenciesParams),
  PerformInstall(PerformInstallParams),
  Refresh(RefreshParams),
}

impl RegistryRequest {
  pub fn kind(&self) -> &'static str {
    match self {
      RegistryRequest::Prepopulate(_) => "registry_prepopulate",
      RegistryRequest::AvailableModules(_) => "registry_available_modules",
      RegistryRequest::ModuleStates(_) => "registry_module_states",
      RegistryRequest::CompatibleReleases(_) => "registry_compatible_releases",
      RegistryRequest::OptionalDependencies(_) => "registry_optional_dependencies",
      RegistryRequest::PerformInstall(_) => "registry_perform_install",
      RegistryRequest::Refresh(_) => "registry_refresh",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceParams {
  pub instance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepopulateParams {
  pub instance: String,
  /// Delete a stale registry lock and retry once
  #[serde(default)]
  pub force_lock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibleReleasesParams {
  pub instance: String,
  pub identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionalDependenciesParams {
  pub instance: String,
  pub identifiers: Vec<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRequestParams {
  pub identifier: String,
  pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformInstallParams {
  pub instance: String,
  #[serde(default)]
  pub install: Vec<ModuleRequestParams>,
  #[serde(default)]
  pub remove: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshParams {
  pub instance: String,
  /// Re-download repositories even when cached
  #[serde(default)]
  pub force: bool,
}

// ============================================================================
// Reply types
// ============================================================================

/// Outcome code of a registry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryOperationResult {
  Success,
  RegistryInUse,
  ModuleNotFound,
  TooManyProviders,
  Inconsistent,
  DownloadFailed,
  Throttled,
  Declined,
}

impl RegistryOperationResult {
  /// Result code for a domain error raised by a registry operation, if it has one.
  pub fn for_error(err: &DomainError) -> Option<Self> {
    Some(match err {
      DomainError::RegistryInUse { .. } => Self::RegistryInUse,
      DomainError::ModuleNotFound { .. } => Self::ModuleNotFound,
      DomainError::TooManyProviders { .. } => Self::TooManyProviders,
      DomainError::Inconsistent { .. } => Self::Inconsistent,
      DomainError::Download { .. } | DomainError::DownloadAuth { .. } => Self::DownloadFailed,
      DomainError::Throttled { .. } => Self::Throttled,
      _ => return None,
    })
  }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryOperationReply {
  pub result: RegistryOperationResult,
  pub details: Option<String>,
}

impl RegistryOperationReply {
  pub fn success() -> Self {
    Self {
      result: RegistryOperationResult::Success,
      details: None,
    }
  }

  pub fn failed(result: RegistryOperationResult, details: impl Into<String>) -> Self {
    Self {
      result,
      details: Some(details.into()),
    }
  }
}

/// What list replies carry for one module release.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSummary {
  pub identifier: String,
  pub name: String,
  #[serde(rename = "abstract")]
  pub summary: String,
  pub version: String,
  pub kind: ModuleKind,
  pub authors: Vec<String>,
  pub release_status: ReleaseStatus,
  pub download_size: u64,
  pub download_count: Option<u64>,
}

impl From<&Module> for ModuleSummary {
  fn from(module: &Module) -> Self {
    Self {
      identifier: module.identifier.clone(),
      name: module.name.clone(),
      summary: module.summary.clone(),
      version: module.version.to_string(),
      kind: module.kind,
      authors: module.authors.clone(),
      release_status: module.release_status,
      download_size: module.download_size,
      download_count: None,
    }
  }
}

impl ModuleSummary {
  pub fn with_download_count(mut self, count: Option<u64>) -> Self {
    self.download_count = count;
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableModulesPage {
  pub modules: Vec<ModuleSummary>,
  /// Modules still to come in later pages
  pub remaining: usize,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleState {
  pub identifier: String,
  pub installed_version: Option<String>,
  pub latest_compatible_version: Option<String>,
  pub upgradeable: bool,
  pub auto_installed: bool,
  pub compatible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatesPage {
  pub states: Vec<ModuleState>,
  pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibleReleasesResult {
  pub identifier: String,
  /// Newest first
  pub releases: Vec<ModuleSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalDependenciesResult {
  pub recommended: Vec<ModuleSummary>,
  pub suggested: Vec<ModuleSummary>,
  pub supporters: Vec<ModuleSummary>,
}

// ============================================================================
// Continuation prompts
// ============================================================================

/// Asks the client to pick one of several modules providing `requested`.
/// Answered with a `choose` continuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderChoicePrompt {
  pub requested: String,
  pub candidates: Vec<ModuleSummary>,
}

/// Asks the client to confirm an install plan. Answered with a `confirm` continuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPlanPrompt {
  pub install: Vec<PlannedModule>,
  pub remove: Vec<String>,
  pub download_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedModule {
  pub identifier: String,
  pub version: String,
  pub auto_installed: bool,
}

impl From<&InstallPlan> for InstallPlanPrompt {
  fn from(plan: &InstallPlan) -> Self {
    Self {
      install: plan
        .install
        .iter()
        .map(|m| PlannedModule {
          identifier: m.identifier.clone(),
          version: m.version.to_string(),
          auto_installed: plan.auto_installed.contains(&m.identifier),
        })
        .collect(),
      remove: plan.remove.clone(),
      download_size: plan.download_size(),
    }
  }
}
