//! Instance IPC types - game instance management requests and replies
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{
  error::DomainError,
  game::GameVersion,
  instance::{CompatOptions, GameInstance},
  module::{ReleaseStatus, StabilityTolerance},
};

// ============================================================================
// Request types
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "params")]
pub enum InstanceRequest {
  List,
  Add(AddInstanceParams),
  Forget(ForgetInstanceParams),
  Rename(RenameInstanceParams),
  SetDefault(SetDefaultInstanceParams),
  Fake(FakeInstanceParams),
  Clone(CloneInstanceParams),
  SetCompatOptions(SetCompatOptionsParams),
}

impl InstanceRequest {
  pub fn kind(&self) -> &'static str {
    match self {
      InstanceRequest::List => "instances_list",
      InstanceRequest::Add(_) => "instance_add",
      InstanceRequest::Forget(_) => "instance_forget",
      InstanceRequest::Rename(_) => "instance_rename",
      InstanceRequest::SetDefault(_) => "instance_set_default",
      InstanceRequest::Fake(_) => "instance_fake",
      InstanceRequest::Clone(_) => "instance_clone",
      InstanceRequest::SetCompatOptions(_) => "instance_set_compat_options",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddInstanceParams {
  pub name: String,
  pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgetInstanceParams {
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameInstanceParams {
  pub old_name: String,
  pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDefaultInstanceParams {
  pub name: String,
}

/// Version components; major, minor and patch are required for a fake instance.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VersionParams {
  pub major: Option<u32>,
  pub minor: Option<u32>,
  pub patch: Option<u32>,
  pub build: Option<u32>,
}

impl From<VersionParams> for GameVersion {
  fn from(v: VersionParams) -> Self {
    GameVersion {
      major: v.major,
      minor: v.minor,
      patch: v.patch,
      build: v.build,
    }
  }
}

impl From<GameVersion> for VersionParams {
  fn from(v: GameVersion) -> Self {
    Self {
      major: v.major,
      minor: v.minor,
      patch: v.patch,
      build: v.build,
    }
  }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeInstanceParams {
  pub name: String,
  pub path: PathBuf,
  /// Short game name, e.g. "KSP"
  pub game: String,
  pub version: VersionParams,
  pub making_history: Option<VersionParams>,
  pub breaking_ground: Option<VersionParams>,
  #[serde(default)]
  pub use_as_new_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneInstanceParams {
  pub source: String,
  pub new_name: String,
  pub new_path: PathBuf,
  #[serde(default)]
  pub share_stock_folders: bool,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCompatOptionsParams {
  pub name: String,
  pub stability_tolerance: Option<ReleaseStatus>,
  #[serde(default)]
  pub stability_overrides: Vec<StabilityOverride>,
  #[serde(default)]
  pub compatible_versions: Vec<VersionParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityOverride {
  pub identifier: String,
  pub stability: ReleaseStatus,
}

impl SetCompatOptionsParams {
  pub fn to_compat_options(&self) -> CompatOptions {
    CompatOptions {
      stability_tolerance: StabilityTolerance {
        overall: self.stability_tolerance.unwrap_or_default(),
        overrides: self
          .stability_overrides
          .iter()
          .map(|o| (o.identifier.clone(), o.stability))
          .collect(),
      },
      compatible_versions: self.compatible_versions.iter().copied().map(GameVersion::from).collect(),
      game_version_when_stored: None,
    }
  }
}

// ============================================================================
// Reply types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancesListResult {
  pub instances: Vec<InstanceInfo>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
  pub name: String,
  pub game: String,
  pub path: PathBuf,
  pub version: Option<String>,
  pub is_default: bool,
  pub stability_tolerance: ReleaseStatus,
  pub compatible_versions: Vec<String>,
}

impl InstanceInfo {
  pub fn new(instance: &GameInstance, is_default: bool) -> Self {
    Self {
      name: instance.name.clone(),
      game: instance.game.short_name().to_string(),
      path: instance.dir.clone(),
      version: instance.version.map(|v| v.to_string()),
      is_default,
      stability_tolerance: instance.compat.stability_tolerance.overall,
      compatible_versions: instance.compat.compatible_versions.iter().map(ToString::to_string).collect(),
    }
  }
}

/// Outcome code of an instance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceOperationResult {
  Success,
  DuplicateInstance,
  NotAnInstance,
  InstanceNotFound,
  NewInstanceDirExists,
  FakerUnknownGame,
  FakerUnknownVersion,
  FakerVersionTooOld,
  FakerFailed,
  CloneFailed,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceOperationReply {
  pub result: InstanceOperationResult,
  pub details: Option<String>,
}

impl InstanceOperationReply {
  pub fn success() -> Self {
    Self {
      result: InstanceOperationResult::Success,
      details: None,
    }
  }

  pub fn failed(result: InstanceOperationResult, details: impl Into<String>) -> Self {
    Self {
      result,
      details: Some(details.into()),
    }
  }
}

impl InstanceOperationResult {
  /// Result code for a domain error raised by an instance operation, if it has one.
  pub fn for_error(err: &DomainError) -> Option<Self> {
    Some(match err {
      DomainError::InstanceNameTaken { .. } => Self::DuplicateInstance,
      DomainError::NotAnInstance { .. } => Self::NotAnInstance,
      DomainError::InstanceNotFound { .. } => Self::InstanceNotFound,
      DomainError::BadInstallLocation { .. } => Self::NewInstanceDirExists,
      DomainError::UnknownGame(_) => Self::FakerUnknownGame,
      DomainError::BadGameVersion(_) => Self::FakerUnknownVersion,
      DomainError::WrongGameVersion { .. } => Self::FakerVersionTooOld,
      _ => return None,
    })
  }
}
