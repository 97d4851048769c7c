//! Typed failures raised by the domain library.
//!
//! Handlers match on these explicitly to pick an operation-result code;
//! anything they don't recognise becomes a generic failure reply.

use std::path::PathBuf;

/// Errors raised by the instance manager, registries, resolver and installer.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
  #[error("{} is not a valid game directory", path.display())]
  NotAnInstance { path: PathBuf },
  #[error("Instance not found: {name}")]
  InstanceNotFound { name: String },
  #[error("Instance name already in use: {name}")]
  InstanceNameTaken { name: String },
  #[error("Cannot use {} as an install location: {reason}", path.display())]
  BadInstallLocation { path: PathBuf, reason: String },
  #[error("Unknown game: {0}")]
  UnknownGame(String),
  #[error("Unknown game version: {0}")]
  BadGameVersion(String),
  #[error("Game version {actual} is too old, {required} is required for {what}")]
  WrongGameVersion {
    what: String,
    required: String,
    actual: String,
  },
  #[error("Registry is in use by another process (lock file {})", lockfile_path.display())]
  RegistryInUse { lockfile_path: PathBuf },
  #[error("Module not found: {identifier}{}", version.as_deref().map(|v| format!(" {v}")).unwrap_or_default())]
  ModuleNotFound {
    identifier: String,
    version: Option<String>,
  },
  #[error("Too many modules provide {requested}: {}", candidates.join(", "))]
  TooManyProviders {
    requested: String,
    candidates: Vec<String>,
  },
  #[error("Inconsistent install plan: {}", problems.join("; "))]
  Inconsistent { problems: Vec<String> },
  #[error("Download of {url} failed: {reason}")]
  Download { url: String, reason: String },
  #[error("Download of {url} was refused: authentication required")]
  DownloadAuth { url: String },
  #[error("Download of {url} was throttled by the server")]
  Throttled { url: String },
  #[error("Corrupt data in {}: {reason}", path.display())]
  Corrupt { path: PathBuf, reason: String },
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

impl DomainError {
  pub fn not_an_instance(path: impl Into<PathBuf>) -> Self {
    Self::NotAnInstance { path: path.into() }
  }

  pub fn instance_not_found(name: impl Into<String>) -> Self {
    Self::InstanceNotFound { name: name.into() }
  }

  pub fn module_not_found(identifier: impl Into<String>, version: Option<String>) -> Self {
    Self::ModuleNotFound {
      identifier: identifier.into(),
      version,
    }
  }

  pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
    Self::Corrupt {
      path: path.into(),
      reason: reason.to_string(),
    }
  }
}

pub type DomainResult<T> = Result<T, DomainError>;
