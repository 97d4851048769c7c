//! Per-instance registry of repositories and installed modules.
//!
//! A registry lives in `<game>/CKAN/registry.json`. While a [`RegistryManager`]
//! has it open, `<game>/CKAN/registry.locked` holds the owning process id and
//! any other attempt to open it fails with [`DomainError::RegistryInUse`].

use std::{
  collections::BTreeMap,
  io::Write,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
  error::{DomainError, DomainResult},
  instance::GameInstance,
  module::{Module, ModuleVersion, Relationship},
};

pub const LOCK_FILE_NAME: &str = "registry.locked";
pub const REGISTRY_FILE_NAME: &str = "registry.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
  pub name: String,
  pub url: String,
  #[serde(default)]
  pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledModule {
  pub module: Module,
  pub install_time: DateTime<Utc>,
  #[serde(default)]
  pub auto_installed: bool,
  /// Archive the module was installed from, relative to the download cache
  pub archive: Option<PathBuf>,
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Registry {
  /// Sorted by priority, lowest first
  repositories: Vec<Repository>,
  installed: BTreeMap<String, InstalledModule>,
  /// DLC identifier to detected version
  installed_dlcs: BTreeMap<String, String>,
}

impl Registry {
  pub fn repositories(&self) -> &[Repository] {
    &self.repositories
  }

  pub fn set_repositories(&mut self, mut repositories: Vec<Repository>) {
    repositories.sort_by_key(|r| r.priority);
    self.repositories = repositories;
  }

  pub fn installed(&self) -> impl Iterator<Item = &InstalledModule> {
    self.installed.values()
  }

  pub fn installed_module(&self, identifier: &str) -> Option<&InstalledModule> {
    self.installed.get(identifier)
  }

  pub fn installed_version(&self, identifier: &str) -> Option<ModuleVersion> {
    self
      .installed
      .get(identifier)
      .map(|i| i.module.version.clone())
      .or_else(|| self.installed_dlcs.get(identifier).map(ModuleVersion::new))
  }

  pub fn is_installed(&self, identifier: &str) -> bool {
    self.installed.contains_key(identifier) || self.installed_dlcs.contains_key(identifier)
  }

  /// Whether an installed module (or DLC) already satisfies `relationship`.
  pub fn satisfies(&self, relationship: &Relationship) -> bool {
    self.installed.values().any(|i| relationship.matches(&i.module))
      || relationship.names().iter().any(|n| self.installed_dlcs.contains_key(*n))
  }

  pub fn register_install(&mut self, module: Module, auto_installed: bool, archive: Option<PathBuf>) {
    self.installed.insert(
      module.identifier.clone(),
      InstalledModule {
        module,
        install_time: Utc::now(),
        auto_installed,
        archive,
      },
    );
  }

  pub fn deregister(&mut self, identifier: &str) -> Option<InstalledModule> {
    self.installed.remove(identifier)
  }

  pub fn set_installed_dlcs(&mut self, dlcs: BTreeMap<String, String>) {
    self.installed_dlcs = dlcs;
  }
}

// ============================================================================
// Lock file
// ============================================================================

#[derive(Debug)]
struct RegistryLock {
  path: PathBuf,
}

impl RegistryLock {
  fn acquire(path: PathBuf) -> DomainResult<Self> {
    match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
      Ok(mut file) => {
        write!(file, "{}", std::process::id())?;
        Ok(Self { path })
      }
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(DomainError::RegistryInUse { lockfile_path: path }),
      Err(e) => Err(e.into()),
    }
  }
}

impl Drop for RegistryLock {
  fn drop(&mut self) {
    if let Err(e) = std::fs::remove_file(&self.path) {
      warn!(path = %self.path.display(), error = %e, "Failed to release registry lock");
    }
  }
}

// ============================================================================
// Registry manager
// ============================================================================

/// An open, locked registry. Dropping it releases the lock.
#[derive(Debug)]
pub struct RegistryManager {
  path: PathBuf,
  registry: Registry,
  _lock: RegistryLock,
}

impl RegistryManager {
  pub fn lock_path(instance: &GameInstance) -> PathBuf {
    instance.ckan_dir().join(LOCK_FILE_NAME)
  }

  /// Lock and load the registry of `instance`.
  ///
  /// A registry that doesn't exist yet starts with `default_repositories`.
  pub fn open(instance: &GameInstance, default_repositories: &[Repository]) -> DomainResult<Self> {
    let ckan_dir = instance.ckan_dir();
    std::fs::create_dir_all(&ckan_dir)?;

    let lock = RegistryLock::acquire(ckan_dir.join(LOCK_FILE_NAME))?;
    let path = ckan_dir.join(REGISTRY_FILE_NAME);
    let mut registry = load_registry(&path)?.unwrap_or_else(|| {
      debug!(instance = %instance.name, "Creating new registry");
      let mut registry = Registry::default();
      registry.set_repositories(default_repositories.to_vec());
      registry
    });

    let dlcs = instance
      .game
      .detect_dlcs(&instance.dir)
      .into_iter()
      .map(|(dlc, version)| {
        let version = version.map(|v| v.to_string()).unwrap_or_else(|| "0".to_string());
        (dlc.identifier().to_string(), version)
      })
      .collect();
    registry.set_installed_dlcs(dlcs);

    Ok(Self {
      path,
      registry,
      _lock: lock,
    })
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  pub fn registry_mut(&mut self) -> &mut Registry {
    &mut self.registry
  }

  pub fn save(&self) -> DomainResult<()> {
    let json = serde_json::to_string_pretty(&self.registry).map_err(|e| DomainError::corrupt(&self.path, e))?;
    std::fs::write(&self.path, json)?;
    Ok(())
  }
}

fn load_registry(path: &Path) -> DomainResult<Option<Registry>> {
  match std::fs::read_to_string(path) {
    Ok(content) => serde_json::from_str(&content)
      .map(Some)
      .map_err(|e| DomainError::corrupt(path, e)),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e.into()),
  }
}
