//! Game instances and the manager that keeps track of them.
//!
//! The manager persists the list of registered instances (and the default
//! one) to `instances.toml` in the data directory. Per-instance compatibility
//! settings live next to the instance's registry in `<game>/CKAN/compat.json`.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{
  error::{DomainError, DomainResult},
  game::{Dlc, Game, GameVersion},
  module::StabilityTolerance,
  registry::LOCK_FILE_NAME,
};

const STORE_FILE_NAME: &str = "instances.toml";
const COMPAT_FILE_NAME: &str = "compat.json";

// ============================================================================
// Game instance
// ============================================================================

/// Compatibility settings of one instance.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatOptions {
  pub stability_tolerance: StabilityTolerance,
  /// Extra game versions whose modules are treated as compatible.
  pub compatible_versions: Vec<GameVersion>,
  /// Game version at the time `compatible_versions` was last saved.
  pub game_version_when_stored: Option<GameVersion>,
}

#[derive(Debug, Clone)]
pub struct GameInstance {
  pub name: String,
  pub game: Game,
  pub dir: PathBuf,
  pub version: Option<GameVersion>,
  pub compat: CompatOptions,
}

impl GameInstance {
  fn open(name: String, game: Game, dir: PathBuf) -> DomainResult<Self> {
    if !game.is_instance_dir(&dir) {
      return Err(DomainError::not_an_instance(dir));
    }
    let version = game.detect_version(&dir);
    let compat = load_compat(&dir.join("CKAN").join(COMPAT_FILE_NAME));
    Ok(Self {
      name,
      game,
      dir,
      version,
      compat,
    })
  }

  /// Directory holding the registry, lock file and compat settings.
  pub fn ckan_dir(&self) -> PathBuf {
    self.dir.join("CKAN")
  }

  /// Versions a module may target to count as compatible with this instance.
  pub fn version_criteria(&self) -> Vec<GameVersion> {
    self.version.iter().chain(self.compat.compatible_versions.iter()).copied().collect()
  }

  fn save_compat(&self) -> DomainResult<()> {
    let dir = self.ckan_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(&self.compat).map_err(|e| DomainError::corrupt(&dir, e))?;
    std::fs::write(dir.join(COMPAT_FILE_NAME), json)?;
    Ok(())
  }
}

fn load_compat(path: &Path) -> CompatOptions {
  match std::fs::read_to_string(path) {
    Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
      warn!(path = %path.display(), error = %e, "Ignoring unreadable compat settings");
      CompatOptions::default()
    }),
    Err(_) => CompatOptions::default(),
  }
}

// ============================================================================
// Persistence
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize)]
struct InstanceStore {
  auto_start: Option<String>,
  #[serde(default)]
  instances: Vec<StoredInstance>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredInstance {
  name: String,
  game: Game,
  path: PathBuf,
}

// ============================================================================
// Instance manager
// ============================================================================

/// The set of known game instances.
///
/// Not safe for concurrent use; the action worker is its only owner.
#[derive(Debug)]
pub struct InstanceManager {
  store_path: PathBuf,
  search_paths: Vec<PathBuf>,
  instances: BTreeMap<String, GameInstance>,
  auto_start: Option<String>,
}

impl InstanceManager {
  /// Load the registered instances from `data_dir`.
  ///
  /// Instances whose directory is no longer a valid game are skipped.
  pub fn load(data_dir: &Path, search_paths: Vec<PathBuf>) -> DomainResult<Self> {
    let store_path = data_dir.join(STORE_FILE_NAME);
    let store: InstanceStore = match std::fs::read_to_string(&store_path) {
      Ok(content) => toml::from_str(&content).map_err(|e| DomainError::corrupt(&store_path, e))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => InstanceStore::default(),
      Err(e) => return Err(e.into()),
    };

    let mut instances = BTreeMap::new();
    for stored in store.instances {
      match GameInstance::open(stored.name.clone(), stored.game, stored.path) {
        Ok(instance) => {
          instances.insert(stored.name, instance);
        }
        Err(e) => warn!(instance = %stored.name, error = %e, "Skipping invalid instance"),
      }
    }

    let auto_start = store.auto_start.filter(|name| instances.contains_key(name));
    debug!(count = instances.len(), "Loaded game instances");

    Ok(Self {
      store_path,
      search_paths,
      instances,
      auto_start,
    })
  }

  pub fn instances(&self) -> &BTreeMap<String, GameInstance> {
    &self.instances
  }

  pub fn has_instance(&self, name: &str) -> bool {
    self.instances.contains_key(name)
  }

  pub fn get(&self, name: &str) -> Option<&GameInstance> {
    self.instances.get(name)
  }

  pub fn auto_start_instance(&self) -> Option<&str> {
    self.auto_start.as_deref()
  }

  /// Register game installs found in the configured (or default) locations.
  ///
  /// Returns how many new instances were registered.
  pub fn find_and_register_default_instances(&mut self) -> DomainResult<usize> {
    let mut found = 0;
    for game in Game::all() {
      let candidates = if self.search_paths.is_empty() {
        game.default_install_dirs()
      } else {
        self.search_paths.clone()
      };

      for dir in candidates {
        if !game.is_instance_dir(&dir) || self.instances.values().any(|i| i.dir == dir) {
          continue;
        }
        let name = self.unused_name("auto");
        let instance = GameInstance::open(name.clone(), *game, dir)?;
        info!(instance = %name, dir = %instance.dir.display(), "Registered detected game instance");
        self.instances.insert(name.clone(), instance);
        if self.auto_start.is_none() {
          self.auto_start = Some(name);
        }
        found += 1;
      }
    }

    if found > 0 {
      self.save()?;
    }
    Ok(found)
  }

  fn unused_name(&self, base: &str) -> String {
    if !self.has_instance(base) {
      return base.to_string();
    }
    (2..)
      .map(|n| format!("{base}{n}"))
      .find(|name| !self.has_instance(name))
      .unwrap_or_else(|| base.to_string())
  }

  pub fn add_instance(&mut self, dir: &Path, name: &str) -> DomainResult<&GameInstance> {
    if self.has_instance(name) {
      return Err(DomainError::InstanceNameTaken { name: name.to_string() });
    }
    let game = Game::all()
      .iter()
      .copied()
      .find(|g| g.is_instance_dir(dir))
      .ok_or_else(|| DomainError::not_an_instance(dir))?;

    let instance = GameInstance::open(name.to_string(), game, dir.to_path_buf())?;
    self.instances.insert(name.to_string(), instance);
    self.save()?;
    self.get(name).ok_or_else(|| DomainError::instance_not_found(name))
  }

  pub fn remove_instance(&mut self, name: &str) -> DomainResult<()> {
    if self.instances.remove(name).is_none() {
      return Err(DomainError::instance_not_found(name));
    }
    if self.auto_start.as_deref() == Some(name) {
      self.auto_start = None;
    }
    self.save()
  }

  pub fn rename_instance(&mut self, old_name: &str, new_name: &str) -> DomainResult<()> {
    if old_name == new_name {
      return if self.has_instance(old_name) {
        Ok(())
      } else {
        Err(DomainError::instance_not_found(old_name))
      };
    }
    if self.has_instance(new_name) {
      return Err(DomainError::InstanceNameTaken {
        name: new_name.to_string(),
      });
    }
    let mut instance = self
      .instances
      .remove(old_name)
      .ok_or_else(|| DomainError::instance_not_found(old_name))?;
    instance.name = new_name.to_string();
    self.instances.insert(new_name.to_string(), instance);
    if self.auto_start.as_deref() == Some(old_name) {
      self.auto_start = Some(new_name.to_string());
    }
    self.save()
  }

  pub fn set_auto_start(&mut self, name: &str) -> DomainResult<()> {
    let instance = self.get(name).ok_or_else(|| DomainError::instance_not_found(name))?;
    if !instance.game.is_instance_dir(&instance.dir) {
      return Err(DomainError::not_an_instance(&instance.dir));
    }
    self.auto_start = Some(name.to_string());
    self.save()
  }

  /// Create a minimal game directory and register it.
  pub fn fake_instance(
    &mut self,
    game: Game,
    name: &str,
    dir: &Path,
    version: GameVersion,
    dlcs: &[(Dlc, GameVersion)],
  ) -> DomainResult<()> {
    if self.has_instance(name) {
      return Err(DomainError::InstanceNameTaken { name: name.to_string() });
    }
    if !version.is_complete() {
      return Err(DomainError::BadGameVersion(version.to_string()));
    }
    for (dlc, _) in dlcs {
      let required = dlc.minimum_game_version();
      if !version.at_least(&required) {
        return Err(DomainError::WrongGameVersion {
          what: dlc.identifier().to_string(),
          required: required.to_string(),
          actual: version.to_string(),
        });
      }
    }
    ensure_empty_location(dir)?;

    game.write_fake_layout(dir, &version, dlcs)?;
    info!(instance = %name, dir = %dir.display(), version = %version, "Created fake instance");
    self.add_instance(dir, name).map(|_| ())
  }

  /// Copy an existing instance to `new_dir` and register the copy.
  ///
  /// With `share_stock_folders` the game's stock folders are symlinked
  /// instead of copied. The source's registry lock is never copied.
  pub fn clone_instance(
    &mut self,
    source: &str,
    new_name: &str,
    new_dir: &Path,
    share_stock_folders: bool,
  ) -> DomainResult<()> {
    let source = self.get(source).ok_or_else(|| DomainError::instance_not_found(source))?;
    if self.has_instance(new_name) {
      return Err(DomainError::InstanceNameTaken {
        name: new_name.to_string(),
      });
    }
    if !source.game.is_instance_dir(&source.dir) {
      return Err(DomainError::not_an_instance(&source.dir));
    }
    ensure_empty_location(new_dir)?;
    if resolve_missing(new_dir)?.starts_with(source.dir.canonicalize()?) {
      return Err(DomainError::BadInstallLocation {
        path: new_dir.to_path_buf(),
        reason: "the directory is inside the source instance".to_string(),
      });
    }

    let linked: Vec<PathBuf> = if share_stock_folders {
      source.game.stock_folders().iter().map(PathBuf::from).collect()
    } else {
      Vec::new()
    };
    let existed = new_dir.exists();
    if let Err(e) = copy_tree(&source.dir, new_dir, &linked) {
      discard_partial_copy(new_dir, existed);
      return Err(e);
    }
    info!(source = %source.name, instance = %new_name, dir = %new_dir.display(), "Cloned instance");

    self.add_instance(new_dir, new_name).map(|_| ())
  }

  pub fn set_compat_options(&mut self, name: &str, compat: CompatOptions) -> DomainResult<()> {
    let instance = self
      .instances
      .get_mut(name)
      .ok_or_else(|| DomainError::instance_not_found(name))?;
    instance.compat = CompatOptions {
      game_version_when_stored: instance.version,
      ..compat
    };
    instance.save_compat()
  }

  fn save(&self) -> DomainResult<()> {
    let store = InstanceStore {
      auto_start: self.auto_start.clone(),
      instances: self
        .instances
        .values()
        .map(|i| StoredInstance {
          name: i.name.clone(),
          game: i.game,
          path: i.dir.clone(),
        })
        .collect(),
    };
    let content = toml::to_string_pretty(&store).map_err(|e| DomainError::corrupt(&self.store_path, e))?;
    if let Some(parent) = self.store_path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&self.store_path, content)?;
    Ok(())
  }
}

/// Fail unless `dir` is missing or an empty directory.
fn ensure_empty_location(dir: &Path) -> DomainResult<()> {
  if !dir.exists() {
    return Ok(());
  }
  let empty = dir.is_dir() && std::fs::read_dir(dir)?.next().is_none();
  if empty {
    Ok(())
  } else {
    Err(DomainError::BadInstallLocation {
      path: dir.to_path_buf(),
      reason: "the directory exists and is not empty".to_string(),
    })
  }
}

/// Canonicalize a path that may not exist yet through its nearest existing ancestor.
fn resolve_missing(dir: &Path) -> std::io::Result<PathBuf> {
  let mut missing = Vec::new();
  let mut current = dir;
  loop {
    match current.canonicalize() {
      Ok(base) => return Ok(missing.iter().rev().fold(base, |acc, part| acc.join(part))),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        let (Some(parent), Some(name)) = (current.parent(), current.file_name()) else {
          return Err(e);
        };
        missing.push(name.to_os_string());
        current = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
      }
      Err(e) => return Err(e),
    }
  }
}

/// Remove what a failed clone left behind, keeping a directory the caller created.
fn discard_partial_copy(dir: &Path, existed: bool) {
  if let Err(e) = std::fs::remove_dir_all(dir) {
    warn!(dir = %dir.display(), error = %e, "Failed to remove partial clone");
    return;
  }
  if existed && let Err(e) = std::fs::create_dir(dir) {
    warn!(dir = %dir.display(), error = %e, "Failed to restore clone target directory");
  }
}

fn copy_tree(src: &Path, dst: &Path, linked: &[PathBuf]) -> DomainResult<()> {
  std::fs::create_dir_all(dst)?;
  let lock_file = Path::new("CKAN").join(LOCK_FILE_NAME);

  let mut walker = WalkDir::new(src).min_depth(1).into_iter();
  while let Some(entry) = walker.next() {
    let entry = entry.map_err(std::io::Error::from)?;
    let rel = entry.path().strip_prefix(src).map_err(std::io::Error::other)?;
    let target = dst.join(rel);

    if linked.iter().any(|l| l == rel) {
      if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
      }
      symlink_dir(entry.path(), &target)?;
      if entry.file_type().is_dir() {
        walker.skip_current_dir();
      }
      continue;
    }

    if entry.file_type().is_dir() {
      std::fs::create_dir_all(&target)?;
    } else if rel != lock_file {
      std::fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

#[cfg(unix)]
fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_dir(original, link)
}
