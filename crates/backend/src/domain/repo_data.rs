//! Module metadata for every known repository, cached on disk.
//!
//! A repository URL serves a JSON [`RepositoryDocument`]. Each fetched document
//! is cached as `<cache>/repos/<sha256(url)>.json` and loaded into memory on
//! prepopulate, so later calls don't touch the network.

use std::{
  collections::{BTreeMap, HashMap},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{
  downloader::Downloader,
  error::{DomainError, DomainResult},
  game::GameVersion,
  module::{Module, StabilityTolerance},
  registry::Repository,
};

/// What a repository URL serves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryDocument {
  #[serde(default)]
  pub modules: Vec<Module>,
  #[serde(default)]
  pub download_counts: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedRepository {
  fetched_at: DateTime<Utc>,
  #[serde(flatten)]
  document: RepositoryDocument,
}

/// Outcome of refreshing one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
  Updated,
  Unchanged,
}

// ============================================================================
// Module index
// ============================================================================

/// Every release of every module across a set of repositories.
#[derive(Debug, Default)]
pub struct ModuleIndex<'a> {
  /// Newest release first
  by_identifier: BTreeMap<&'a str, Vec<&'a Module>>,
}

impl<'a> ModuleIndex<'a> {
  pub(crate) fn from_releases(mut by_identifier: BTreeMap<&'a str, Vec<&'a Module>>) -> Self {
    for releases in by_identifier.values_mut() {
      releases.sort_by(|a, b| b.version.cmp(&a.version));
    }
    Self { by_identifier }
  }

  pub fn len(&self) -> usize {
    self.by_identifier.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_identifier.is_empty()
  }

  pub fn identifiers(&self) -> impl Iterator<Item = &'a str> + '_ {
    self.by_identifier.keys().copied()
  }

  pub fn releases(&self, identifier: &str) -> &[&'a Module] {
    self.by_identifier.get(identifier).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn latest(&self, identifier: &str) -> Option<&'a Module> {
    self.releases(identifier).first().copied()
  }

  /// Releases compatible with `criteria` and accepted by `stability`, newest first.
  pub fn compatible_releases(
    &self,
    identifier: &str,
    criteria: &[GameVersion],
    stability: &StabilityTolerance,
  ) -> Vec<&'a Module> {
    self
      .releases(identifier)
      .iter()
      .copied()
      .filter(|m| m.is_compatible(criteria) && stability.accepts(m))
      .collect()
  }

  pub fn latest_compatible(
    &self,
    identifier: &str,
    criteria: &[GameVersion],
    stability: &StabilityTolerance,
  ) -> Option<&'a Module> {
    self.compatible_releases(identifier, criteria, stability).into_iter().next()
  }

  /// Latest compatible release of every module named `name` or providing it.
  pub fn providers(&self, name: &str, criteria: &[GameVersion], stability: &StabilityTolerance) -> Vec<&'a Module> {
    self
      .by_identifier
      .keys()
      .filter_map(|id| self.latest_compatible(id, criteria, stability))
      .filter(|m| m.identifier == name || m.provides.iter().any(|p| p == name))
      .collect()
  }

  /// Latest release of every module, ordered by identifier.
  pub fn latest_of_each(&self) -> Vec<&'a Module> {
    self.by_identifier.values().filter_map(|r| r.first().copied()).collect()
  }
}

// ============================================================================
// Repository data manager
// ============================================================================

#[derive(Debug)]
pub struct RepositoryDataManager {
  cache_dir: PathBuf,
  loaded: HashMap<String, CachedRepository>,
}

impl RepositoryDataManager {
  pub fn new(cache_dir: &Path) -> Self {
    Self {
      cache_dir: cache_dir.join("repos"),
      loaded: HashMap::new(),
    }
  }

  fn cache_path(&self, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    self.cache_dir.join(format!("{}.json", hex::encode(digest)))
  }

  pub fn is_loaded(&self, repo: &Repository) -> bool {
    self.loaded.contains_key(&repo.url)
  }

  /// Load the cached copy of `repo` into memory, if there is one.
  ///
  /// Returns whether the repository is now available.
  pub fn load_cached(&mut self, repo: &Repository) -> DomainResult<bool> {
    if self.is_loaded(repo) {
      return Ok(true);
    }
    let path = self.cache_path(&repo.url);
    let content = match std::fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(repo = %repo.name, "No cached repository data");
        return Ok(false);
      }
      Err(e) => return Err(e.into()),
    };
    let cached: CachedRepository = serde_json::from_str(&content).map_err(|e| DomainError::corrupt(&path, e))?;
    debug!(repo = %repo.name, modules = cached.document.modules.len(), "Loaded cached repository");
    self.loaded.insert(repo.url.clone(), cached);
    Ok(true)
  }

  /// Fetch `repo` and rewrite its cache. Without `force`, a repository that
  /// is already cached is left alone.
  pub async fn refresh(&mut self, repo: &Repository, downloader: &dyn Downloader, force: bool) -> DomainResult<RefreshOutcome> {
    if !force && self.load_cached(repo)? {
      return Ok(RefreshOutcome::Unchanged);
    }

    let bytes = downloader.fetch_repository(repo).await?;
    let document: RepositoryDocument = serde_json::from_slice(&bytes).map_err(|e| DomainError::Download {
      url: repo.url.clone(),
      reason: format!("invalid repository document: {e}"),
    })?;
    let cached = CachedRepository {
      fetched_at: Utc::now(),
      document,
    };

    let path = self.cache_path(&repo.url);
    std::fs::create_dir_all(&self.cache_dir)?;
    let json = serde_json::to_string(&cached).map_err(|e| DomainError::corrupt(&path, e))?;
    std::fs::write(&path, json)?;

    info!(repo = %repo.name, modules = cached.document.modules.len(), "Repository updated");
    self.loaded.insert(repo.url.clone(), cached);
    Ok(RefreshOutcome::Updated)
  }

  /// Merge the loaded modules of `repos`. On duplicate releases the
  /// repository listed first wins.
  pub fn available_modules(&self, repos: &[Repository]) -> ModuleIndex<'_> {
    let mut by_identifier: BTreeMap<&str, Vec<&Module>> = BTreeMap::new();
    for repo in repos {
      let Some(cached) = self.loaded.get(&repo.url) else {
        continue;
      };
      for module in &cached.document.modules {
        let releases = by_identifier.entry(module.identifier.as_str()).or_default();
        if !releases.iter().any(|m| m.version == module.version) {
          releases.push(module);
        }
      }
    }
    ModuleIndex::from_releases(by_identifier)
  }

  pub fn download_count(&self, repos: &[Repository], identifier: &str) -> Option<u64> {
    repos
      .iter()
      .filter_map(|r| self.loaded.get(&r.url))
      .find_map(|c| c.document.download_counts.get(identifier).copied())
  }
}
