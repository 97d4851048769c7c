//! Module metadata as published by repositories.

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::game::GameVersion;

// ============================================================================
// Module versions
// ============================================================================

/// A module version string with CKAN ordering: an optional `epoch:` prefix,
/// then alternating non-numeric and numeric runs compared piecewise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleVersion(String);

impl ModuleVersion {
  pub fn new(version: impl Into<String>) -> Self {
    Self(version.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  fn split_epoch(&self) -> (u64, &str) {
    match self.0.split_once(':') {
      Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
        (epoch.parse().unwrap_or(0), rest)
      }
      _ => (0, self.0.as_str()),
    }
  }
}

impl fmt::Display for ModuleVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ModuleVersion {
  fn from(s: &str) -> Self {
    Self::new(s)
  }
}

impl PartialOrd for ModuleVersion {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for ModuleVersion {
  fn cmp(&self, other: &Self) -> Ordering {
    let (epoch_a, rest_a) = self.split_epoch();
    let (epoch_b, rest_b) = other.split_epoch();
    epoch_a
      .cmp(&epoch_b)
      .then_with(|| compare_version_strings(rest_a, rest_b))
      .then_with(|| self.0.cmp(&other.0))
  }
}

fn compare_version_strings(mut a: &str, mut b: &str) -> Ordering {
  loop {
    if a.is_empty() || b.is_empty() {
      return a.len().cmp(&b.len());
    }

    let (text_a, rest_a) = take_while(a, |c| !c.is_ascii_digit());
    let (text_b, rest_b) = take_while(b, |c| !c.is_ascii_digit());
    match compare_text(text_a, text_b) {
      Ordering::Equal => {}
      other => return other,
    }

    let (num_a, rest_a) = take_while(rest_a, |c| c.is_ascii_digit());
    let (num_b, rest_b) = take_while(rest_b, |c| c.is_ascii_digit());
    let num_a = num_a.trim_start_matches('0');
    let num_b = num_b.trim_start_matches('0');
    match num_a.len().cmp(&num_b.len()).then_with(|| num_a.cmp(num_b)) {
      Ordering::Equal => {}
      other => return other,
    }

    a = rest_a;
    b = rest_b;
  }
}

/// Text runs: a `.` sorts before everything else so `1.0` < `1-beta`.
fn compare_text(a: &str, b: &str) -> Ordering {
  match (a, b) {
    (a, b) if a == b => Ordering::Equal,
    (".", _) => Ordering::Less,
    (_, ".") => Ordering::Greater,
    _ => a.cmp(b),
  }
}

fn take_while(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
  let end = s.char_indices().find(|(_, c)| !pred(*c)).map(|(i, _)| i).unwrap_or(s.len());
  s.split_at(end)
}

// ============================================================================
// Relationships
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Relationship {
  AnyOf {
    any_of: Vec<Relationship>,
    choice_help_text: Option<String>,
  },
  Direct {
    name: String,
    version: Option<ModuleVersion>,
    min_version: Option<ModuleVersion>,
    max_version: Option<ModuleVersion>,
  },
}

impl Relationship {
  pub fn direct(name: impl Into<String>) -> Self {
    Self::Direct {
      name: name.into(),
      version: None,
      min_version: None,
      max_version: None,
    }
  }

  /// Every identifier this relationship can be satisfied by, by name.
  pub fn names(&self) -> Vec<&str> {
    match self {
      Relationship::Direct { name, .. } => vec![name.as_str()],
      Relationship::AnyOf { any_of, .. } => any_of.iter().flat_map(|r| r.names()).collect(),
    }
  }

  /// Whether `module` satisfies a direct relationship, directly or via `provides`.
  pub fn matches(&self, module: &Module) -> bool {
    match self {
      Relationship::Direct {
        name,
        version,
        min_version,
        max_version,
      } => {
        if module.provides.iter().any(|p| p == name) {
          return true;
        }
        if &module.identifier != name {
          return false;
        }
        version.as_ref().is_none_or(|v| &module.version == v)
          && min_version.as_ref().is_none_or(|v| &module.version >= v)
          && max_version.as_ref().is_none_or(|v| &module.version <= v)
      }
      Relationship::AnyOf { any_of, .. } => any_of.iter().any(|r| r.matches(module)),
    }
  }
}

// ============================================================================
// Module
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
  #[default]
  Stable,
  Testing,
  Development,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
  #[default]
  Package,
  Metapackage,
  Dlc,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
  pub homepage: Option<String>,
  pub spacedock: Option<String>,
  pub repository: Option<String>,
  pub bugtracker: Option<String>,
  pub license: Option<String>,
  pub manual: Option<String>,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
  pub identifier: String,
  pub name: String,
  #[serde(rename = "abstract", default)]
  pub summary: String,
  pub description: Option<String>,
  pub version: ModuleVersion,
  #[serde(default)]
  pub kind: ModuleKind,
  #[serde(default)]
  pub authors: Vec<String>,
  #[serde(default)]
  pub licenses: Vec<String>,
  #[serde(default)]
  pub depends: Vec<Relationship>,
  #[serde(default)]
  pub recommends: Vec<Relationship>,
  #[serde(default)]
  pub suggests: Vec<Relationship>,
  #[serde(default)]
  pub supports: Vec<Relationship>,
  #[serde(default)]
  pub conflicts: Vec<Relationship>,
  #[serde(default)]
  pub provides: Vec<String>,
  pub ksp_version: Option<GameVersion>,
  pub ksp_version_min: Option<GameVersion>,
  pub ksp_version_max: Option<GameVersion>,
  #[serde(default)]
  pub release_status: ReleaseStatus,
  pub download: Option<String>,
  #[serde(default)]
  pub download_size: u64,
  #[serde(default)]
  pub install_size: u64,
  #[serde(default)]
  pub tags: Vec<String>,
  pub resources: Option<Resources>,
  pub release_date: Option<DateTime<Utc>>,
}

impl Module {
  /// Minimal module used by the faker, tests and metapackages.
  pub fn new(identifier: impl Into<String>, version: impl Into<ModuleVersion>) -> Self {
    let identifier = identifier.into();
    Self {
      name: identifier.clone(),
      identifier,
      summary: String::new(),
      description: None,
      version: version.into(),
      kind: ModuleKind::Package,
      authors: Vec::new(),
      licenses: Vec::new(),
      depends: Vec::new(),
      recommends: Vec::new(),
      suggests: Vec::new(),
      supports: Vec::new(),
      conflicts: Vec::new(),
      provides: Vec::new(),
      ksp_version: None,
      ksp_version_min: None,
      ksp_version_max: None,
      release_status: ReleaseStatus::Stable,
      download: None,
      download_size: 0,
      install_size: 0,
      tags: Vec::new(),
      resources: None,
      release_date: None,
    }
  }

  /// Compatible with any of the versions in `criteria`.
  pub fn is_compatible(&self, criteria: &[GameVersion]) -> bool {
    criteria.iter().any(|game| match &self.ksp_version {
      Some(exact) => exact.contains(game),
      None => game.within(self.ksp_version_min.as_ref(), self.ksp_version_max.as_ref()),
    })
  }

  pub fn key(&self) -> String {
    format!("{}={}", self.identifier, self.version)
  }
}

/// Stability settings of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityTolerance {
  pub overall: ReleaseStatus,
  pub overrides: BTreeMap<String, ReleaseStatus>,
}

impl StabilityTolerance {
  pub fn for_module(&self, identifier: &str) -> ReleaseStatus {
    self.overrides.get(identifier).copied().unwrap_or(self.overall)
  }

  pub fn accepts(&self, module: &Module) -> bool {
    module.release_status <= self.for_module(&module.identifier)
  }
}
