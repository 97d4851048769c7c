//! Supported games, game versions and DLC detection.

use std::{
  cmp::Ordering,
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use serde::{Deserialize, Serialize};

use super::error::{DomainError, DomainResult};

// ============================================================================
// Game versions
// ============================================================================

/// A game version where every component past the first undefined one is
/// also undefined (`1.12` is valid, `1.?.5` is not).
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameVersion {
  pub major: Option<u32>,
  pub minor: Option<u32>,
  pub patch: Option<u32>,
  pub build: Option<u32>,
}

impl GameVersion {
  pub fn new(major: u32, minor: u32, patch: u32) -> Self {
    Self {
      major: Some(major),
      minor: Some(minor),
      patch: Some(patch),
      build: None,
    }
  }

  pub fn with_build(mut self, build: u32) -> Self {
    self.build = Some(build);
    self
  }

  /// Major, minor and patch are all known.
  pub fn is_complete(&self) -> bool {
    self.major.is_some() && self.minor.is_some() && self.patch.is_some()
  }

  pub fn is_any(&self) -> bool {
    self.major.is_none()
  }

  fn components(&self) -> [Option<u32>; 4] {
    [self.major, self.minor, self.patch, self.build]
  }

  /// True when every component defined on `self` matches `other`.
  ///
  /// `1.12` contains `1.12.5`, and the undefined version contains everything.
  pub fn contains(&self, other: &GameVersion) -> bool {
    self
      .components()
      .iter()
      .zip(other.components().iter())
      .all(|(mine, theirs)| match (mine, theirs) {
        (None, _) => true,
        (Some(a), Some(b)) => a == b,
        (Some(_), None) => false,
      })
  }

  /// Compare on the components both versions define.
  fn cmp_defined(&self, other: &GameVersion) -> Ordering {
    for (a, b) in self.components().iter().zip(other.components().iter()) {
      match (a, b) {
        (Some(a), Some(b)) if a != b => return a.cmp(b),
        (Some(_), Some(_)) => continue,
        _ => break,
      }
    }
    Ordering::Equal
  }

  /// `self` falls inside the inclusive `[min, max]` range; missing bounds are open.
  pub fn within(&self, min: Option<&GameVersion>, max: Option<&GameVersion>) -> bool {
    let above_min = min.is_none_or(|min| self.cmp_defined(min) != Ordering::Less);
    let below_max = max.is_none_or(|max| self.cmp_defined(max) != Ordering::Greater);
    above_min && below_max
  }

  pub fn at_least(&self, required: &GameVersion) -> bool {
    self.cmp_defined(required) != Ordering::Less
  }
}

impl fmt::Display for GameVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_any() {
      return write!(f, "any");
    }
    let parts: Vec<String> = self.components().iter().map_while(|c| c.map(|c| c.to_string())).collect();
    write!(f, "{}", parts.join("."))
  }
}

impl FromStr for GameVersion {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("any") {
      return Ok(Self::default());
    }

    let parts = s
      .split('.')
      .map(|p| p.parse::<u32>())
      .collect::<Result<Vec<_>, _>>()
      .map_err(|_| DomainError::BadGameVersion(s.to_string()))?;
    if parts.len() > 4 {
      return Err(DomainError::BadGameVersion(s.to_string()));
    }

    Ok(Self {
      major: parts.first().copied(),
      minor: parts.get(1).copied(),
      patch: parts.get(2).copied(),
      build: parts.get(3).copied(),
    })
  }
}

// ============================================================================
// DLC
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dlc {
  MakingHistory,
  BreakingGround,
}

impl Dlc {
  pub fn identifier(&self) -> &'static str {
    match self {
      Dlc::MakingHistory => "MakingHistory-DLC",
      Dlc::BreakingGround => "BreakingGround-DLC",
    }
  }

  fn directory(&self) -> &'static str {
    match self {
      Dlc::MakingHistory => "MakingHistory",
      Dlc::BreakingGround => "Serenity",
    }
  }

  /// Oldest game release that shipped this DLC.
  pub fn minimum_game_version(&self) -> GameVersion {
    match self {
      Dlc::MakingHistory => GameVersion::new(1, 4, 1),
      Dlc::BreakingGround => GameVersion::new(1, 7, 1),
    }
  }

  pub fn install_dir(&self, game_dir: &Path) -> PathBuf {
    game_dir.join("GameData").join("SquadExpansion").join(self.directory())
  }
}

// ============================================================================
// Games
// ============================================================================

/// A game CKAN knows how to manage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Game {
  #[default]
  #[serde(rename = "KSP")]
  KerbalSpaceProgram,
}

impl Game {
  pub fn all() -> &'static [Game] {
    &[Game::KerbalSpaceProgram]
  }

  pub fn short_name(&self) -> &'static str {
    match self {
      Game::KerbalSpaceProgram => "KSP",
    }
  }

  pub fn by_short_name(name: &str) -> Option<Game> {
    Self::all().iter().copied().find(|g| g.short_name().eq_ignore_ascii_case(name))
  }

  /// Folders shipped with the game that a clone may share via symlinks.
  pub fn stock_folders(&self) -> &'static [&'static str] {
    match self {
      Game::KerbalSpaceProgram => &["GameData/Squad", "GameData/SquadExpansion"],
    }
  }

  pub fn is_instance_dir(&self, dir: &Path) -> bool {
    match self {
      Game::KerbalSpaceProgram => {
        dir.join("GameData").is_dir()
          && ["buildID.txt", "buildID64.txt", "readme.txt"]
            .iter()
            .any(|f| dir.join(f).is_file())
      }
    }
  }

  /// Read the installed version from the files the game ships.
  pub fn detect_version(&self, dir: &Path) -> Option<GameVersion> {
    let readme = std::fs::read_to_string(dir.join("readme.txt")).ok();
    let mut version = readme.as_deref().and_then(parse_readme_version)?;

    let build = ["buildID64.txt", "buildID.txt"]
      .iter()
      .filter_map(|f| std::fs::read_to_string(dir.join(f)).ok())
      .find_map(|content| parse_build_id(&content));
    version.build = build;
    Some(version)
  }

  /// Detect installed DLCs and their versions.
  pub fn detect_dlcs(&self, dir: &Path) -> Vec<(Dlc, Option<GameVersion>)> {
    [Dlc::MakingHistory, Dlc::BreakingGround]
      .into_iter()
      .filter_map(|dlc| {
        let dlc_dir = dlc.install_dir(dir);
        if !dlc_dir.is_dir() {
          return None;
        }
        let version = std::fs::read_to_string(dlc_dir.join("readme.txt"))
          .ok()
          .as_deref()
          .and_then(parse_readme_version);
        Some((dlc, version))
      })
      .collect()
  }

  /// Default install locations checked when no instance is registered.
  pub fn default_install_dirs(&self) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let steam_suffix = Path::new("steamapps").join("common").join("Kerbal Space Program");
    if let Some(home) = dirs::home_dir() {
      dirs.push(home.join(".local/share/Steam").join(&steam_suffix));
      dirs.push(home.join(".steam/steam").join(&steam_suffix));
      dirs.push(home.join("Library/Application Support/Steam").join(&steam_suffix));
    }
    dirs.push(PathBuf::from("C:\\Program Files (x86)\\Steam").join(&steam_suffix));
    dirs
  }

  /// Write the smallest directory tree `is_instance_dir` accepts.
  pub fn write_fake_layout(
    &self,
    dir: &Path,
    version: &GameVersion,
    dlcs: &[(Dlc, GameVersion)],
  ) -> DomainResult<()> {
    match self {
      Game::KerbalSpaceProgram => {
        std::fs::create_dir_all(dir.join("GameData").join("Squad"))?;
        std::fs::create_dir_all(dir.join("Ships").join("VAB"))?;
        std::fs::create_dir_all(dir.join("Ships").join("SPH"))?;
        std::fs::write(
          dir.join("readme.txt"),
          format!("Kerbal Space Program\n\nVersion {}\n", short_version(version)),
        )?;
        std::fs::write(
          dir.join("buildID.txt"),
          format!("build id = {:05}\n", version.build.unwrap_or_default()),
        )?;
        for (dlc, dlc_version) in dlcs {
          let dlc_dir = dlc.install_dir(dir);
          std::fs::create_dir_all(&dlc_dir)?;
          std::fs::write(
            dlc_dir.join("readme.txt"),
            format!("Version {}\n", short_version(dlc_version)),
          )?;
        }
        Ok(())
      }
    }
  }
}

fn short_version(version: &GameVersion) -> String {
  GameVersion {
    build: None,
    ..*version
  }
  .to_string()
}

fn parse_readme_version(content: &str) -> Option<GameVersion> {
  content.lines().find_map(|line| {
    let rest = line.trim().strip_prefix("Version")?;
    rest.trim().parse().ok().filter(|v: &GameVersion| !v.is_any())
  })
}

fn parse_build_id(content: &str) -> Option<u32> {
  content.lines().find_map(|line| {
    let (key, value) = line.split_once('=')?;
    if key.trim().eq_ignore_ascii_case("build id") {
      value.trim().parse().ok()
    } else {
      None
    }
  })
}
