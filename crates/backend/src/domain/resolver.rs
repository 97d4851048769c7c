//! Turns a set of install/remove requests into a consistent install plan.
//!
//! This is a greedy resolver: every requested module gets its newest
//! compatible release, and dependencies are pulled in breadth first. When a
//! dependency can be satisfied by several modules and the caller hasn't
//! picked one, resolution stops with [`DomainError::TooManyProviders`] so the
//! caller can ask the user and try again.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::debug;

use super::{
  error::{DomainError, DomainResult},
  game::GameVersion,
  module::{Module, ModuleVersion, Relationship, StabilityTolerance},
  registry::Registry,
  repo_data::ModuleIndex,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
  pub identifier: String,
  /// Pin a release; `None` takes the newest compatible one
  pub version: Option<ModuleVersion>,
}

#[derive(Debug, Clone, Default)]
pub struct InstallPlan {
  /// Modules to install or upgrade, in dependency-discovery order
  pub install: Vec<Module>,
  /// Identifiers to uninstall
  pub remove: Vec<String>,
  /// Identifiers in `install` that were pulled in as dependencies
  pub auto_installed: BTreeSet<String>,
}

impl InstallPlan {
  pub fn is_empty(&self) -> bool {
    self.install.is_empty() && self.remove.is_empty()
  }

  pub fn download_size(&self) -> u64 {
    self.install.iter().map(|m| m.download_size).sum()
  }
}

#[derive(Debug, Default)]
pub struct OptionalDependencies<'a> {
  pub recommended: Vec<&'a Module>,
  pub suggested: Vec<&'a Module>,
  /// Modules whose `supports` names one of the given modules
  pub supporters: Vec<&'a Module>,
}

pub struct Resolver<'r, 'a> {
  registry: &'r Registry,
  index: &'r ModuleIndex<'a>,
  criteria: &'r [GameVersion],
  stability: &'r StabilityTolerance,
  /// Requested name to the identifier the user picked for it
  choices: &'r HashMap<String, String>,
}

impl<'r, 'a> Resolver<'r, 'a> {
  pub fn new(
    registry: &'r Registry,
    index: &'r ModuleIndex<'a>,
    criteria: &'r [GameVersion],
    stability: &'r StabilityTolerance,
    choices: &'r HashMap<String, String>,
  ) -> Self {
    Self {
      registry,
      index,
      criteria,
      stability,
      choices,
    }
  }

  pub fn resolve(&self, install: &[ModuleRequest], remove: &[String]) -> DomainResult<InstallPlan> {
    for identifier in remove {
      if self.registry.installed_module(identifier).is_none() {
        return Err(DomainError::module_not_found(identifier, None));
      }
    }

    let mut selected: BTreeMap<&str, &'a Module> = BTreeMap::new();
    let mut order: Vec<&'a Module> = Vec::new();
    let mut auto_installed = BTreeSet::new();
    let mut pending: VecDeque<&'a Relationship> = VecDeque::new();
    let mut problems = Vec::new();

    for request in install {
      let module = self.pick_requested(request)?;
      if let Some(existing) = selected.get(module.identifier.as_str()) {
        if existing.version != module.version {
          problems.push(format!("{} and {} were both requested", existing.key(), module.key()));
        }
        continue;
      }
      selected.insert(module.identifier.as_str(), module);
      order.push(module);
      pending.extend(module.depends.iter());
    }

    while let Some(relationship) = pending.pop_front() {
      let removed = relationship.names().iter().any(|n| remove.iter().any(|r| r == n));
      if (!removed && self.registry.satisfies(relationship)) || selected.values().any(|m| relationship.matches(m)) {
        continue;
      }

      let module = self.pick_dependency(relationship)?;
      if let Some(existing) = selected.get(module.identifier.as_str()) {
        problems.push(format!(
          "{} is selected but a dependency needs {}",
          existing.key(),
          module.key()
        ));
        continue;
      }
      debug!(module = %module.key(), "Adding dependency");
      selected.insert(module.identifier.as_str(), module);
      auto_installed.insert(module.identifier.clone());
      order.push(module);
      pending.extend(module.depends.iter());
    }

    problems.extend(self.conflicts(&order, remove));
    problems.extend(self.broken_by_removal(&order, remove));
    if !problems.is_empty() {
      return Err(DomainError::Inconsistent { problems });
    }

    let install = order
      .into_iter()
      .filter(|m| self.registry.installed_version(&m.identifier).as_ref() != Some(&m.version))
      .cloned()
      .collect();

    Ok(InstallPlan {
      install,
      remove: remove.to_vec(),
      auto_installed,
    })
  }

  fn pick_requested(&self, request: &ModuleRequest) -> DomainResult<&'a Module> {
    let found = match &request.version {
      Some(version) => self
        .index
        .releases(&request.identifier)
        .iter()
        .copied()
        .find(|m| &m.version == version),
      None => self
        .index
        .latest_compatible(&request.identifier, self.criteria, self.stability),
    };
    match found {
      Some(module) => Ok(module),
      // Virtual identifier, or a module only reachable through `provides`
      None if request.version.is_none() => self.pick_dependency(&Relationship::direct(&request.identifier)),
      None => Err(DomainError::module_not_found(
        &request.identifier,
        request.version.as_ref().map(ToString::to_string),
      )),
    }
  }

  fn pick_dependency(&self, relationship: &Relationship) -> DomainResult<&'a Module> {
    let requested = requested_name(relationship);
    let mut candidates: Vec<&'a Module> = Vec::new();
    for name in relationship.names() {
      let releases = self.index.compatible_releases(name, self.criteria, self.stability);
      if let Some(exact) = releases.into_iter().find(|m| relationship.matches(m)) {
        // A module with the exact identifier beats anything providing it
        if let Relationship::Direct { .. } = relationship {
          return Ok(exact);
        }
        candidates.push(exact);
      }
      for provider in self.index.providers(name, self.criteria, self.stability) {
        if provider.identifier != name && !candidates.iter().any(|c| c.identifier == provider.identifier) {
          candidates.push(provider);
        }
      }
    }

    match candidates.len() {
      0 => Err(DomainError::module_not_found(requested, None)),
      1 => Ok(candidates[0]),
      _ => {
        if let Some(choice) = self.choices.get(&requested)
          && let Some(chosen) = candidates.iter().find(|c| &c.identifier == choice)
        {
          return Ok(*chosen);
        }
        Err(DomainError::TooManyProviders {
          requested,
          candidates: candidates.iter().map(|c| c.identifier.clone()).collect(),
        })
      }
    }
  }

  fn conflicts(&self, order: &[&'a Module], remove: &[String]) -> Vec<String> {
    let kept_installed: Vec<&Module> = self
      .registry
      .installed()
      .map(|i| &i.module)
      .filter(|m| !remove.contains(&m.identifier) && !order.iter().any(|o| o.identifier == m.identifier))
      .collect();
    let everything: Vec<&Module> = order.iter().copied().chain(kept_installed.iter().copied()).collect();

    let mut problems = Vec::new();
    for module in order {
      for conflict in &module.conflicts {
        for other in &everything {
          if other.identifier != module.identifier && conflict.matches(other) {
            problems.push(format!("{} conflicts with {}", module.key(), other.key()));
          }
        }
      }
    }
    for installed in &kept_installed {
      for conflict in &installed.conflicts {
        for module in order {
          if conflict.matches(module) {
            problems.push(format!("{} conflicts with {}", installed.key(), module.key()));
          }
        }
      }
    }
    problems
  }

  /// Installed modules whose dependencies would no longer be met.
  fn broken_by_removal(&self, order: &[&'a Module], remove: &[String]) -> Vec<String> {
    if remove.is_empty() {
      return Vec::new();
    }
    let remaining: Vec<&Module> = self
      .registry
      .installed()
      .map(|i| &i.module)
      .filter(|m| !remove.contains(&m.identifier))
      .chain(order.iter().copied())
      .collect();

    let mut problems = Vec::new();
    for module in self.registry.installed().map(|i| &i.module) {
      if remove.contains(&module.identifier) {
        continue;
      }
      for dependency in &module.depends {
        let removed = dependency.names().iter().any(|n| remove.iter().any(|r| r == n));
        if removed && !remaining.iter().any(|m| dependency.matches(m)) {
          problems.push(format!(
            "{} depends on {}, which would be removed",
            module.key(),
            requested_name(dependency)
          ));
        }
      }
    }
    problems
  }

  /// Recommendations, suggestions and supporters of `modules` that aren't installed.
  pub fn optional_dependencies(&self, modules: &[&Module]) -> OptionalDependencies<'a> {
    let excluded = |id: &str| self.registry.is_installed(id) || modules.iter().any(|m| m.identifier == id);
    let mut seen: BTreeSet<&'a str> = BTreeSet::new();
    let mut result = OptionalDependencies::default();

    for relationship in modules.iter().flat_map(|m| m.recommends.iter()) {
      self.collect_optional(relationship, &excluded, &mut seen, &mut result.recommended);
    }
    for relationship in modules.iter().flat_map(|m| m.suggests.iter()) {
      self.collect_optional(relationship, &excluded, &mut seen, &mut result.suggested);
    }

    for candidate in self.index.identifiers() {
      let Some(supporter) = self.index.latest_compatible(candidate, self.criteria, self.stability) else {
        continue;
      };
      if excluded(&supporter.identifier) || seen.contains(supporter.identifier.as_str()) {
        continue;
      }
      if supporter.supports.iter().any(|s| modules.iter().any(|m| s.matches(m))) {
        seen.insert(supporter.identifier.as_str());
        result.supporters.push(supporter);
      }
    }

    result
  }

  fn collect_optional(
    &self,
    relationship: &Relationship,
    excluded: &dyn Fn(&str) -> bool,
    seen: &mut BTreeSet<&'a str>,
    out: &mut Vec<&'a Module>,
  ) {
    if self.registry.satisfies(relationship) {
      return;
    }
    for name in relationship.names() {
      for module in self.index.providers(name, self.criteria, self.stability) {
        if !excluded(&module.identifier) && seen.insert(module.identifier.as_str()) {
          out.push(module);
        }
      }
    }
  }
}

fn requested_name(relationship: &Relationship) -> String {
  relationship.names().join(" | ")
}
