//! Terminal output for daemon replies

use anyhow::{Result, bail};
use ckanserver::ipc::{
  ActionReply,
  instance::{InstanceInfo, InstanceOperationResult},
  registry::{InstallPlanPrompt, ModuleState, ModuleSummary, RegistryOperationResult},
  system::ProgressReply,
};

pub fn print_progress(progress: &ProgressReply) {
  match &progress.message {
    Some(message) => eprintln!("[{:>3}%] {}", progress.percent, message),
    None => eprintln!("[{:>3}%]", progress.percent),
  }
}

/// Turn an instance operation reply into its details, or an error for a failed result.
pub fn instance_outcome(reply: ActionReply) -> Result<Option<String>> {
  match reply {
    ActionReply::InstanceOperation(op) if op.result == InstanceOperationResult::Success => Ok(op.details),
    ActionReply::InstanceOperation(op) => bail!(
      "{:?}: {}",
      op.result,
      op.details.unwrap_or_else(|| "no details".to_string())
    ),
    other => bail!("Unexpected reply from daemon: {other:?}"),
  }
}

/// Turn a registry operation reply into its details, or an error for a failed result.
pub fn registry_outcome(reply: ActionReply) -> Result<Option<String>> {
  match reply {
    ActionReply::RegistryOperation(op) if op.result == RegistryOperationResult::Success => Ok(op.details),
    ActionReply::RegistryOperation(op) if op.result == RegistryOperationResult::RegistryInUse => bail!(
      "{}\nIf no other program is using this instance, retry with --force-lock",
      op.details.unwrap_or_else(|| "Registry is in use".to_string())
    ),
    ActionReply::RegistryOperation(op) => bail!(
      "{:?}: {}",
      op.result,
      op.details.unwrap_or_else(|| "no details".to_string())
    ),
    // Lookups of unknown instances come back as instance errors
    ActionReply::InstanceOperation(_) => instance_outcome(reply),
    other => bail!("Unexpected reply from daemon: {other:?}"),
  }
}

pub fn print_instances(instances: &[InstanceInfo]) {
  if instances.is_empty() {
    println!("No instances registered.");
    println!("Add one with: ckanserver instance add <name> <path>");
    return;
  }

  let name_width = instances.iter().map(|i| i.name.len()).max().unwrap_or(0);
  for instance in instances {
    let marker = if instance.is_default { "*" } else { " " };
    println!(
      "{} {:<width$}  {:<4} {:<10} {}",
      marker,
      instance.name,
      instance.game,
      instance.version.as_deref().unwrap_or("unknown"),
      instance.path.display(),
      width = name_width
    );
  }
}

pub fn print_modules(modules: &[ModuleSummary]) {
  if modules.is_empty() {
    println!("No compatible modules. Try `ckanserver registry refresh <instance>` first.");
    return;
  }

  let id_width = modules.iter().map(|m| m.identifier.len()).max().unwrap_or(0);
  for module in modules {
    let downloads = module.download_count.map(|c| format!("{c} downloads")).unwrap_or_default();
    println!(
      "{:<width$}  {:<12} {}  {}",
      module.identifier,
      module.version,
      module.summary,
      downloads,
      width = id_width
    );
  }
  println!("\n{} modules", modules.len());
}

pub fn print_states(states: &[ModuleState]) {
  let installed: Vec<&ModuleState> = states.iter().filter(|s| s.installed_version.is_some()).collect();
  if installed.is_empty() {
    println!("No modules installed.");
    return;
  }

  let id_width = installed.iter().map(|s| s.identifier.len()).max().unwrap_or(0);
  for state in installed {
    let version = state.installed_version.as_deref().unwrap_or_default();
    let mut notes = Vec::new();
    if state.upgradeable
      && let Some(latest) = &state.latest_compatible_version
    {
      notes.push(format!("upgrade to {latest}"));
    }
    if state.auto_installed {
      notes.push("auto".to_string());
    }
    if !state.compatible {
      notes.push("incompatible".to_string());
    }
    println!(
      "{:<width$}  {:<12} {}",
      state.identifier,
      version,
      notes.join(", "),
      width = id_width
    );
  }
}

pub fn print_plan(plan: &InstallPlanPrompt) {
  if !plan.install.is_empty() {
    println!("Install:");
    for module in &plan.install {
      let auto = if module.auto_installed { " (dependency)" } else { "" };
      println!("  {} {}{}", module.identifier, module.version, auto);
    }
  }
  if !plan.remove.is_empty() {
    println!("Remove:");
    for identifier in &plan.remove {
      println!("  {identifier}");
    }
  }
  println!("Download size: {}", format_size(plan.download_size));
}

pub fn format_size(bytes: u64) -> String {
  const KIB: f64 = 1024.0;
  let bytes_f = bytes as f64;
  if bytes_f < KIB {
    format!("{bytes} B")
  } else if bytes_f < KIB * KIB {
    format!("{:.1} KiB", bytes_f / KIB)
  } else if bytes_f < KIB * KIB * KIB {
    format!("{:.1} MiB", bytes_f / (KIB * KIB))
  } else {
    format!("{:.1} GiB", bytes_f / (KIB * KIB * KIB))
  }
}
