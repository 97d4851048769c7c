use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{
  downloader::Downloader,
  error::DomainResult,
  module::{Module, ModuleKind},
  registry::RegistryManager,
  resolver::InstallPlan,
};

/// Downloads archives into the shared cache and records plans in a registry.
pub struct Installer<'a> {
  downloads_dir: PathBuf,
  downloader: &'a dyn Downloader,
}

impl<'a> Installer<'a> {
  pub fn new(cache_dir: &Path, downloader: &'a dyn Downloader) -> Self {
    Self {
      downloads_dir: cache_dir.join("downloads"),
      downloader,
    }
  }

  /// Where the archive of `module` is cached.
  pub fn archive_path(&self, module: &Module) -> PathBuf {
    let url = module.download.as_deref().unwrap_or_default();
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    self
      .downloads_dir
      .join(format!("{}-{}-{}.zip", &digest[..8], module.identifier, module.version))
  }

  /// Metapackages and DLCs have nothing to fetch.
  pub fn needs_download(module: &Module) -> bool {
    module.kind == ModuleKind::Package && module.download.is_some()
  }

  /// Download `module` unless its archive is already cached.
  pub async fn download(&self, module: &Module) -> DomainResult<Option<PathBuf>> {
    if !Self::needs_download(module) {
      return Ok(None);
    }
    let target = self.archive_path(module);
    if target.is_file() {
      debug!(module = %module.key(), "Archive already cached");
      return Ok(Some(target));
    }
    let bytes = self.downloader.download_module(module, &target).await?;
    debug!(module = %module.key(), bytes, "Archive downloaded");
    Ok(Some(target))
  }

  /// Record `plan` in the registry: removals first, then installs.
  pub fn apply(&self, registry: &mut RegistryManager, plan: &InstallPlan, archives: &[Option<PathBuf>]) -> DomainResult<()> {
    for identifier in &plan.remove {
      registry.registry_mut().deregister(identifier);
    }
    for (index, module) in plan.install.iter().enumerate() {
      let auto = plan.auto_installed.contains(&module.identifier);
      let archive = archives.get(index).cloned().flatten();
      registry.registry_mut().register_install(module.clone(), auto, archive);
    }
    registry.save()?;
    info!(
      installed = plan.install.len(),
      removed = plan.remove.len(),
      "Install plan applied"
    );
    Ok(())
  }
}
