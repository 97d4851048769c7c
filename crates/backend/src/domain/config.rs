//! Daemon configuration loaded from `config.toml`.
//!
//! Every section falls back to its defaults, so a partial (or missing) file
//! is always valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::registry::Repository;
use crate::dirs;

pub const CONFIG_FILE_NAME: &str = "config.toml";

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub daemon: DaemonConfig,
  pub server: ServerSettings,
  pub instances: InstancesConfig,
  pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level (error, warn, info, debug, trace)
  pub log_level: String,
  /// Log file rotation (daily, hourly, never)
  pub log_rotation: String,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_rotation: "daily".to_string(),
    }
  }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
  /// Overrides the default socket location
  pub socket_path: Option<PathBuf>,
  /// Items per page in chunked replies
  pub page_size: usize,
}

impl Default for ServerSettings {
  fn default() -> Self {
    Self {
      socket_path: None,
      page_size: default_page_size(),
    }
  }
}

fn default_page_size() -> usize {
  100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancesConfig {
  /// Directories scanned for game installs when no instance is registered.
  /// Empty means the platform's default install locations.
  pub search_paths: Vec<PathBuf>,
  /// Register detected installs automatically
  pub auto_register: bool,
}

impl Default for InstancesConfig {
  fn default() -> Self {
    Self {
      search_paths: Vec::new(),
      auto_register: true,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  /// Repositories new registries start with. Each URL serves a JSON array
  /// of module metadata.
  pub repositories: Vec<Repository>,
  pub download_timeout_secs: u64,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      repositories: Vec::new(),
      download_timeout_secs: 60,
    }
  }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
  /// Path of the user config file, if a config directory can be determined.
  pub fn user_config_path() -> Option<PathBuf> {
    Some(dirs::default_config_dir().join(CONFIG_FILE_NAME))
  }

  /// Load the user config, falling back to defaults when missing or invalid.
  pub async fn load_global() -> Self {
    let Some(path) = Self::user_config_path() else {
      return Self::default();
    };
    Self::load_from(&path).await
  }

  pub async fn load_from(path: &std::path::Path) -> Self {
    let content = match tokio::fs::read_to_string(path).await {
      Ok(content) => content,
      Err(e) => {
        debug!(path = %path.display(), error = %e, "No config file, using defaults");
        return Self::default();
      }
    };

    match toml::from_str(&content) {
      Ok(config) => config,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
        Self::default()
      }
    }
  }

  /// Commented default config written on first start.
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# ckanserver configuration

[daemon]
# Log level: error, warn, info, debug, trace (RUST_LOG overrides this)
log_level = "{log_level}"
# Log file rotation when running in the background: daily, hourly, never
log_rotation = "{log_rotation}"

[server]
# socket_path = "/run/user/1000/ckanserver.sock"
# Items per page in chunked replies
page_size = {page_size}

[instances]
# Directories scanned for game installs when no instance is registered
# search_paths = ["/home/me/.local/share/Steam/steamapps/common/Kerbal Space Program"]
auto_register = {auto_register}

[registry]
download_timeout_secs = {timeout}

# [[registry.repositories]]
# name = "main"
# url = "https://example.org/ckan/repository.json"
# priority = 0
"#,
      log_level = defaults.daemon.log_level,
      log_rotation = defaults.daemon.log_rotation,
      page_size = defaults.server.page_size,
      auto_register = defaults.instances.auto_register,
      timeout = defaults.registry.download_timeout_secs,
    )
  }
}

// ============================================================================
// Worker settings
// ============================================================================

/// The subset of the config the action worker needs, resolved to concrete paths.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub data_dir: PathBuf,
  pub cache_dir: PathBuf,
  pub page_size: usize,
  pub search_paths: Vec<PathBuf>,
  pub auto_register: bool,
  pub repositories: Vec<Repository>,
}

impl WorkerSettings {
  pub fn from_config(config: &Config, data_dir: PathBuf, cache_dir: PathBuf) -> Self {
    Self {
      data_dir,
      cache_dir,
      page_size: config.server.page_size.max(1),
      search_paths: config.instances.search_paths.clone(),
      auto_register: config.instances.auto_register,
      repositories: config.registry.repositories.clone(),
    }
  }
}
