//! ckanserver CLI - mod management daemon and its command line client

use std::path::PathBuf;

use anyhow::Result;
use ckanserver::RuntimeConfig;
use clap::{Parser, Subcommand};

mod commands;
mod format;
mod logging;

use commands::{
  cmd_daemon, cmd_instance_add, cmd_instance_clone, cmd_instance_default, cmd_instance_fake, cmd_instance_forget,
  cmd_instance_list, cmd_instance_rename, cmd_registry_available, cmd_registry_compatible, cmd_registry_install,
  cmd_registry_load, cmd_registry_refresh, cmd_registry_states, cmd_version,
};
use logging::{init_cli_logging, init_daemon_logging};

#[derive(Parser)]
#[command(name = "ckanserver")]
#[command(about = "Mod management daemon for KSP game instances")]
#[command(after_help = "\
QUICK START:
  ckanserver daemon                         # Start daemon in the background
  ckanserver instance add main ~/KSP        # Register a game install
  ckanserver registry refresh main          # Download module metadata
  ckanserver registry install main Astrogator

Client commands start the daemon automatically when it isn't running.")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `ckanserver instance`
#[derive(Subcommand)]
pub enum InstanceCommand {
  /// List registered instances
  List {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Register an existing game install
  Add { name: String, path: PathBuf },
  /// Unregister an instance (files are left alone)
  Forget { name: String },
  /// Rename an instance
  Rename { old_name: String, new_name: String },
  /// Make an instance the default
  Default { name: String },
  /// Create a fake game install for testing
  Fake {
    name: String,
    path: PathBuf,
    /// Game version, e.g. 1.12.5
    #[arg(long)]
    version: String,
    /// Short game name
    #[arg(long, default_value = "KSP")]
    game: String,
    /// Making History DLC version
    #[arg(long)]
    making_history: Option<String>,
    /// Breaking Ground DLC version
    #[arg(long)]
    breaking_ground: Option<String>,
    /// Make the new instance the default
    #[arg(long)]
    set_default: bool,
  },
  /// Copy an instance to a new directory
  Clone {
    source: String,
    new_name: String,
    new_path: PathBuf,
    /// Link stock game folders instead of copying them
    #[arg(long)]
    share_stock: bool,
  },
}

/// Subcommands for `ckanserver registry`
#[derive(Subcommand)]
pub enum RegistryCommand {
  /// Load an instance's registry and repository caches
  Load {
    instance: String,
    /// Remove a stale registry lock left by a crashed process
    #[arg(long)]
    force_lock: bool,
  },
  /// Download repository metadata
  Refresh {
    instance: String,
    /// Re-download even when the cache is current
    #[arg(long)]
    force: bool,
  },
  /// List modules compatible with an instance
  Available {
    instance: String,
    #[arg(long)]
    json: bool,
  },
  /// Show installed and upgradeable modules
  States {
    instance: String,
    #[arg(long)]
    json: bool,
  },
  /// List compatible releases of one module
  Compatible { instance: String, identifier: String },
  /// Install and remove modules
  #[command(after_help = "\
EXAMPLES:
  ckanserver registry install main Astrogator
  ckanserver registry install main MechJeb2=2.14.3 --yes
  ckanserver registry install main --remove OldMod")]
  Install {
    instance: String,
    /// Modules to install, optionally pinned as IDENTIFIER=VERSION
    identifiers: Vec<String>,
    /// Modules to remove
    #[arg(long)]
    remove: Vec<String>,
    /// Accept the install plan without asking
    #[arg(short, long)]
    yes: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Start the daemon
  Daemon {
    /// Run in the foreground, logging to the console
    #[arg(long, conflicts_with = "background")]
    foreground: bool,
    /// Run detached, logging to a file
    #[arg(long, hide = true)]
    background: bool,
  },
  /// Show the daemon version
  Version,
  /// Manage game instances
  Instance {
    #[command(subcommand)]
    command: InstanceCommand,
  },
  /// Query and change an instance's modules
  Registry {
    #[command(subcommand)]
    command: RegistryCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let mut runtime = RuntimeConfig::load().await;
  let socket_path = runtime.socket_path.clone();

  if !matches!(cli.command, Commands::Daemon { .. }) {
    init_cli_logging();
  }

  match cli.command {
    Commands::Daemon { foreground, background } => {
      runtime.foreground = foreground;
      // A bare `daemon` only spawns the real one, so it logs like a client
      let spawn_only = !foreground && !background;
      let _guard = if spawn_only {
        init_cli_logging();
        None
      } else {
        init_daemon_logging(&runtime)
      };
      cmd_daemon(runtime, spawn_only).await
    }
    Commands::Version => cmd_version(&socket_path).await,

    // Instance subcommands
    Commands::Instance { command } => match command {
      InstanceCommand::List { json } => cmd_instance_list(&socket_path, json).await,
      InstanceCommand::Add { name, path } => cmd_instance_add(&socket_path, name, path).await,
      InstanceCommand::Forget { name } => cmd_instance_forget(&socket_path, name).await,
      InstanceCommand::Rename { old_name, new_name } => cmd_instance_rename(&socket_path, old_name, new_name).await,
      InstanceCommand::Default { name } => cmd_instance_default(&socket_path, name).await,
      InstanceCommand::Fake {
        name,
        path,
        version,
        game,
        making_history,
        breaking_ground,
        set_default,
      } => {
        cmd_instance_fake(
          &socket_path,
          name,
          path,
          &game,
          &version,
          making_history.as_deref(),
          breaking_ground.as_deref(),
          set_default,
        )
        .await
      }
      InstanceCommand::Clone {
        source,
        new_name,
        new_path,
        share_stock,
      } => cmd_instance_clone(&socket_path, source, new_name, new_path, share_stock).await,
    },

    // Registry subcommands
    Commands::Registry { command } => match command {
      RegistryCommand::Load { instance, force_lock } => cmd_registry_load(&socket_path, instance, force_lock).await,
      RegistryCommand::Refresh { instance, force } => cmd_registry_refresh(&socket_path, instance, force).await,
      RegistryCommand::Available { instance, json } => cmd_registry_available(&socket_path, instance, json).await,
      RegistryCommand::States { instance, json } => cmd_registry_states(&socket_path, instance, json).await,
      RegistryCommand::Compatible { instance, identifier } => {
        cmd_registry_compatible(&socket_path, instance, identifier).await
      }
      RegistryCommand::Install {
        instance,
        identifiers,
        remove,
        yes,
      } => cmd_registry_install(&socket_path, instance, identifiers, remove, yes).await,
    },
  }
}
