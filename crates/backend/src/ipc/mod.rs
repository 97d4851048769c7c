//! IPC module - wire messages exchanged with clients, and the client itself
//!
//! Every connection carries exactly one call. The first line is a
//! [`CallOpen`] envelope; after `process_action` both sides exchange
//! newline-delimited [`ActionMessage`]s and [`ActionReply`]s until the server
//! closes the stream.
use serde::{Deserialize, Serialize};

pub mod types;

pub mod client;

pub use client::{ActionStream, Client};
pub use types::*;

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum IpcError {
  #[error("Ser/de error: {0}")]
  Serde(String),
  #[error("IO error: {0}")]
  Io(String),
  #[error("Connection error: {0}")]
  Connection(String),
  #[error("Codec error: {0}")]
  Codec(String),
  #[error("Protocol error: {0}")]
  Protocol(String),
  #[error("Connection closed before a reply was received")]
  Closed,
}

impl From<serde_json::Error> for IpcError {
  fn from(err: serde_json::Error) -> Self {
    IpcError::Serde(err.to_string())
  }
}

impl From<std::io::Error> for IpcError {
  fn from(err: std::io::Error) -> Self {
    IpcError::Io(err.to_string())
  }
}

impl From<tokio_util::codec::LinesCodecError> for IpcError {
  fn from(err: tokio_util::codec::LinesCodecError) -> Self {
    IpcError::Codec(err.to_string())
  }
}

// ============================================================================
// Call envelope
// ============================================================================

/// First line of every connection, selecting the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "call")]
pub enum CallOpen {
  /// Unary: one [`system::VersionReply`] line, then close
  GetVersion,
  /// Bidirectional action stream
  ProcessAction,
}

// ============================================================================
// Inbound messages
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "params")]
pub enum ActionMessage {
  Instances(instance::InstanceRequest),
  Registry(registry::RegistryRequest),
  Continue(system::ContinueRequest),
  /// A line that didn't parse as any known message
  #[serde(skip)]
  Unknown(String),
}

impl ActionMessage {
  /// Parse one inbound line. Lines that aren't a known message become
  /// [`ActionMessage::Unknown`] so the dispatcher can reject them.
  pub fn parse(line: &str) -> Self {
    serde_json::from_str(line).unwrap_or_else(|e| ActionMessage::Unknown(e.to_string()))
  }

  /// Short name used in logs and protocol errors.
  pub fn kind(&self) -> &'static str {
    match self {
      ActionMessage::Instances(req) => req.kind(),
      ActionMessage::Registry(req) => req.kind(),
      ActionMessage::Continue(_) => "continue",
      ActionMessage::Unknown(_) => "unknown",
    }
  }
}

impl From<instance::InstanceRequest> for ActionMessage {
  fn from(req: instance::InstanceRequest) -> Self {
    ActionMessage::Instances(req)
  }
}

impl From<registry::RegistryRequest> for ActionMessage {
  fn from(req: registry::RegistryRequest) -> Self {
    ActionMessage::Registry(req)
  }
}

impl From<system::ContinueRequest> for ActionMessage {
  fn from(req: system::ContinueRequest) -> Self {
    ActionMessage::Continue(req)
  }
}

// ============================================================================
// Outbound replies
// ============================================================================

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reply", content = "data")]
pub enum ActionReply {
  InstancesList(instance::InstancesListResult),
  InstanceOperation(instance::InstanceOperationReply),
  RegistryOperation(registry::RegistryOperationReply),
  AvailableModules(registry::AvailableModulesPage),
  ModuleStates(registry::ModuleStatesPage),
  CompatibleReleases(registry::CompatibleReleasesResult),
  OptionalDependencies(registry::OptionalDependenciesResult),
  // Continuation prompts
  ProviderChoice(registry::ProviderChoicePrompt),
  InstallPlan(registry::InstallPlanPrompt),
  Progress(system::ProgressReply),
  Failure(system::FailureReply),
}

impl ActionReply {
  pub fn failure(message: impl Into<String>) -> Self {
    ActionReply::Failure(system::FailureReply {
      message: message.into(),
    })
  }

  pub fn progress(percent: u8, message: impl Into<String>) -> Self {
    ActionReply::Progress(system::ProgressReply {
      percent: percent.min(100),
      message: Some(message.into()),
    })
  }

  /// Whether the client must answer this reply with a `continue` message.
  pub fn is_prompt(&self) -> bool {
    matches!(self, ActionReply::ProviderChoice(_) | ActionReply::InstallPlan(_))
  }
}
