//! System IPC types - version query, progress, failures and continuations
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
  pub version: String,
  pub product_name: String,
}

impl VersionReply {
  pub fn current() -> Self {
    Self {
      version: env!("CARGO_PKG_VERSION").to_string(),
      product_name: "ckanserver".to_string(),
    }
  }
}

/// A client's answer to a continuation prompt.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "answer")]
pub enum ContinueRequest {
  Confirm { accepted: bool },
  /// `None` declines to choose
  Choose { identifier: Option<String> },
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReply {
  /// Percent complete (0-100)
  pub percent: u8,
  pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReply {
  pub message: String,
}
