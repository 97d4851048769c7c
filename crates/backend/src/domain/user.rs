use tracing::{error, info};

/// Who an operation runs on behalf of.
///
/// Domain code reports side notices here instead of failing; the server's
/// user has no terminal so it only logs.
pub trait User: Send + Sync {
  fn headless(&self) -> bool;
  fn raise_message(&self, message: &str);
  fn raise_error(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogUser;

impl User for LogUser {
  fn headless(&self) -> bool {
    true
  }

  fn raise_message(&self, message: &str) {
    info!(user_message = message, "Message for user");
  }

  fn raise_error(&self, message: &str) {
    error!(user_message = message, "Error for user");
  }
}
