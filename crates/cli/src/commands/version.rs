//! Version command

use std::path::Path;

use anyhow::Result;

/// Print the CLI and daemon versions
pub async fn cmd_version(socket_path: &Path) -> Result<()> {
  println!("ckanserver CLI {}", env!("CARGO_PKG_VERSION"));

  let client = super::connect(socket_path).await?;
  let version = client.get_version().await?;
  println!("{} daemon {}", version.product_name, version.version);
  Ok(())
}
