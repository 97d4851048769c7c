use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use super::{
  error::{DomainError, DomainResult},
  module::Module,
  registry::Repository,
};

/// Network access used by repository updates and installs.
#[async_trait]
pub trait Downloader: Send + Sync {
  /// Fetch a repository's metadata document.
  async fn fetch_repository(&self, repo: &Repository) -> DomainResult<Vec<u8>>;

  /// Download a module's archive to `target`, returning the byte count.
  async fn download_module(&self, module: &Module, target: &Path) -> DomainResult<u64>;
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
  client: reqwest::Client,
}

impl HttpDownloader {
  pub fn new(timeout: Duration) -> DomainResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("ckanserver/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| DomainError::Download {
        url: String::new(),
        reason: e.to_string(),
      })?;
    Ok(Self { client })
  }

  async fn get(&self, url: &str) -> DomainResult<Vec<u8>> {
    trace!(url, "Sending download request");
    let response = self.client.get(url).send().await.map_err(|e| {
      warn!(url, error = %e, "Download request failed");
      DomainError::Download {
        url: url.to_string(),
        reason: if e.is_timeout() {
          "request timed out".to_string()
        } else {
          e.to_string()
        },
      }
    })?;

    let status = response.status();
    match status.as_u16() {
      401 | 403 => {
        error!(url, status = %status, "Download refused");
        return Err(DomainError::DownloadAuth { url: url.to_string() });
      }
      429 => {
        warn!(url, status = %status, "Download throttled");
        return Err(DomainError::Throttled { url: url.to_string() });
      }
      _ if !status.is_success() => {
        return Err(DomainError::Download {
          url: url.to_string(),
          reason: format!("server returned {status}"),
        });
      }
      _ => {}
    }

    let bytes = response.bytes().await.map_err(|e| DomainError::Download {
      url: url.to_string(),
      reason: e.to_string(),
    })?;
    debug!(url, bytes = bytes.len(), "Download complete");
    Ok(bytes.to_vec())
  }
}

#[async_trait]
impl Downloader for HttpDownloader {
  async fn fetch_repository(&self, repo: &Repository) -> DomainResult<Vec<u8>> {
    self.get(&repo.url).await
  }

  async fn download_module(&self, module: &Module, target: &Path) -> DomainResult<u64> {
    let url = module
      .download
      .as_deref()
      .ok_or_else(|| DomainError::Download {
        url: String::new(),
        reason: format!("{} has no download URL", module.key()),
      })?;
    let bytes = self.get(url).await?;
    write_archive(target, &bytes).await?;
    Ok(bytes.len() as u64)
  }
}

/// Write `bytes` to a sibling of `target` and rename it into place.
/// A failed write leaves nothing at `target`.
pub(crate) async fn write_archive(target: &Path, bytes: &[u8]) -> DomainResult<()> {
  if let Some(parent) = target.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let mut partial = target.as_os_str().to_owned();
  partial.push(".part");
  let partial = PathBuf::from(partial);

  let written = match tokio::fs::write(&partial, bytes).await {
    Ok(()) => tokio::fs::rename(&partial, target).await,
    Err(e) => Err(e),
  };
  if let Err(e) = written {
    if let Err(cleanup) = tokio::fs::remove_file(&partial).await
      && cleanup.kind() != std::io::ErrorKind::NotFound
    {
      warn!(path = %partial.display(), error = %cleanup, "Failed to remove partial download");
    }
    return Err(e.into());
  }
  Ok(())
}
