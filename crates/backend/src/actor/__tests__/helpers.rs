//! Test helpers for action worker scenario tests.
//!
//! Provides `ActionTestContext` which manages temporary directories, a stub
//! downloader serving an in-memory repository, and an in-process gateway.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
  actor::{ClientHandle, DomainState, Gateway, GatewayError},
  domain::{
    config::WorkerSettings,
    downloader::Downloader,
    error::{DomainError, DomainResult},
    game::{Game, GameVersion},
    module::{Module, Relationship},
    registry::Repository,
    repo_data::RepositoryDocument,
  },
  ipc::{
    ActionMessage, ActionReply,
    instance::{AddInstanceParams, InstanceRequest},
    registry::{InstanceParams, RefreshParams, RegistryRequest},
  },
};

/// How long a test waits for a reply before giving up
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Stub downloader
// ============================================================================

/// Serves repository documents from memory and writes placeholder archives.
#[derive(Default)]
pub struct StubDownloader {
  documents: Mutex<HashMap<String, RepositoryDocument>>,
  pub fetches: AtomicUsize,
  pub downloads: AtomicUsize,
}

impl StubDownloader {
  pub fn serve(&self, repo: &Repository, document: RepositoryDocument) {
    self.documents.lock().unwrap().insert(repo.url.clone(), document);
  }
}

#[async_trait]
impl Downloader for StubDownloader {
  async fn fetch_repository(&self, repo: &Repository) -> DomainResult<Vec<u8>> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    let documents = self.documents.lock().unwrap();
    let document = documents.get(&repo.url).ok_or_else(|| DomainError::Download {
      url: repo.url.clone(),
      reason: "server returned 404 Not Found".to_string(),
    })?;
    Ok(serde_json::to_vec(document).unwrap())
  }

  async fn download_module(&self, module: &Module, target: &Path) -> DomainResult<u64> {
    self.downloads.fetch_add(1, Ordering::SeqCst);
    std::fs::create_dir_all(target.parent().unwrap())?;
    let content = format!("archive of {}", module.key());
    std::fs::write(target, &content)?;
    Ok(content.len() as u64)
  }
}

// ============================================================================
// Test context
// ============================================================================

/// Test context for action worker tests.
///
/// Every context has its own data, cache and games directories and a single
/// repository named `main` served by the stub downloader.
pub struct ActionTestContext {
  pub data_dir: TempDir,
  pub cache_dir: TempDir,
  /// Parent of the game directories created by tests
  pub games_dir: TempDir,
  pub downloader: Arc<StubDownloader>,
  pub repository: Repository,
  pub page_size: usize,
}

impl ActionTestContext {
  pub fn new() -> Self {
    Self {
      data_dir: TempDir::new().expect("create data temp dir"),
      cache_dir: TempDir::new().expect("create cache temp dir"),
      games_dir: TempDir::new().expect("create games temp dir"),
      downloader: Arc::new(StubDownloader::default()),
      repository: Repository {
        name: "main".to_string(),
        url: "https://repo.test/main.json".to_string(),
        priority: 0,
      },
      page_size: 100,
    }
  }

  pub fn with_page_size(mut self, page_size: usize) -> Self {
    self.page_size = page_size;
    self
  }

  pub fn settings(&self) -> WorkerSettings {
    WorkerSettings {
      data_dir: self.data_dir.path().to_path_buf(),
      cache_dir: self.cache_dir.path().to_path_buf(),
      page_size: self.page_size,
      // Never scan the real machine for installs
      search_paths: vec![self.games_dir.path().join("no-such-dir")],
      auto_register: true,
      repositories: vec![self.repository.clone()],
    }
  }

  /// Spawn a worker over a fresh domain state.
  pub fn spawn(&self) -> TestGateway {
    self.spawn_with(self.settings(), self.downloader.clone())
  }

  /// Spawn a worker with adjusted settings or a different downloader.
  pub fn spawn_with(&self, settings: WorkerSettings, downloader: Arc<dyn Downloader>) -> TestGateway {
    let domain = DomainState::load(settings, downloader).expect("load domain state");
    let cancel = CancellationToken::new();
    let (gateway, worker) = Gateway::spawn(domain, cancel.clone());
    TestGateway {
      gateway,
      worker,
      cancel,
    }
  }

  pub fn game_path(&self, name: &str) -> PathBuf {
    self.games_dir.path().join(name)
  }

  /// Write a game install for KSP 1.12.5 at `game_path(name)`.
  pub fn make_game(&self, name: &str) -> PathBuf {
    let dir = self.game_path(name);
    Game::KerbalSpaceProgram
      .write_fake_layout(&dir, &GameVersion::new(1, 12, 5), &[])
      .expect("write game layout");
    dir
  }

  /// Serve `modules` from the `main` repository.
  pub fn serve_modules(&self, modules: Vec<Module>) {
    self.downloader.serve(
      &self.repository,
      RepositoryDocument {
        modules,
        download_counts: HashMap::new(),
      },
    );
  }
}

/// A running worker and its shutdown token.
pub struct TestGateway {
  pub gateway: Gateway,
  pub worker: JoinHandle<()>,
  pub cancel: CancellationToken,
}

impl TestGateway {
  /// Open a call without sending anything yet.
  pub fn open(&self) -> TestCall {
    self.open_with(CancellationToken::new())
  }

  pub fn open_with(&self, cancel: CancellationToken) -> TestCall {
    let (handle, end) = ClientHandle::channel(16);
    let gateway = self.gateway.clone();
    let submit = tokio::spawn(async move { gateway.submit(handle, cancel).await });
    TestCall {
      inbound: Some(end.inbound),
      outbound: end.outbound,
      submit,
    }
  }

  /// Send `messages`, close the inbound side and collect every reply.
  pub async fn call(&self, messages: Vec<ActionMessage>) -> Vec<ActionReply> {
    let mut call = self.open();
    for message in messages {
      call.send(message).await;
    }
    call.finish().await
  }

  /// Single-message call.
  pub async fn request(&self, message: impl Into<ActionMessage>) -> Vec<ActionReply> {
    self.call(vec![message.into()]).await
  }

  pub async fn add_instance(&self, name: &str, path: &Path) -> Vec<ActionReply> {
    self
      .request(InstanceRequest::Add(AddInstanceParams {
        name: name.to_string(),
        path: path.to_path_buf(),
      }))
      .await
  }

  pub async fn refresh(&self, instance: &str, force: bool) -> Vec<ActionReply> {
    self
      .request(RegistryRequest::Refresh(RefreshParams {
        instance: instance.to_string(),
        force,
      }))
      .await
  }

  pub async fn module_states(&self, instance: &str) -> Vec<ActionReply> {
    self
      .request(RegistryRequest::ModuleStates(InstanceParams {
        instance: instance.to_string(),
      }))
      .await
  }
}

/// One in-flight call as seen by a test client.
pub struct TestCall {
  inbound: Option<tokio::sync::mpsc::Sender<ActionMessage>>,
  outbound: tokio::sync::mpsc::Receiver<ActionReply>,
  pub submit: JoinHandle<Result<(), GatewayError>>,
}

impl TestCall {
  pub async fn send(&mut self, message: impl Into<ActionMessage>) {
    self
      .inbound
      .as_ref()
      .expect("inbound side already closed")
      .send(message.into())
      .await
      .expect("worker dropped the call");
  }

  /// Stop sending, as a client half-closing its stream would.
  pub fn close_inbound(&mut self) {
    self.inbound = None;
  }

  /// Next reply, `None` once the worker has finished the call.
  pub async fn next_reply(&mut self) -> Option<ActionReply> {
    tokio::time::timeout(REPLY_TIMEOUT, self.outbound.recv())
      .await
      .expect("timed out waiting for a reply")
  }

  /// Read replies up to and including the next continuation prompt.
  pub async fn until_prompt(&mut self) -> Vec<ActionReply> {
    let mut replies = Vec::new();
    while let Some(reply) = self.next_reply().await {
      let is_prompt = reply.is_prompt();
      replies.push(reply);
      if is_prompt {
        break;
      }
    }
    replies
  }

  /// Close the inbound side, drain all replies and wait for completion.
  pub async fn finish(mut self) -> Vec<ActionReply> {
    self.close_inbound();
    let mut replies = Vec::new();
    while let Some(reply) = self.next_reply().await {
      replies.push(reply);
    }
    let submitted = tokio::time::timeout(REPLY_TIMEOUT, self.submit)
      .await
      .expect("timed out waiting for completion")
      .expect("submit task panicked");
    submitted.expect("gateway accepted the call");
    replies
  }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn module(identifier: &str, version: &str) -> Module {
  let mut module = Module::new(identifier, version);
  module.download = Some(format!("https://files.test/{identifier}-{version}.zip"));
  module.download_size = 1024;
  module
}

pub fn depends_on(mut module: Module, names: &[&str]) -> Module {
  module.depends.extend(names.iter().map(|n| Relationship::direct(*n)));
  module
}

pub fn providing(mut module: Module, name: &str) -> Module {
  module.provides.push(name.to_string());
  module
}

/// Only the progress-free replies of a call.
pub fn without_progress(replies: Vec<ActionReply>) -> Vec<ActionReply> {
  replies
    .into_iter()
    .filter(|r| !matches!(r, ActionReply::Progress(_)))
    .collect()
}

/// The single terminal reply of a call, ignoring progress.
pub fn single(replies: Vec<ActionReply>) -> ActionReply {
  let mut replies = without_progress(replies);
  assert_eq!(replies.len(), 1, "expected exactly one reply, got {replies:?}");
  replies.remove(0)
}
