//! Worker lifecycle tests: handler panics and lazy instance bootstrap.

#[cfg(test)]
mod tests {
  use std::{
    path::Path,
    sync::{
      Arc,
      atomic::{AtomicBool, Ordering},
    },
  };

  use async_trait::async_trait;
  use pretty_assertions::assert_eq;

  use crate::{
    actor::__tests__::helpers::*,
    domain::{
      downloader::Downloader,
      error::DomainResult,
      module::Module,
      registry::{LOCK_FILE_NAME, Repository},
    },
    ipc::{
      ActionReply,
      instance::{ForgetInstanceParams, InstanceInfo, InstanceRequest},
      registry::RegistryOperationResult,
      system::FailureReply,
    },
  };

  /// Panics on the first repository fetch, then behaves like the stub.
  struct PanicOnceDownloader {
    armed: AtomicBool,
    inner: Arc<StubDownloader>,
  }

  #[async_trait]
  impl Downloader for PanicOnceDownloader {
    async fn fetch_repository(&self, repo: &Repository) -> DomainResult<Vec<u8>> {
      if self.armed.swap(false, Ordering::SeqCst) {
        panic!("connection pool poisoned");
      }
      self.inner.fetch_repository(repo).await
    }

    async fn download_module(&self, module: &Module, target: &Path) -> DomainResult<u64> {
      self.inner.download_module(module, target).await
    }
  }

  async fn list(gw: &TestGateway) -> Vec<InstanceInfo> {
    match single(gw.request(InstanceRequest::List).await) {
      ActionReply::InstancesList(list) => list.instances,
      other => panic!("expected an instance list, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_handler_panic_becomes_internal_error() {
    let ctx = ActionTestContext::new();
    ctx.serve_modules(vec![module("MechJeb2", "2.14.3")]);
    let downloader = Arc::new(PanicOnceDownloader {
      armed: AtomicBool::new(true),
      inner: ctx.downloader.clone(),
    });
    let gw = ctx.spawn_with(ctx.settings(), downloader);
    let game = ctx.make_game("ksp");
    gw.add_instance("ksp", &game).await;

    let replies = without_progress(gw.refresh("ksp", false).await);
    assert_eq!(
      replies,
      vec![ActionReply::Failure(FailureReply {
        message: "Internal error".to_string(),
      })]
    );
    assert!(!game.join("CKAN").join(LOCK_FILE_NAME).exists());

    // The worker is still serving calls
    let names: Vec<String> = list(&gw).await.into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["ksp".to_string()]);

    // The panicked call released the registry lock
    match single(gw.refresh("ksp", false).await) {
      ActionReply::RegistryOperation(op) => assert_eq!(op.result, RegistryOperationResult::Success),
      other => panic!("expected a registry operation reply, got {other:?}"),
    }
    assert!(!gw.worker.is_finished());
  }

  #[tokio::test]
  async fn test_first_call_registers_detected_game_as_default() {
    let ctx = ActionTestContext::new();
    let mut settings = ctx.settings();
    settings.search_paths = vec![ctx.game_path("detected")];
    let gw = ctx.spawn_with(settings, ctx.downloader.clone());

    // Installed after the worker started; found on the next call
    ctx.make_game("detected");
    let instances = list(&gw).await;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].name, "auto");
    assert_eq!(instances[0].path, ctx.game_path("detected"));
    assert!(instances[0].is_default);

    // Forgetting the only instance makes the next call look again
    gw.request(InstanceRequest::Forget(ForgetInstanceParams {
      name: "auto".to_string(),
    }))
    .await;
    let instances = list(&gw).await;
    assert_eq!(instances.len(), 1);
    assert!(instances[0].is_default);
  }

  #[tokio::test]
  async fn test_auto_register_disabled_leaves_instances_empty() {
    let ctx = ActionTestContext::new();
    ctx.make_game("detected");
    let mut settings = ctx.settings();
    settings.search_paths = vec![ctx.game_path("detected")];
    settings.auto_register = false;
    let gw = ctx.spawn_with(settings, ctx.downloader.clone());

    assert!(list(&gw).await.is_empty());
  }
}
