//! End-to-end tests through the Unix socket server and the IPC client.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use pretty_assertions::assert_eq;
  use tokio_util::sync::CancellationToken;

  use crate::{
    actor::__tests__::helpers::*,
    ipc::{
      ActionReply, Client,
      instance::{InstanceOperationReply, InstanceRequest},
      registry::{ModuleRequestParams, PerformInstallParams, RegistryOperationReply, RegistryRequest},
      system::{ContinueRequest, VersionReply},
    },
    server::{Server, ServerConfig},
  };

  struct RunningServer {
    client: Client,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
  }

  async fn start_server(ctx: &ActionTestContext, gw: &TestGateway) -> RunningServer {
    let socket_path = ctx.data_dir.path().join("test.sock");
    let server = Server::new(ServerConfig {
      socket_path: socket_path.clone(),
      gateway: gw.gateway.clone(),
    });
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let task = tokio::spawn(async move {
      server.run(server_cancel).await.expect("server runs");
    });

    for _ in 0..50 {
      if let Ok(client) = Client::connect_to(&socket_path).await {
        return RunningServer { client, cancel, task };
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server never came up at {}", socket_path.display());
  }

  #[tokio::test]
  async fn test_get_version() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();
    let server = start_server(&ctx, &gw).await;

    let version = server.client.get_version().await.unwrap();
    assert_eq!(version, VersionReply::current());
    assert_eq!(version.product_name, "ckanserver");
  }

  #[tokio::test]
  async fn test_calls_over_the_socket() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();
    let server = start_server(&ctx, &gw).await;
    let game = ctx.make_game("ksp");

    let replies = server
      .client
      .call(InstanceRequest::Add(crate::ipc::instance::AddInstanceParams {
        name: "main".to_string(),
        path: game.clone(),
      }))
      .await
      .unwrap();
    assert_eq!(
      replies,
      vec![ActionReply::InstanceOperation(InstanceOperationReply::success())]
    );

    let replies = server.client.call(InstanceRequest::List).await.unwrap();
    let [ActionReply::InstancesList(list)] = replies.as_slice() else {
      panic!("expected an instance list, got {replies:?}");
    };
    assert_eq!(list.instances[0].path, game);
  }

  #[tokio::test]
  async fn test_continuation_over_the_socket() {
    let ctx = ActionTestContext::new();
    ctx.serve_modules(vec![module("Solo", "1.0")]);
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;
    gw.refresh("main", false).await;
    let server = start_server(&ctx, &gw).await;

    let mut stream = server.client.open_action().await.unwrap();
    stream
      .send(RegistryRequest::PerformInstall(PerformInstallParams {
        instance: "main".to_string(),
        install: vec![ModuleRequestParams {
          identifier: "Solo".to_string(),
          version: None,
        }],
        remove: Vec::new(),
      }))
      .await
      .unwrap();

    let replies = stream.collect().await.unwrap();
    assert!(matches!(replies.last(), Some(ActionReply::InstallPlan(_))));

    stream.send(ContinueRequest::Confirm { accepted: true }).await.unwrap();
    let replies = stream.collect().await.unwrap();
    assert_eq!(
      replies.last(),
      Some(&ActionReply::RegistryOperation(RegistryOperationReply::success()))
    );
    assert_eq!(stream.next_reply().await.unwrap(), None);
  }

  /// Test: dropping the connection mid-prompt frees the queue for the next caller.
  #[tokio::test]
  async fn test_disconnect_during_prompt_unblocks_queue() {
    let ctx = ActionTestContext::new();
    ctx.serve_modules(vec![module("Solo", "1.0")]);
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;
    gw.refresh("main", false).await;
    let server = start_server(&ctx, &gw).await;

    let mut stream = server.client.open_action().await.unwrap();
    stream
      .send(RegistryRequest::PerformInstall(PerformInstallParams {
        instance: "main".to_string(),
        install: vec![ModuleRequestParams {
          identifier: "Solo".to_string(),
          version: None,
        }],
        remove: Vec::new(),
      }))
      .await
      .unwrap();
    stream.collect().await.unwrap();
    drop(stream);

    let replies = tokio::time::timeout(REPLY_TIMEOUT, server.client.call(InstanceRequest::List))
      .await
      .expect("queue was released")
      .unwrap();
    assert!(matches!(replies.as_slice(), [ActionReply::InstancesList(_)]));
  }

  #[tokio::test]
  async fn test_socket_removed_on_shutdown() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();
    let server = start_server(&ctx, &gw).await;
    let socket_path = server.client.socket_path().to_path_buf();
    assert!(socket_path.exists());

    server.cancel.cancel();
    server.task.await.unwrap();
    assert!(!socket_path.exists());
  }
}
