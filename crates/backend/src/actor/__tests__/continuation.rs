//! Dispatcher and continuation protocol tests.

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use crate::{
    actor::__tests__::helpers::*,
    ipc::{
      ActionMessage, ActionReply,
      instance::InstanceRequest,
      registry::{
        ModuleRequestParams, ModuleStatesPage, PerformInstallParams, RegistryOperationReply, RegistryOperationResult,
        RegistryRequest,
      },
      system::{ContinueRequest, FailureReply},
    },
  };

  fn install(instance: &str, identifiers: &[&str]) -> RegistryRequest {
    RegistryRequest::PerformInstall(PerformInstallParams {
      instance: instance.to_string(),
      install: identifiers
        .iter()
        .map(|id| ModuleRequestParams {
          identifier: id.to_string(),
          version: None,
        })
        .collect(),
      remove: Vec::new(),
    })
  }

  fn failure(message: &str) -> ActionReply {
    ActionReply::Failure(FailureReply {
      message: message.to_string(),
    })
  }

  fn operation_result(reply: &ActionReply) -> RegistryOperationResult {
    match reply {
      ActionReply::RegistryOperation(op) => op.result,
      other => panic!("expected a registry operation reply, got {other:?}"),
    }
  }

  /// Instance "main" with a refreshed repository holding App, which needs
  /// one of the two Planets providers.
  async fn install_fixture(ctx: &ActionTestContext) -> TestGateway {
    ctx.serve_modules(vec![
      depends_on(module("App", "1.0"), &["Planets"]),
      providing(module("PackA", "2.0"), "Planets"),
      providing(module("PackB", "3.1"), "Planets"),
    ]);
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;
    gw.refresh("main", false).await;
    gw
  }

  // ==========================================================================
  // Dispatcher
  // ==========================================================================

  #[tokio::test]
  async fn test_unknown_message_fails_without_stopping_the_worker() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();

    let replies = gw.call(vec![ActionMessage::parse(r#"{"method":"frobnicate"}"#)]).await;
    assert_eq!(replies, vec![failure("Unknown message type")]);

    let replies = gw.request(InstanceRequest::List).await;
    assert!(matches!(replies.as_slice(), [ActionReply::InstancesList(_)]));
  }

  #[tokio::test]
  async fn test_continue_as_opening_message_fails() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();

    let replies = gw.request(ContinueRequest::Confirm { accepted: true }).await;
    assert_eq!(
      replies,
      vec![failure("A continuation request cannot be the first message sent")]
    );
  }

  // ==========================================================================
  // Continuations
  // ==========================================================================

  /// Test: provider choice, plan confirmation, then install with progress.
  #[tokio::test]
  async fn test_install_with_provider_choice_and_confirmation() {
    let ctx = ActionTestContext::new();
    let gw = install_fixture(&ctx).await;

    let mut call = gw.open();
    call.send(install("main", &["App"])).await;

    let replies = call.until_prompt().await;
    let Some(ActionReply::ProviderChoice(prompt)) = replies.last() else {
      panic!("expected a provider choice prompt, got {replies:?}");
    };
    assert_eq!(prompt.requested, "Planets");
    let mut candidates: Vec<&str> = prompt.candidates.iter().map(|c| c.identifier.as_str()).collect();
    candidates.sort();
    assert_eq!(candidates, vec!["PackA", "PackB"]);

    call
      .send(ContinueRequest::Choose {
        identifier: Some("PackB".to_string()),
      })
      .await;

    let replies = call.until_prompt().await;
    let Some(ActionReply::InstallPlan(plan)) = replies.last() else {
      panic!("expected an install plan prompt, got {replies:?}");
    };
    let planned: Vec<(&str, bool)> = plan
      .install
      .iter()
      .map(|m| (m.identifier.as_str(), m.auto_installed))
      .collect();
    assert_eq!(planned, vec![("App", false), ("PackB", true)]);
    assert_eq!(plan.download_size, 2048);

    call.send(ContinueRequest::Confirm { accepted: true }).await;
    let replies = call.finish().await;

    assert!(replies.iter().any(|r| matches!(r, ActionReply::Progress(_))));
    assert_eq!(
      replies.last(),
      Some(&ActionReply::RegistryOperation(RegistryOperationReply::success()))
    );
    assert_eq!(ctx.downloader.downloads.load(std::sync::atomic::Ordering::SeqCst), 2);

    // The registry now records both modules
    let states = gw.module_states("main").await;
    let Some(ActionReply::ModuleStates(ModuleStatesPage { states, remaining: 0 })) = states.last() else {
      panic!("expected module states, got {states:?}");
    };
    let installed: Vec<(&str, bool)> = states
      .iter()
      .filter(|s| s.installed_version.is_some())
      .map(|s| (s.identifier.as_str(), s.auto_installed))
      .collect();
    assert_eq!(installed, vec![("App", false), ("PackB", true)]);
  }

  #[tokio::test]
  async fn test_declined_plan_installs_nothing() {
    let ctx = ActionTestContext::new();
    ctx.serve_modules(vec![module("Solo", "1.0")]);
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;
    gw.refresh("main", false).await;

    let mut call = gw.open();
    call.send(install("main", &["Solo"])).await;
    let prompt = call.until_prompt().await;
    assert!(matches!(prompt.last(), Some(ActionReply::InstallPlan(_))));

    call.send(ContinueRequest::Confirm { accepted: false }).await;
    let replies = call.finish().await;
    assert_eq!(replies.len(), 1);
    assert_eq!(operation_result(&replies[0]), RegistryOperationResult::Declined);
    assert_eq!(ctx.downloader.downloads.load(std::sync::atomic::Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_declined_provider_choice() {
    let ctx = ActionTestContext::new();
    let gw = install_fixture(&ctx).await;

    let mut call = gw.open();
    call.send(install("main", &["App"])).await;
    call.until_prompt().await;

    // Naming a module that isn't a candidate counts as declining
    call
      .send(ContinueRequest::Choose {
        identifier: Some("App".to_string()),
      })
      .await;
    let replies = call.finish().await;
    assert_eq!(replies.len(), 1);
    assert_eq!(operation_result(&replies[0]), RegistryOperationResult::Declined);
  }

  /// Test: a non-continue answer to a prompt fails the call, and the worker moves on.
  #[tokio::test]
  async fn test_wrong_message_after_prompt() {
    let ctx = ActionTestContext::new();
    let gw = install_fixture(&ctx).await;

    let mut call = gw.open();
    call.send(install("main", &["App"])).await;
    call.until_prompt().await;

    call.send(InstanceRequest::List).await;
    let replies = call.finish().await;
    assert_eq!(
      replies,
      vec![failure("Expected a continue message, got a instances_list message")]
    );

    let replies = gw.request(InstanceRequest::List).await;
    assert!(matches!(replies.as_slice(), [ActionReply::InstancesList(_)]));
  }

  #[tokio::test]
  async fn test_client_leaves_after_prompt() {
    let ctx = ActionTestContext::new();
    let gw = install_fixture(&ctx).await;

    let mut call = gw.open();
    call.send(install("main", &["App"])).await;
    call.until_prompt().await;

    let replies = call.finish().await;
    assert_eq!(
      replies,
      vec![failure("Expected a continue message, got a client disconnected message")]
    );
  }

  /// Test: answers sent ahead of the prompts are consumed in order.
  #[tokio::test]
  async fn test_pipelined_answers() {
    let ctx = ActionTestContext::new();
    let gw = install_fixture(&ctx).await;

    let replies = gw
      .call(vec![
        install("main", &["App"]).into(),
        ContinueRequest::Choose {
          identifier: Some("PackA".to_string()),
        }
        .into(),
        ContinueRequest::Confirm { accepted: true }.into(),
      ])
      .await;

    let prompts = replies.iter().filter(|r| r.is_prompt()).count();
    assert_eq!(prompts, 2);
    assert_eq!(operation_result(replies.last().unwrap()), RegistryOperationResult::Success);
  }
}
