//! Instance and registry handler tests.

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use crate::{
    actor::__tests__::helpers::*,
    domain::{
      game::{Dlc, GameVersion},
      module::{ReleaseStatus, Relationship},
      registry::LOCK_FILE_NAME,
    },
    ipc::{
      ActionReply,
      instance::{
        CloneInstanceParams, FakeInstanceParams, ForgetInstanceParams, InstanceInfo, InstanceOperationResult,
        InstanceRequest, RenameInstanceParams, SetCompatOptionsParams, SetDefaultInstanceParams, VersionParams,
      },
      registry::{
        AvailableModulesPage, CompatibleReleasesParams, InstanceParams, ModuleSummary, OptionalDependenciesParams,
        PrepopulateParams, RegistryOperationResult, RegistryRequest,
      },
    },
  };

  fn instance_result(reply: &ActionReply) -> InstanceOperationResult {
    match reply {
      ActionReply::InstanceOperation(op) => op.result,
      other => panic!("expected an instance operation reply, got {other:?}"),
    }
  }

  fn registry_result(reply: &ActionReply) -> (RegistryOperationResult, Option<String>) {
    match reply {
      ActionReply::RegistryOperation(op) => (op.result, op.details.clone()),
      other => panic!("expected a registry operation reply, got {other:?}"),
    }
  }

  async fn list(gw: &TestGateway) -> Vec<InstanceInfo> {
    match single(gw.request(InstanceRequest::List).await) {
      ActionReply::InstancesList(list) => list.instances,
      other => panic!("expected an instance list, got {other:?}"),
    }
  }

  fn version(major: u32, minor: u32, patch: Option<u32>) -> VersionParams {
    VersionParams {
      major: Some(major),
      minor: Some(minor),
      patch,
      build: None,
    }
  }

  fn fake(ctx: &ActionTestContext, name: &str, version: VersionParams) -> FakeInstanceParams {
    FakeInstanceParams {
      name: name.to_string(),
      path: ctx.game_path(name),
      game: "KSP".to_string(),
      version,
      making_history: None,
      breaking_ground: None,
      use_as_new_default: false,
    }
  }

  // ==========================================================================
  // Instances
  // ==========================================================================

  #[tokio::test]
  async fn test_add_rename_default_forget() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();
    let dir = ctx.make_game("ksp");

    let reply = single(gw.add_instance("first", &dir).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::Success);

    let reply = single(gw.add_instance("first", &ctx.make_game("other")).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::DuplicateInstance);

    let not_a_game = ctx.games_dir.path().join("empty");
    std::fs::create_dir_all(&not_a_game).unwrap();
    let reply = single(gw.add_instance("second", &not_a_game).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::NotAnInstance);

    let reply = single(
      gw.request(InstanceRequest::Rename(RenameInstanceParams {
        old_name: "first".to_string(),
        new_name: "renamed".to_string(),
      }))
      .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::Success);

    let reply = single(
      gw.request(InstanceRequest::SetDefault(SetDefaultInstanceParams {
        name: "renamed".to_string(),
      }))
      .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::Success);

    let instances = list(&gw).await;
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].name, "renamed");
    assert!(instances[0].is_default);
    assert_eq!(instances[0].version.as_deref(), Some("1.12.5"));

    let reply = single(
      gw.request(InstanceRequest::Forget(ForgetInstanceParams {
        name: "nope".to_string(),
      }))
      .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::InstanceNotFound);

    let reply = single(
      gw.request(InstanceRequest::Forget(ForgetInstanceParams {
        name: "renamed".to_string(),
      }))
      .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::Success);
    assert!(list(&gw).await.is_empty());
  }

  #[tokio::test]
  async fn test_fake_instance_result_codes() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();

    let mut params = fake(&ctx, "unknown-game", version(1, 12, Some(5)));
    params.game = "Minecraft".to_string();
    let reply = single(gw.request(InstanceRequest::Fake(params)).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::FakerUnknownGame);

    let reply = single(
      gw.request(InstanceRequest::Fake(fake(&ctx, "no-patch", version(1, 12, None))))
        .await,
    );
    match &reply {
      ActionReply::InstanceOperation(op) => {
        assert_eq!(op.result, InstanceOperationResult::FakerUnknownVersion);
        assert_eq!(
          op.details.as_deref(),
          Some("Not enough details about the game version. Major, minor, and patch must be defined.")
        );
      }
      other => panic!("unexpected reply {other:?}"),
    }

    let mut params = fake(&ctx, "old", version(1, 3, Some(1)));
    params.breaking_ground = Some(version(1, 0, Some(0)));
    let reply = single(gw.request(InstanceRequest::Fake(params)).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::FakerVersionTooOld);

    std::fs::create_dir_all(ctx.game_path("occupied")).unwrap();
    std::fs::write(ctx.game_path("occupied").join("file.txt"), "x").unwrap();
    let reply = single(
      gw.request(InstanceRequest::Fake(fake(&ctx, "occupied", version(1, 12, Some(5)))))
        .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::NewInstanceDirExists);

    assert!(list(&gw).await.is_empty());
  }

  #[tokio::test]
  async fn test_fake_instance_with_dlc_as_default() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();

    let mut params = fake(&ctx, "faked", version(1, 12, Some(5)));
    params.making_history = Some(version(1, 9, Some(1)));
    params.use_as_new_default = true;
    let reply = single(gw.request(InstanceRequest::Fake(params)).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::Success);

    let instances = list(&gw).await;
    assert_eq!(instances.len(), 1);
    assert!(instances[0].is_default);
    assert!(Dlc::MakingHistory.install_dir(&ctx.game_path("faked")).is_dir());
  }

  #[tokio::test]
  async fn test_clone_instance() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();
    gw.add_instance("source", &ctx.make_game("source")).await;

    let clone = |name: &str, source: &str| {
      InstanceRequest::Clone(CloneInstanceParams {
        source: source.to_string(),
        new_name: name.to_string(),
        new_path: ctx.game_path(name),
        share_stock_folders: false,
      })
    };

    let reply = single(gw.request(clone("copy", "source")).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::Success);
    assert!(ctx.game_path("copy").join("readme.txt").is_file());

    let reply = single(gw.request(clone("other", "missing")).await);
    assert_eq!(instance_result(&reply), InstanceOperationResult::InstanceNotFound);

    let nested = ctx.game_path("source").join("nested");
    let reply = single(
      gw.request(InstanceRequest::Clone(CloneInstanceParams {
        source: "source".to_string(),
        new_name: "nested".to_string(),
        new_path: nested.clone(),
        share_stock_folders: false,
      }))
      .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::NewInstanceDirExists);
    assert!(!nested.exists());

    let names: Vec<String> = list(&gw).await.into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["copy".to_string(), "source".to_string()]);
  }

  #[tokio::test]
  async fn test_set_compat_options() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;

    let reply = single(
      gw.request(InstanceRequest::SetCompatOptions(SetCompatOptionsParams {
        name: "main".to_string(),
        stability_tolerance: Some(ReleaseStatus::Testing),
        stability_overrides: Vec::new(),
        compatible_versions: vec![version(1, 11, None)],
      }))
      .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::Success);

    let instances = list(&gw).await;
    assert_eq!(instances[0].stability_tolerance, ReleaseStatus::Testing);
    assert_eq!(instances[0].compatible_versions, vec!["1.11".to_string()]);
  }

  // ==========================================================================
  // Registry
  // ==========================================================================

  #[tokio::test]
  async fn test_registry_call_for_unknown_instance() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();

    let reply = single(
      gw.request(RegistryRequest::AvailableModules(InstanceParams {
        instance: "ghost".to_string(),
      }))
      .await,
    );
    assert_eq!(instance_result(&reply), InstanceOperationResult::InstanceNotFound);
  }

  /// Test: prepopulate with a stale lock fails without force_lock and
  /// succeeds after exactly one retry with it.
  #[tokio::test]
  async fn test_prepopulate_force_lock() {
    let ctx = ActionTestContext::new();
    let gw = ctx.spawn();
    let dir = ctx.make_game("ksp");
    gw.add_instance("main", &dir).await;

    let lock = dir.join("CKAN").join(LOCK_FILE_NAME);
    std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
    std::fs::write(&lock, "99999").unwrap();

    let prepopulate = |force_lock| {
      RegistryRequest::Prepopulate(PrepopulateParams {
        instance: "main".to_string(),
        force_lock,
      })
    };

    let reply = single(gw.request(prepopulate(false)).await);
    assert_eq!(registry_result(&reply).0, RegistryOperationResult::RegistryInUse);
    assert!(lock.exists());

    let replies = gw.request(prepopulate(true)).await;
    assert_eq!(registry_result(&single(replies)).0, RegistryOperationResult::Success);
    // Released again once the call is over
    assert!(!lock.exists());
  }

  #[tokio::test]
  async fn test_available_modules_are_chunked() {
    let ctx = ActionTestContext::new().with_page_size(2);
    ctx.serve_modules(
      ["A", "B", "C", "D", "E"]
        .into_iter()
        .map(|id| module(id, "1.0"))
        .collect(),
    );
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;
    gw.refresh("main", false).await;

    let replies = gw
      .request(RegistryRequest::AvailableModules(InstanceParams {
        instance: "main".to_string(),
      }))
      .await;

    let pages: Vec<(Vec<String>, usize)> = replies
      .into_iter()
      .map(|r| match r {
        ActionReply::AvailableModules(AvailableModulesPage { modules, remaining }) => {
          (modules.into_iter().map(|m| m.identifier).collect(), remaining)
        }
        other => panic!("expected a page, got {other:?}"),
      })
      .collect();

    let s = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert_eq!(
      pages,
      vec![(s(&["A", "B"]), 3), (s(&["C", "D"]), 1), (s(&["E"]), 0)]
    );
  }

  #[tokio::test]
  async fn test_incompatible_modules_are_hidden() {
    let ctx = ActionTestContext::new();
    let mut old = module("Old", "1.0");
    old.ksp_version = Some(GameVersion {
      major: Some(1),
      minor: Some(2),
      patch: None,
      build: None,
    });
    let mut testing = module("Beta", "0.1");
    testing.release_status = ReleaseStatus::Testing;
    ctx.serve_modules(vec![old, testing, module("Current", "2.0")]);
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;
    gw.refresh("main", false).await;

    let replies = gw
      .request(RegistryRequest::AvailableModules(InstanceParams {
        instance: "main".to_string(),
      }))
      .await;
    let Some(ActionReply::AvailableModules(page)) = replies.first() else {
      panic!("expected a page, got {replies:?}");
    };
    let ids: Vec<&str> = page.modules.iter().map(|m| m.identifier.as_str()).collect();
    assert_eq!(ids, vec!["Current"]);
  }

  #[tokio::test]
  async fn test_refresh_reports_progress_and_counts() {
    let ctx = ActionTestContext::new();
    ctx.serve_modules(vec![module("A", "1.0")]);
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;

    let replies = gw.refresh("main", false).await;
    assert!(matches!(replies.first(), Some(ActionReply::Progress(_))));
    let (result, details) = registry_result(replies.last().unwrap());
    assert_eq!(result, RegistryOperationResult::Success);
    assert_eq!(details.as_deref(), Some("1 of 1 repositories updated"));

    let (_, details) = registry_result(gw.refresh("main", false).await.last().unwrap());
    assert_eq!(details.as_deref(), Some("0 of 1 repositories updated"));

    let (_, details) = registry_result(gw.refresh("main", true).await.last().unwrap());
    assert_eq!(details.as_deref(), Some("1 of 1 repositories updated"));
    assert_eq!(ctx.downloader.fetches.load(std::sync::atomic::Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_refresh_download_failure() {
    let ctx = ActionTestContext::new();
    // Nothing served: the stub answers 404
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;

    let reply = single(gw.refresh("main", false).await);
    assert_eq!(registry_result(&reply).0, RegistryOperationResult::DownloadFailed);
  }

  #[tokio::test]
  async fn test_compatible_releases_and_optional_dependencies() {
    let ctx = ActionTestContext::new();
    let mut app = module("App", "2.0");
    app.recommends.push(Relationship::direct("Extra"));
    let mut helper = module("Helper", "1.0");
    helper.supports.push(Relationship::direct("App"));
    ctx.serve_modules(vec![module("App", "1.0"), app, module("Extra", "1.0"), helper]);
    let gw = ctx.spawn();
    gw.add_instance("main", &ctx.make_game("ksp")).await;
    gw.refresh("main", false).await;

    let reply = single(
      gw.request(RegistryRequest::CompatibleReleases(CompatibleReleasesParams {
        instance: "main".to_string(),
        identifier: "App".to_string(),
      }))
      .await,
    );
    let ActionReply::CompatibleReleases(releases) = reply else {
      panic!("expected compatible releases, got {reply:?}");
    };
    let versions: Vec<&str> = releases.releases.iter().map(|r| r.version.as_str()).collect();
    assert_eq!(versions, vec!["2.0", "1.0"]);

    let reply = single(
      gw.request(RegistryRequest::CompatibleReleases(CompatibleReleasesParams {
        instance: "main".to_string(),
        identifier: "Nothing".to_string(),
      }))
      .await,
    );
    assert_eq!(registry_result(&reply).0, RegistryOperationResult::ModuleNotFound);

    let reply = single(
      gw.request(RegistryRequest::OptionalDependencies(OptionalDependenciesParams {
        instance: "main".to_string(),
        identifiers: vec!["App".to_string()],
      }))
      .await,
    );
    let ActionReply::OptionalDependencies(optional) = reply else {
      panic!("expected optional dependencies, got {reply:?}");
    };
    let ids = |list: &[ModuleSummary]| {
      list.iter().map(|m| m.identifier.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&optional.recommended), vec!["Extra".to_string()]);
    assert!(optional.suggested.is_empty());
    assert_eq!(ids(&optional.supporters), vec!["Helper".to_string()]);
  }
}
