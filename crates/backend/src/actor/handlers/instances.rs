//! Game instance handlers

use tracing::info;

use crate::{
  actor::action::{Action, ActionError},
  domain::{
    error::{DomainError, DomainResult},
    game::{Dlc, Game, GameVersion},
  },
  ipc::{
    ActionReply,
    instance::{
      FakeInstanceParams, InstanceInfo, InstanceOperationReply, InstanceOperationResult, InstanceRequest,
      InstancesListResult,
    },
  },
};

pub async fn handle(action: &mut Action<'_>, request: InstanceRequest) -> Result<(), ActionError> {
  let instances = &mut action.domain.instances;

  let outcome = match request {
    InstanceRequest::List => {
      let default = instances.auto_start_instance();
      let list = instances
        .instances()
        .values()
        .map(|i| InstanceInfo::new(i, default == Some(i.name.as_str())))
        .collect();
      return action
        .io
        .write(ActionReply::InstancesList(InstancesListResult { instances: list }))
        .await;
    }
    InstanceRequest::Add(p) => instances.add_instance(&p.path, &p.name).map(|i| {
      info!(instance = %i.name, "Instance added");
    }),
    InstanceRequest::Forget(p) => instances.remove_instance(&p.name),
    InstanceRequest::Rename(p) => instances.rename_instance(&p.old_name, &p.new_name),
    InstanceRequest::SetDefault(p) => instances.set_auto_start(&p.name),
    InstanceRequest::Fake(p) => {
      let reply = fake(action, p);
      return action.io.write(ActionReply::InstanceOperation(reply)).await;
    }
    InstanceRequest::Clone(p) => {
      let reply = match instances.clone_instance(&p.source, &p.new_name, &p.new_path, p.share_stock_folders) {
        Ok(()) => InstanceOperationReply::success(),
        Err(e) => reply_for(&e, InstanceOperationResult::CloneFailed),
      };
      return action.io.write(ActionReply::InstanceOperation(reply)).await;
    }
    InstanceRequest::SetCompatOptions(p) => instances.set_compat_options(&p.name, p.to_compat_options()),
  };

  let reply = match outcome {
    Ok(()) => InstanceOperationReply::success(),
    Err(e) => match InstanceOperationResult::for_error(&e) {
      Some(code) => InstanceOperationReply::failed(code, e.to_string()),
      None => return Err(e.into()),
    },
  };
  action.io.write(ActionReply::InstanceOperation(reply)).await
}

/// Reply for a failed fake or clone. Errors without their own code fall back to `fallback`.
fn reply_for(err: &DomainError, fallback: InstanceOperationResult) -> InstanceOperationReply {
  let code = InstanceOperationResult::for_error(err).unwrap_or(fallback);
  InstanceOperationReply::failed(code, err.to_string())
}

fn fake(action: &mut Action<'_>, params: FakeInstanceParams) -> InstanceOperationReply {
  let Some(game) = Game::by_short_name(&params.game) else {
    return InstanceOperationReply::failed(
      InstanceOperationResult::FakerUnknownGame,
      format!("Unknown game: {}", params.game),
    );
  };

  let version = GameVersion::from(params.version);
  if !version.is_complete() {
    return InstanceOperationReply::failed(
      InstanceOperationResult::FakerUnknownVersion,
      "Not enough details about the game version. Major, minor, and patch must be defined.",
    );
  }

  let dlcs: Vec<(Dlc, GameVersion)> = [
    (Dlc::MakingHistory, params.making_history),
    (Dlc::BreakingGround, params.breaking_ground),
  ]
  .into_iter()
  .filter_map(|(dlc, v)| v.map(|v| (dlc, GameVersion::from(v))))
  .collect();

  let instances = &mut action.domain.instances;
  let result: DomainResult<()> = instances
    .fake_instance(game, &params.name, &params.path, version, &dlcs)
    .and_then(|()| {
      if params.use_as_new_default {
        instances.set_auto_start(&params.name)
      } else {
        Ok(())
      }
    });

  match result {
    Ok(()) => InstanceOperationReply::success(),
    Err(e) => fake_failure(&e),
  }
}

/// A faked layout that is not recognised as a game is a faker failure, not a bad user path.
fn fake_failure(err: &DomainError) -> InstanceOperationReply {
  match err {
    DomainError::NotAnInstance { .. } => {
      InstanceOperationReply::failed(InstanceOperationResult::FakerFailed, err.to_string())
    }
    _ => reply_for(err, InstanceOperationResult::FakerFailed),
  }
}
