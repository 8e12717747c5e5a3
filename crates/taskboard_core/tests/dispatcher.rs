mod support;

use std::sync::Arc;
use support::{task, wait_for_requests, ScriptedRemote};
use taskboard_core::schema::builtin::task_schema;
use taskboard_core::{
    field_map, CommandDispatcher, CommandError, CommandOutcome, FieldValue, NewTask, Operation,
    RemoteErrorKind, RemoteOutcome, TaskPatch, TaskStatus, VisibleKey,
};

fn dispatcher_with(remote: &Arc<ScriptedRemote>) -> CommandDispatcher {
    CommandDispatcher::new(task_schema(), remote.clone())
}

fn visible_ids(dispatcher: &CommandDispatcher) -> Vec<u64> {
    dispatcher
        .visible()
        .iter()
        .filter_map(|entity| entity.id())
        .collect()
}

#[tokio::test]
async fn create_confirmation_leaves_exactly_one_canonical_entity() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    remote.reply(RemoteOutcome::entity(task(42, "Write docs", "pending", 5)));

    let pending = dispatcher
        .create(NewTask::new("Write docs").into_fields())
        .unwrap();
    let provisional = dispatcher.visible();
    assert_eq!(provisional.len(), 1);
    assert_eq!(provisional[0].key, VisibleKey::Provisional(pending.command()));
    assert!(provisional[0].pending);
    assert_eq!(provisional[0].text("title"), Some("Write docs"));

    let outcome = pending.resolve().await.unwrap();
    assert_eq!(outcome.entity().map(|entity| entity.id), Some(42));

    let visible = dispatcher.visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id(), Some(42));
    assert!(!visible[0].pending);
    assert_eq!(dispatcher.pending_overlays(), 0);
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(dispatcher.get(42).unwrap().text("status"), Some("pending"));
}

#[tokio::test]
async fn create_sends_defaults_for_missing_enumerated_fields() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    remote.reply(RemoteOutcome::entity(task(1, "Write docs", "pending", 1)));

    dispatcher
        .create(field_map([("title", "Write docs")]))
        .unwrap()
        .resolve()
        .await
        .unwrap();

    let requests = remote.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].op, Operation::Create);
    assert_eq!(requests[0].id, None);
    assert_eq!(
        requests[0].fields.get("status"),
        Some(&FieldValue::from("pending"))
    );
    assert_eq!(
        requests[0].fields.get("priority"),
        Some(&FieldValue::from("medium"))
    );
}

#[tokio::test]
async fn empty_title_is_rejected_before_any_mutation() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Existing", "pending", 1)])
        .unwrap();
    let before = dispatcher.visible();

    let err = dispatcher
        .create(field_map([("title", "")]))
        .err()
        .unwrap();
    match err {
        CommandError::Validation(validation) => {
            assert!(validation.has_field("title"));
            assert_eq!(validation.reason("title"), Some("Title is required"));
        }
        other => panic!("expected validation error, got {other}"),
    }

    assert_eq!(dispatcher.visible(), before);
    assert_eq!(dispatcher.in_flight(), 0);
    assert!(remote.requests().is_empty());
}

#[tokio::test]
async fn invalid_patch_is_rejected_before_any_mutation() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Existing", "pending", 1)])
        .unwrap();

    let err = dispatcher
        .update(1, field_map([("status", "archived")]))
        .err()
        .unwrap();
    assert!(matches!(err, CommandError::Validation(ref v) if v.has_field("status")));
    assert_eq!(dispatcher.pending_overlays(), 0);
    assert!(remote.requests().is_empty());
}

#[tokio::test]
async fn unknown_ids_fail_with_not_found() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);

    assert_eq!(
        dispatcher.update(9, field_map([("title", "x")])).err(),
        Some(CommandError::NotFound { id: 9 })
    );
    assert_eq!(
        dispatcher.delete(9).err(),
        Some(CommandError::NotFound { id: 9 })
    );
    assert!(remote.requests().is_empty());
}

#[tokio::test]
async fn update_is_visible_before_remote_resolves_and_rolls_back_on_failure() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Write docs", "pending", 1)])
        .unwrap();
    let gate = remote.gate();

    let pending = dispatcher
        .update(1, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    assert_eq!(
        dispatcher.get_visible(1).unwrap().text("status"),
        Some("completed")
    );

    let resolution = tokio::spawn(pending.resolve());
    wait_for_requests(&remote, 1).await;
    assert_eq!(
        dispatcher.get_visible(1).unwrap().text("status"),
        Some("completed")
    );
    assert_eq!(dispatcher.get(1).unwrap().text("status"), Some("pending"));

    gate.send(RemoteOutcome::failed(
        RemoteErrorKind::Status(500),
        "server error",
    ))
    .unwrap();
    let err = resolution.await.unwrap().unwrap_err();
    assert_eq!(
        err,
        CommandError::Remote {
            id: Some(1),
            op: Operation::Update,
            kind: RemoteErrorKind::Status(500),
            message: "server error".to_string(),
        }
    );

    let visible = dispatcher.get_visible(1).unwrap();
    assert_eq!(visible.text("status"), Some("pending"));
    assert!(!visible.pending);
    assert_eq!(dispatcher.pending_overlays(), 0);
}

#[tokio::test]
async fn double_delete_hides_entity_throughout_and_resolves_once() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![
            task(7, "Old task", "completed", 1),
            task(8, "Keep me", "pending", 1),
        ])
        .unwrap();

    let first = dispatcher.delete(7).unwrap();
    let second = dispatcher.delete(7).unwrap();
    assert_eq!(visible_ids(&dispatcher), vec![8]);
    assert_eq!(dispatcher.in_flight(), 1);

    assert_eq!(
        first.resolve().await.unwrap(),
        CommandOutcome::Superseded {
            id: 7,
            op: Operation::Delete
        }
    );
    assert!(remote.requests().is_empty());
    assert_eq!(visible_ids(&dispatcher), vec![8]);

    remote.reply(RemoteOutcome::failed(
        RemoteErrorKind::NotFound,
        "record not found: 7",
    ));
    assert_eq!(second.resolve().await.unwrap(), CommandOutcome::Deleted(7));
    assert_eq!(remote.requests().len(), 1);
    assert_eq!(visible_ids(&dispatcher), vec![8]);
    assert!(dispatcher.get(7).is_none());
    assert_eq!(dispatcher.pending_overlays(), 0);
}

#[tokio::test]
async fn failed_delete_restores_entity_unchanged() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(3, "Fragile", "pending", 1)])
        .unwrap();
    let before = dispatcher.get_visible(3).unwrap();

    let pending = dispatcher.delete(3).unwrap();
    assert!(dispatcher.get_visible(3).is_none());

    remote.reply(RemoteOutcome::failed(RemoteErrorKind::Timeout, "timed out"));
    let err = pending.resolve().await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Timeout));
    assert_eq!(dispatcher.get_visible(3), Some(before));
}

#[tokio::test]
async fn newer_update_supersedes_older_and_carries_its_changes() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Draft", "pending", 1)])
        .unwrap();

    let older = dispatcher
        .update(1, TaskPatch::status(TaskStatus::InProgress).into_fields())
        .unwrap();
    let newer = dispatcher
        .update(1, field_map([("title", "Final")]))
        .unwrap();
    let visible = dispatcher.get_visible(1).unwrap();
    assert_eq!(visible.text("status"), Some("in-progress"));
    assert_eq!(visible.text("title"), Some("Final"));
    assert_eq!(dispatcher.in_flight(), 1);

    remote.reply(RemoteOutcome::entity(task(1, "Final", "in-progress", 3)));
    let outcome = newer.resolve().await.unwrap();
    assert!(matches!(outcome, CommandOutcome::Updated(_)));
    let sent = remote.requests().remove(0);
    assert_eq!(sent.fields.get("status"), Some(&FieldValue::from("in-progress")));
    assert_eq!(sent.fields.get("title"), Some(&FieldValue::from("Final")));

    assert!(older.resolve().await.unwrap().is_superseded());
    assert_eq!(remote.requests().len(), 1);

    let confirmed = dispatcher.get(1).unwrap();
    assert_eq!(confirmed.text("title"), Some("Final"));
    assert_eq!(confirmed.updated_at, 3);
    assert_eq!(dispatcher.pending_overlays(), 0);
}

#[tokio::test]
async fn superseded_failure_does_not_roll_back_newer_state() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Draft", "pending", 1)])
        .unwrap();

    let older = dispatcher
        .update(1, TaskPatch::status(TaskStatus::InProgress).into_fields())
        .unwrap();
    let _newer = dispatcher
        .update(1, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();

    assert!(older.resolve().await.unwrap().is_superseded());
    assert!(remote.requests().is_empty());
    assert_eq!(
        dispatcher.get_visible(1).unwrap().text("status"),
        Some("completed")
    );
}

#[tokio::test]
async fn update_after_pending_delete_makes_entity_visible_again() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(5, "Undecided", "pending", 1)])
        .unwrap();

    let delete = dispatcher.delete(5).unwrap();
    assert!(dispatcher.get_visible(5).is_none());
    let update = dispatcher.update(5, field_map([("title", "Kept")])).unwrap();
    assert_eq!(dispatcher.get_visible(5).unwrap().text("title"), Some("Kept"));

    assert!(delete.resolve().await.unwrap().is_superseded());
    assert!(remote.requests().is_empty());
    remote.reply(RemoteOutcome::entity(task(5, "Kept", "pending", 2)));
    assert!(matches!(
        update.resolve().await.unwrap(),
        CommandOutcome::Updated(_)
    ));
    assert_eq!(dispatcher.get(5).unwrap().text("title"), Some("Kept"));
    let sent = remote.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].op, Operation::Update);
}

#[tokio::test]
async fn failed_create_removes_provisional_entity() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);

    let pending = dispatcher.create(NewTask::new("Doomed").into_fields()).unwrap();
    assert_eq!(dispatcher.visible().len(), 1);

    remote.reply(RemoteOutcome::failed(
        RemoteErrorKind::Rejected,
        "title has already been taken",
    ));
    let err = pending.resolve().await.unwrap_err();
    assert!(matches!(
        err,
        CommandError::Remote {
            id: None,
            op: Operation::Create,
            kind: RemoteErrorKind::Rejected,
            ..
        }
    ));
    assert!(dispatcher.visible().is_empty());
    assert_eq!(dispatcher.pending_overlays(), 0);
}

#[tokio::test]
async fn create_answered_with_retired_id_is_malformed() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(4, "Gone soon", "pending", 1)])
        .unwrap();
    remote.reply(RemoteOutcome::deleted(4));
    dispatcher.delete(4).unwrap().resolve().await.unwrap();

    remote.reply(RemoteOutcome::entity(task(4, "Reused", "pending", 9)));
    let err = dispatcher
        .create(NewTask::new("Reused").into_fields())
        .unwrap()
        .resolve()
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Malformed));
    assert!(dispatcher.visible().is_empty());
}

#[tokio::test]
async fn stale_confirmation_keeps_newer_store_value() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Current", "pending", 10)])
        .unwrap();

    remote.reply(RemoteOutcome::entity(task(1, "Older", "pending", 4)));
    dispatcher
        .update(1, field_map([("title", "Older")]))
        .unwrap()
        .resolve()
        .await
        .unwrap();

    let confirmed = dispatcher.get(1).unwrap();
    assert_eq!(confirmed.text("title"), Some("Current"));
    assert_eq!(confirmed.updated_at, 10);
}

#[tokio::test]
async fn subscribers_see_every_visible_change() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    let mut rx = dispatcher.subscribe();

    dispatcher
        .replace_all(vec![task(1, "Watch me", "pending", 1)])
        .unwrap();
    assert!(rx.has_changed().unwrap());
    let revision = rx.borrow_and_update().revision;

    remote.reply(RemoteOutcome::failed(RemoteErrorKind::Transport, "offline"));
    let pending = dispatcher
        .update(1, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    assert!(rx.has_changed().unwrap());
    {
        let snapshot = rx.borrow_and_update();
        assert!(snapshot.revision > revision);
        assert_eq!(snapshot.entities[0].text("status"), Some("completed"));
    }

    pending.resolve().await.unwrap_err();
    assert!(rx.has_changed().unwrap());
    assert_eq!(
        rx.borrow_and_update().entities[0].text("status"),
        Some("pending")
    );
}

#[tokio::test]
async fn refresh_replaces_store_and_keeps_in_flight_overlays() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Local", "pending", 1)])
        .unwrap();

    let _pending = dispatcher
        .update(1, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    remote.set_collection(vec![
        task(1, "Renamed elsewhere", "pending", 5),
        task(2, "New elsewhere", "pending", 5),
    ]);

    assert_eq!(dispatcher.refresh().await.unwrap(), 2);
    let visible = dispatcher.visible();
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[0].text("title"), Some("Renamed elsewhere"));
    assert_eq!(visible[0].text("status"), Some("completed"));
    assert!(visible[0].pending);
    assert_eq!(dispatcher.in_flight(), 1);
}

#[tokio::test]
async fn command_superseded_while_in_flight_ignores_its_reply() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Draft", "pending", 1)])
        .unwrap();
    let gate = remote.gate();

    let older = dispatcher
        .update(1, TaskPatch::status(TaskStatus::InProgress).into_fields())
        .unwrap();
    let resolution = tokio::spawn(older.resolve());
    wait_for_requests(&remote, 1).await;

    let newer = dispatcher
        .update(1, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    gate.send(RemoteOutcome::entity(task(1, "Draft", "in-progress", 2)))
        .unwrap();
    assert!(resolution.await.unwrap().unwrap().is_superseded());
    assert_eq!(
        dispatcher.get_visible(1).unwrap().text("status"),
        Some("completed")
    );
    assert_eq!(dispatcher.get(1).unwrap().text("status"), Some("pending"));

    remote.reply(RemoteOutcome::entity(task(1, "Draft", "completed", 3)));
    newer.resolve().await.unwrap();
    assert_eq!(dispatcher.get(1).unwrap().text("status"), Some("completed"));
    assert_eq!(remote.requests().len(), 2);
}

#[tokio::test]
async fn dropping_unresolved_update_releases_its_overlay() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Draft", "pending", 1)])
        .unwrap();

    let pending = dispatcher
        .update(1, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    assert_eq!(dispatcher.in_flight(), 1);
    drop(pending);

    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(dispatcher.pending_overlays(), 0);
    assert_eq!(
        dispatcher.get_visible(1).unwrap().text("status"),
        Some("pending")
    );
    assert!(remote.requests().is_empty());
}

#[tokio::test]
async fn dropping_superseded_command_keeps_newer_overlay() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Draft", "pending", 1)])
        .unwrap();

    let older = dispatcher.delete(1).unwrap();
    let _newer = dispatcher.update(1, field_map([("title", "Kept")])).unwrap();
    drop(older);

    assert_eq!(dispatcher.in_flight(), 1);
    assert_eq!(dispatcher.get_visible(1).unwrap().text("title"), Some("Kept"));
}

#[tokio::test]
async fn dropping_unresolved_create_removes_provisional_entity() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);

    let pending = dispatcher.create(NewTask::new("Abandoned").into_fields()).unwrap();
    assert_eq!(dispatcher.visible().len(), 1);
    drop(pending);

    assert!(dispatcher.visible().is_empty());
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn cancelled_resolution_releases_optimistic_state() {
    let remote = Arc::new(ScriptedRemote::new());
    let dispatcher = dispatcher_with(&remote);
    dispatcher
        .replace_all(vec![task(1, "Draft", "pending", 1)])
        .unwrap();
    let _gate = remote.gate();

    let pending = dispatcher
        .update(1, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    let resolution = tokio::spawn(pending.resolve());
    wait_for_requests(&remote, 1).await;
    resolution.abort();
    assert!(resolution.await.unwrap_err().is_cancelled());

    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(
        dispatcher.get_visible(1).unwrap().text("status"),
        Some("pending")
    );
}
