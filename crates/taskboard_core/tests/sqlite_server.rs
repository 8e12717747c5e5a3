use std::sync::Arc;
use std::time::Duration;
use taskboard_core::model::about::default_about_fields;
use taskboard_core::schema::builtin::{about_schema, task_schema};
use taskboard_core::{
    field_map, About, AboutPatch, CommandDispatcher, CommandError, CommandOutcome, NewTask,
    RemoteErrorKind, RemoteFailure, RemoteOutcome, RemoteRequest, RemoteSyncClient,
    SqliteServer, SyncConfig, Task, TaskPatch, TaskPriority, TaskStatus, ABOUT_COLLECTION,
    TASKS_COLLECTION,
};

fn server() -> Arc<SqliteServer> {
    let registry = SyncConfig::builtin().schema_registry().unwrap();
    Arc::new(SqliteServer::in_memory(registry).unwrap())
}

fn tasks(server: &Arc<SqliteServer>) -> CommandDispatcher {
    CommandDispatcher::new(task_schema(), server.clone())
}

async fn create_task(dispatcher: &CommandDispatcher, title: &str) -> u64 {
    match dispatcher
        .create(NewTask::new(title).into_fields())
        .unwrap()
        .resolve()
        .await
        .unwrap()
    {
        CommandOutcome::Created(entity) => entity.id,
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn created_task_gets_server_id_and_defaults() {
    let server = server();
    let dispatcher = tasks(&server);

    let id = create_task(&dispatcher, "Write docs").await;

    let task = Task::from_entity(&dispatcher.get(id).unwrap()).unwrap();
    assert_eq!(task.title, "Write docs");
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.priority, TaskPriority::Medium);
    assert_eq!(server.list(TASKS_COLLECTION).unwrap().len(), 1);
}

#[tokio::test]
async fn deleted_ids_are_never_reused() {
    let server = server();
    let dispatcher = tasks(&server);

    let first = create_task(&dispatcher, "first").await;
    let second = create_task(&dispatcher, "second").await;
    dispatcher.delete(second).unwrap().resolve().await.unwrap();
    let third = create_task(&dispatcher, "third").await;

    assert!(second > first);
    assert!(third > second);
    assert!(server.get(TASKS_COLLECTION, second).unwrap().is_none());
}

#[tokio::test]
async fn update_then_confirm_bumps_updated_at_monotonically() {
    let server = server();
    let dispatcher = tasks(&server);
    let id = create_task(&dispatcher, "Write docs").await;
    let before = dispatcher.get(id).unwrap();

    let outcome = dispatcher
        .update(id, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap()
        .resolve()
        .await
        .unwrap();

    let after = outcome.entity().unwrap();
    assert_eq!(after.text("status"), Some("completed"));
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(dispatcher.get(id).as_ref(), Some(after));
}

#[tokio::test]
async fn injected_failure_rolls_back_update() {
    let server = server();
    let dispatcher = tasks(&server);
    let id = create_task(&dispatcher, "Write docs").await;

    server.fail_next(RemoteFailure::new(RemoteErrorKind::Status(500), "boom"));
    let err = dispatcher
        .update(id, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap()
        .resolve()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CommandError::Remote {
            id: Some(_),
            kind: RemoteErrorKind::Status(500),
            ..
        }
    ));
    assert_eq!(
        dispatcher.get_visible(id).unwrap().text("status"),
        Some("pending")
    );
    let stored = server.get(TASKS_COLLECTION, id).unwrap().unwrap();
    assert_eq!(stored.text("status"), Some("pending"));
}

#[tokio::test]
async fn deleting_missing_record_on_server_still_confirms() {
    let server = server();
    let dispatcher = tasks(&server);
    let id = create_task(&dispatcher, "Twice").await;

    let outcome = server.send(RemoteRequest::delete(TASKS_COLLECTION, id)).await;
    assert!(outcome.is_confirmed());

    let outcome = dispatcher.delete(id).unwrap().resolve().await.unwrap();
    assert_eq!(outcome, CommandOutcome::Deleted(id));
    assert!(dispatcher.visible().is_empty());
}

#[tokio::test]
async fn server_rejects_payloads_that_break_field_rules() {
    let server = server();
    let long_title = "x".repeat(101);

    let outcome = server
        .send(RemoteRequest::create(
            TASKS_COLLECTION,
            field_map([("title", long_title.as_str())]),
        ))
        .await;
    match outcome {
        RemoteOutcome::Failed(failure) => {
            assert_eq!(failure.kind, RemoteErrorKind::Rejected);
            assert!(failure.message.contains("title"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(server.list(TASKS_COLLECTION).unwrap().is_empty());
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() {
    let outcome = server()
        .send(RemoteRequest::update(
            TASKS_COLLECTION,
            77,
            field_map([("title", "ghost")]),
        ))
        .await;
    match outcome {
        RemoteOutcome::Failed(failure) => assert_eq!(failure.kind, RemoteErrorKind::NotFound),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn superseded_update_never_overwrites_newer_value_on_server() {
    let server = server();
    let dispatcher = tasks(&server);
    let id = create_task(&dispatcher, "Write docs").await;

    let older = dispatcher
        .update(id, TaskPatch::status(TaskStatus::InProgress).into_fields())
        .unwrap();
    let newer = dispatcher
        .update(id, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    newer.resolve().await.unwrap();
    assert!(older.resolve().await.unwrap().is_superseded());

    let stored = server.get(TASKS_COLLECTION, id).unwrap();
    assert_eq!(stored, dispatcher.get(id));
    assert_eq!(stored.unwrap().text("status"), Some("completed"));
}

#[tokio::test]
async fn superseded_delete_never_removes_row_on_server() {
    let server = server();
    let dispatcher = tasks(&server);
    let id = create_task(&dispatcher, "Undecided").await;

    let delete = dispatcher.delete(id).unwrap();
    let update = dispatcher
        .update(id, field_map([("title", "Kept")]))
        .unwrap();
    update.resolve().await.unwrap();
    assert!(delete.resolve().await.unwrap().is_superseded());

    let stored = server.get(TASKS_COLLECTION, id).unwrap();
    assert_eq!(stored, dispatcher.get(id));
    assert_eq!(stored.unwrap().text("title"), Some("Kept"));
    assert_eq!(dispatcher.visible().len(), 1);
}

#[tokio::test]
async fn about_record_is_created_once_and_editable() {
    let server = server();
    let first = server
        .first_or_create(ABOUT_COLLECTION, default_about_fields())
        .unwrap();
    let again = server.about().unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(first.text("title"), Some("Default Title"));

    let dispatcher = CommandDispatcher::new(about_schema(), server.clone());
    dispatcher.refresh().await.unwrap();
    let patch = AboutPatch {
        title: Some("About Us".to_string()),
        ..AboutPatch::default()
    };
    dispatcher
        .update(first.id, patch.into_fields())
        .unwrap()
        .resolve()
        .await
        .unwrap();

    let about = About::from_entity(&server.about().unwrap()).unwrap();
    assert_eq!(about.title, "About Us");
    assert_eq!(about.description, "Default Description");
}

#[tokio::test]
async fn seeded_data_loads_through_refresh() {
    let server = server();
    server.seed_demo_data().unwrap();
    let dispatcher = tasks(&server);

    assert_eq!(dispatcher.refresh().await.unwrap(), 5);
    let titles: Vec<_> = dispatcher
        .visible()
        .iter()
        .filter_map(|entity| entity.text("title").map(str::to_string))
        .collect();
    assert_eq!(titles[0], "Implement user authentication");
    assert_eq!(titles[4], "Fix responsive layout issues");
}

#[tokio::test]
async fn file_backed_server_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server.db");
    let registry = SyncConfig::builtin().schema_registry().unwrap();

    let server = SqliteServer::open(&path, registry.clone()).unwrap();
    server.seed_demo_data().unwrap();
    drop(server);

    let server = SqliteServer::open(&path, registry).unwrap();
    assert_eq!(server.seed_demo_data().unwrap(), 0);
    assert_eq!(server.fetch_all(TASKS_COLLECTION).await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_server_keeps_optimistic_value_until_confirmation() {
    let registry = SyncConfig::builtin().schema_registry().unwrap();
    let server = Arc::new(
        SqliteServer::in_memory(registry)
            .unwrap()
            .with_latency(Duration::from_millis(50)),
    );
    server.seed_demo_data().unwrap();
    let dispatcher = Arc::new(tasks(&server));
    dispatcher.refresh().await.unwrap();
    let id = dispatcher.visible()[2].id().unwrap();

    let pending = dispatcher
        .update(id, TaskPatch::status(TaskStatus::Completed).into_fields())
        .unwrap();
    let resolution = tokio::spawn(pending.resolve());
    assert_eq!(
        dispatcher.get_visible(id).unwrap().text("status"),
        Some("completed")
    );
    assert_eq!(dispatcher.get(id).unwrap().text("status"), Some("pending"));

    resolution.await.unwrap().unwrap();
    assert_eq!(dispatcher.get(id).unwrap().text("status"), Some("completed"));
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn unknown_collection_refresh_fails_with_not_found() {
    let server = server();
    let schema = taskboard_core::EntitySchema::new("users", "user", Vec::new()).unwrap();
    let dispatcher = CommandDispatcher::new(schema, server.clone());

    match dispatcher.refresh().await.unwrap_err() {
        CommandError::Refresh(failure) => assert_eq!(failure.kind, RemoteErrorKind::NotFound),
        other => panic!("unexpected error {other}"),
    }
}
