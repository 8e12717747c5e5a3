//! In-process reference server backed by SQLite.
//!
//! # Responsibility
//! - Play the remote API: assign ids, stamp times, validate payloads.
//! - Offer fault and latency injection for exercising rollback paths.
//!
//! # Invariants
//! - Ids come from `AUTOINCREMENT` and are never reused.
//! - `updated_at` of a stored record never decreases.
//! - Every request is answered with a `RemoteOutcome`; storage errors map to
//!   `Status(500)`.

use super::{
    Operation, RemoteErrorKind, RemoteFailure, RemoteOutcome, RemoteRequest, RemoteSyncClient,
};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::about::{default_about_fields, ABOUT_COLLECTION};
use crate::model::entity::{field_map, merge_fields, Entity, EntityId, FieldMap};
use crate::model::task::TASKS_COLLECTION;
use crate::repo::record_repo::{RecordRepository, RepoError, SqliteRecordRepository};
use crate::schema::{EntitySchema, SchemaRegistry, ValidationError};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::{Duration, Instant};

const DEMO_TASKS: [(&str, &str, &str, &str); 5] = [
    (
        "Implement user authentication",
        "Add login and registration functionality to the application",
        "completed",
        "high",
    ),
    (
        "Design dashboard layout",
        "Create wireframes and mockups for the main dashboard",
        "in-progress",
        "medium",
    ),
    (
        "Optimize database queries",
        "Improve performance of slow database operations",
        "pending",
        "high",
    ),
    (
        "Write documentation",
        "Document API endpoints and usage instructions",
        "pending",
        "low",
    ),
    (
        "Fix responsive layout issues",
        "Address UI problems on mobile devices",
        "in-progress",
        "medium",
    ),
];

const DEMO_ABOUT: (&str, &str, &str) = (
    "About Our Application",
    "A Remix application with Rails API backend",
    "<p>This is the rich text content that can be edited with TipTap editor.</p>",
);

/// Direct (non-remote) server API error.
#[derive(Debug)]
pub enum ServerError {
    Db(DbError),
    Repo(RepoError),
    Validation(ValidationError),
    UnknownCollection(String),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UnknownCollection(name) => write!(f, "unknown collection `{name}`"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::UnknownCollection(_) => None,
        }
    }
}

impl From<DbError> for ServerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for ServerError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<ValidationError> for ServerError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// SQLite implementation of [`RemoteSyncClient`].
pub struct SqliteServer {
    conn: Mutex<Connection>,
    registry: SchemaRegistry,
    injected: Mutex<VecDeque<RemoteFailure>>,
    latency: Option<Duration>,
}

impl SqliteServer {
    /// Opens (or creates) a file-backed server database.
    pub fn open(path: impl AsRef<Path>, registry: SchemaRegistry) -> Result<Self, ServerError> {
        Ok(Self::with_connection(open_db(path)?, registry))
    }

    pub fn in_memory(registry: SchemaRegistry) -> Result<Self, ServerError> {
        Ok(Self::with_connection(open_db_in_memory()?, registry))
    }

    fn with_connection(conn: Connection, registry: SchemaRegistry) -> Self {
        Self {
            conn: Mutex::new(conn),
            registry,
            injected: Mutex::new(VecDeque::new()),
            latency: None,
        }
    }

    /// Delays every remote call by `latency` before it is handled.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next remote call fail with `failure` without touching
    /// storage. Queued failures are consumed in order.
    pub fn fail_next(&self, failure: RemoteFailure) {
        self.injected.lock().push_back(failure);
    }

    pub fn list(&self, collection: &str) -> Result<Vec<Entity>, ServerError> {
        self.schema(collection)?;
        let conn = self.conn.lock();
        Ok(SqliteRecordRepository::new(&conn).list(collection)?)
    }

    pub fn get(&self, collection: &str, id: EntityId) -> Result<Option<Entity>, ServerError> {
        self.schema(collection)?;
        let conn = self.conn.lock();
        Ok(SqliteRecordRepository::new(&conn).get(collection, id)?)
    }

    /// Returns the lowest-id record of `collection`, creating it from
    /// `defaults` when the collection is empty.
    pub fn first_or_create(
        &self,
        collection: &str,
        defaults: FieldMap,
    ) -> Result<Entity, ServerError> {
        let schema = self.schema(collection)?;
        let conn = self.conn.lock();
        let repo = SqliteRecordRepository::new(&conn);
        if let Some(existing) = repo.first(collection)? {
            return Ok(existing);
        }
        let fields = schema.validate_create(&defaults)?;
        let created = repo.insert(collection, &fields, now_ms())?;
        info!(
            "event=server_first_or_create module=server status=created collection={} id={}",
            collection, created.id
        );
        Ok(created)
    }

    /// Loads the demo tasks and about record into empty collections.
    ///
    /// Returns the number of inserted records.
    pub fn seed_demo_data(&self) -> Result<usize, ServerError> {
        let mut inserted = 0;
        if self.list(TASKS_COLLECTION)?.is_empty() {
            for (title, description, status, priority) in DEMO_TASKS {
                self.insert_validated(
                    TASKS_COLLECTION,
                    field_map([
                        ("title", title),
                        ("description", description),
                        ("status", status),
                        ("priority", priority),
                    ]),
                )?;
                inserted += 1;
            }
        }
        if self.list(ABOUT_COLLECTION)?.is_empty() {
            let (title, description, content) = DEMO_ABOUT;
            self.insert_validated(
                ABOUT_COLLECTION,
                field_map([
                    ("title", title),
                    ("description", description),
                    ("content", content),
                ]),
            )?;
            inserted += 1;
        }
        info!(
            "event=server_seed module=server status=ok inserted={}",
            inserted
        );
        Ok(inserted)
    }

    /// The about record, created with default fields on first read.
    pub fn about(&self) -> Result<Entity, ServerError> {
        self.first_or_create(ABOUT_COLLECTION, default_about_fields())
    }

    fn insert_validated(&self, collection: &str, fields: FieldMap) -> Result<Entity, ServerError> {
        let fields = self.schema(collection)?.validate_create(&fields)?;
        let conn = self.conn.lock();
        Ok(SqliteRecordRepository::new(&conn).insert(collection, &fields, now_ms())?)
    }

    fn schema(&self, collection: &str) -> Result<&EntitySchema, ServerError> {
        self.registry
            .get(collection)
            .ok_or_else(|| ServerError::UnknownCollection(collection.to_string()))
    }

    fn handle(&self, request: &RemoteRequest) -> RemoteOutcome {
        let Some(schema) = self.registry.get(&request.collection) else {
            return RemoteOutcome::failed(
                RemoteErrorKind::NotFound,
                format!("unknown collection `{}`", request.collection),
            );
        };
        let conn = self.conn.lock();
        let repo = SqliteRecordRepository::new(&conn);

        match (request.op, request.id) {
            (Operation::Create, _) => match schema.validate_create(&request.fields) {
                Ok(fields) => repo
                    .insert(&request.collection, &fields, now_ms())
                    .map_or_else(storage_failure, RemoteOutcome::entity),
                Err(err) => RemoteOutcome::failed(RemoteErrorKind::Rejected, err.to_string()),
            },
            (Operation::Update, Some(id)) => {
                if let Err(err) = schema.validate_patch(&request.fields) {
                    return RemoteOutcome::failed(RemoteErrorKind::Rejected, err.to_string());
                }
                let existing = match repo.get(&request.collection, id) {
                    Ok(Some(existing)) => existing,
                    Ok(None) => return not_found(id),
                    Err(err) => return storage_failure(err),
                };
                let merged = merge_fields(&existing.fields, &request.fields);
                match schema.validate_create(&merged) {
                    Ok(fields) => repo
                        .update(&request.collection, id, &fields, now_ms())
                        .map_or_else(storage_failure, RemoteOutcome::entity),
                    Err(err) => RemoteOutcome::failed(RemoteErrorKind::Rejected, err.to_string()),
                }
            }
            (Operation::Delete, Some(id)) => match repo.delete(&request.collection, id) {
                Ok(()) => RemoteOutcome::deleted(id),
                Err(err) => storage_failure(err),
            },
            (op, None) => RemoteOutcome::failed(
                RemoteErrorKind::Malformed,
                format!("{op} request without target id"),
            ),
        }
    }
}

#[async_trait]
impl RemoteSyncClient for SqliteServer {
    async fn send(&self, request: RemoteRequest) -> RemoteOutcome {
        let started_at = Instant::now();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self.injected.lock().pop_front();
        let outcome = match injected {
            Some(failure) => RemoteOutcome::Failed(failure),
            None => self.handle(&request),
        };

        match &outcome {
            RemoteOutcome::Failed(failure) => warn!(
                "event=server_request module=server status=error op={} collection={} id={} request_id={} duration_ms={} error_kind={}",
                request.op,
                request.collection,
                request.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                request.request_id,
                started_at.elapsed().as_millis(),
                failure.kind
            ),
            RemoteOutcome::Confirmed(_) => info!(
                "event=server_request module=server status=ok op={} collection={} id={} request_id={} duration_ms={}",
                request.op,
                request.collection,
                request.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                request.request_id,
                started_at.elapsed().as_millis()
            ),
        }
        outcome
    }

    async fn fetch_all(&self, collection: &str) -> Result<Vec<Entity>, RemoteFailure> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(failure) = self.injected.lock().pop_front() {
            return Err(failure);
        }
        self.list(collection).map_err(|err| match err {
            ServerError::UnknownCollection(_) => {
                RemoteFailure::new(RemoteErrorKind::NotFound, err.to_string())
            }
            other => RemoteFailure::new(RemoteErrorKind::Status(500), other.to_string()),
        })
    }
}

fn not_found(id: EntityId) -> RemoteOutcome {
    RemoteOutcome::failed(RemoteErrorKind::NotFound, format!("record not found: {id}"))
}

fn storage_failure(err: RepoError) -> RemoteOutcome {
    match err {
        RepoError::NotFound(id) => not_found(id),
        other => RemoteOutcome::failed(RemoteErrorKind::Status(500), other.to_string()),
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
