//! Optimistic command dispatcher for one collection.
//!
//! # Responsibility
//! - Validate commands, apply optimistic state and build the remote call.
//! - Reconcile remote outcomes into the record store or roll back.
//! - Publish the visible sequence to subscribers.
//!
//! # Invariants
//! - Issuing is synchronous; the remote call runs inside
//!   [`PendingCommand::resolve`].
//! - Store and overlay share one lock that is never held across `.await`.
//! - A command missing from the in-flight table was superseded: it sends
//!   nothing if not yet started, and its outcome is ignored otherwise.

use crate::model::entity::{Entity, EntityId, FieldMap};
use crate::remote::{
    Operation, RemoteErrorKind, RemoteFailure, RemoteOutcome, RemoteRequest, RemoteSuccess,
    RemoteSyncClient,
};
use crate::schema::EntitySchema;
use crate::store::overlay::OptimisticOverlay;
use crate::store::record_store::{RecordStore, StoreError, Upsert};
use crate::store::VisibleEntity;
use crate::sync::command::{CommandError, CommandId, CommandOutcome};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Visible sequence as published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleSnapshot {
    /// Bumped on every visible change.
    pub revision: u64,
    pub entities: Vec<VisibleEntity>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    op: Operation,
    id: Option<EntityId>,
}

#[derive(Debug, Default)]
struct SyncState {
    store: RecordStore,
    overlay: OptimisticOverlay,
    next_command: u64,
    in_flight: BTreeMap<CommandId, InFlight>,
}

impl SyncState {
    fn next_command_id(&mut self) -> CommandId {
        self.next_command += 1;
        CommandId::new(self.next_command)
    }

    /// Registers `command` for `id` and drops whichever command owned it.
    fn take_over(&mut self, command: CommandId, inflight: InFlight, superseded: Option<CommandId>) {
        if let Some(previous) = superseded {
            self.in_flight.remove(&previous);
            info!(
                "event=command_supersede module=sync status=ok command={} superseded_by={} op={} id={}",
                previous,
                command,
                inflight.op,
                display_id(inflight.id)
            );
        }
        self.in_flight.insert(command, inflight);
    }
}

struct Shared {
    collection: String,
    state: Mutex<SyncState>,
    visible_tx: watch::Sender<VisibleSnapshot>,
}

impl Shared {
    fn publish(&self, state: &SyncState) {
        let entities = state.overlay.visible(&state.store);
        self.visible_tx.send_if_modified(|snapshot| {
            if snapshot.entities == entities {
                return false;
            }
            snapshot.revision += 1;
            snapshot.entities = entities;
            true
        });
    }

    fn owns(&self, command: CommandId) -> bool {
        self.state.lock().in_flight.contains_key(&command)
    }

    /// Drops the optimistic state of an abandoned command.
    fn release(&self, command: CommandId, op: Operation, id: Option<EntityId>) {
        let mut state = self.state.lock();
        if state.in_flight.remove(&command).is_none() {
            return;
        }
        match id {
            Some(id) => {
                state.overlay.clear_owned(id, command);
            }
            None => {
                state.overlay.remove_provisional(command);
            }
        }
        self.publish(&state);
        warn!(
            "event=command_abandon module=sync status=released collection={} command={} op={} id={}",
            self.collection,
            command,
            op,
            display_id(id)
        );
    }

    fn reconcile(
        &self,
        command: CommandId,
        op: Operation,
        id: Option<EntityId>,
        outcome: RemoteOutcome,
    ) -> Result<CommandOutcome, CommandError> {
        let mut state = self.state.lock();
        let still_owner = state.in_flight.remove(&command).is_some();

        let result = match (op, id) {
            (_, Some(id)) if !still_owner => {
                debug!(
                    "event=command_resolve module=sync status=superseded command={} op={} id={}",
                    command, op, id
                );
                return Ok(CommandOutcome::Superseded { id, op });
            }
            (Operation::Create, _) => reconcile_create(&mut state, command, outcome),
            (Operation::Update, Some(id)) => reconcile_update(&mut state, command, id, outcome),
            (Operation::Delete, Some(id)) => reconcile_delete(&mut state, command, id, outcome),
            (op, None) => Err(CommandError::remote(
                None,
                op,
                RemoteFailure::new(RemoteErrorKind::Malformed, "command without target id"),
            )),
        };

        self.publish(&state);
        result
    }
}

fn reconcile_create(
    state: &mut SyncState,
    command: CommandId,
    outcome: RemoteOutcome,
) -> Result<CommandOutcome, CommandError> {
    state.overlay.remove_provisional(command);
    let entity = match outcome {
        RemoteOutcome::Confirmed(RemoteSuccess::Entity(entity)) => entity,
        RemoteOutcome::Confirmed(RemoteSuccess::Deleted(other)) => {
            return Err(CommandError::remote(
                None,
                Operation::Create,
                RemoteFailure::new(
                    RemoteErrorKind::Malformed,
                    format!("create answered with deletion of {other}"),
                ),
            ))
        }
        RemoteOutcome::Failed(failure) => {
            return Err(CommandError::remote(None, Operation::Create, failure))
        }
    };

    match state.store.upsert_confirmed(entity.clone()) {
        Ok(_) => Ok(CommandOutcome::Created(entity)),
        Err(StoreError::RetiredId(reused) | StoreError::DuplicateId(reused)) => {
            Err(CommandError::remote(
                None,
                Operation::Create,
                RemoteFailure::new(
                    RemoteErrorKind::Malformed,
                    format!("create answered with reused id {reused}"),
                ),
            ))
        }
    }
}

fn reconcile_update(
    state: &mut SyncState,
    command: CommandId,
    id: EntityId,
    outcome: RemoteOutcome,
) -> Result<CommandOutcome, CommandError> {
    state.overlay.clear_owned(id, command);
    let entity = match outcome {
        RemoteOutcome::Confirmed(RemoteSuccess::Entity(entity)) if entity.id == id => entity,
        RemoteOutcome::Confirmed(other) => {
            return Err(CommandError::remote(
                Some(id),
                Operation::Update,
                RemoteFailure::new(
                    RemoteErrorKind::Malformed,
                    format!("update answered with unexpected result {other:?}"),
                ),
            ))
        }
        RemoteOutcome::Failed(failure) => {
            return Err(CommandError::remote(Some(id), Operation::Update, failure))
        }
    };

    if state.store.upsert_confirmed(entity.clone())? == Upsert::Stale {
        debug!(
            "event=store_upsert module=sync status=stale id={} updated_at={}",
            id, entity.updated_at
        );
    }
    Ok(CommandOutcome::Updated(entity))
}

fn reconcile_delete(
    state: &mut SyncState,
    command: CommandId,
    id: EntityId,
    outcome: RemoteOutcome,
) -> Result<CommandOutcome, CommandError> {
    state.overlay.clear_owned(id, command);
    match outcome {
        RemoteOutcome::Confirmed(RemoteSuccess::Deleted(_)) => {}
        // Already gone on the server; the entity is deleted either way.
        RemoteOutcome::Failed(RemoteFailure {
            kind: RemoteErrorKind::NotFound,
            ..
        }) => {}
        RemoteOutcome::Confirmed(RemoteSuccess::Entity(entity)) => {
            return Err(CommandError::remote(
                Some(id),
                Operation::Delete,
                RemoteFailure::new(
                    RemoteErrorKind::Malformed,
                    format!("delete answered with entity {}", entity.id),
                ),
            ))
        }
        RemoteOutcome::Failed(failure) => {
            return Err(CommandError::remote(Some(id), Operation::Delete, failure))
        }
    }
    state.store.remove_confirmed(id);
    Ok(CommandOutcome::Deleted(id))
}

/// An issued command whose remote call has not run yet.
///
/// Dropping it unresolved (or dropping the `resolve` future mid-call) releases
/// its optimistic state, reverting the id to its last confirmed value.
#[must_use = "the remote call only runs when the command is resolved"]
pub struct PendingCommand {
    command: CommandId,
    op: Operation,
    id: Option<EntityId>,
    shared: Arc<Shared>,
    call: BoxFuture<'static, RemoteOutcome>,
    settled: bool,
}

impl PendingCommand {
    pub fn command(&self) -> CommandId {
        self.command
    }

    pub fn op(&self) -> Operation {
        self.op
    }

    /// Target id; `None` for creates.
    pub fn target(&self) -> Option<EntityId> {
        self.id
    }

    /// Performs the remote call and reconciles its outcome.
    ///
    /// A command superseded before this is awaited resolves as
    /// `Superseded` without contacting the remote side.
    ///
    /// # Errors
    /// - `CommandError::Remote` after the optimistic state was rolled back.
    /// - `CommandError::Store` when a confirmed value breaks store invariants.
    pub async fn resolve(mut self) -> Result<CommandOutcome, CommandError> {
        let (command, op, id) = (self.command, self.op, self.id);
        if let Some(id) = id {
            if !self.shared.owns(command) {
                self.settled = true;
                debug!(
                    "event=command_skip module=sync status=superseded command={} op={} id={}",
                    command, op, id
                );
                return Ok(CommandOutcome::Superseded { id, op });
            }
        }

        let started_at = Instant::now();
        let outcome = (&mut self.call).await;
        self.settled = true;
        let result = self.shared.reconcile(command, op, id, outcome);

        match &result {
            Ok(CommandOutcome::Superseded { .. }) => {}
            Ok(done) => info!(
                "event=command_confirm module=sync status=ok collection={} command={} op={} id={} duration_ms={}",
                self.shared.collection,
                command,
                op,
                display_id(done.entity().map(|entity| entity.id).or(id)),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=command_fail module=sync status=error collection={} command={} op={} id={} duration_ms={} error_kind={}",
                self.shared.collection,
                command,
                op,
                display_id(id),
                started_at.elapsed().as_millis(),
                err.remote_kind()
                    .map_or_else(|| "store".to_string(), |kind| kind.to_string())
            ),
        }
        result
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.release(self.command, self.op, self.id);
        }
    }
}

/// Dispatches optimistic commands for one collection.
pub struct CommandDispatcher {
    schema: Arc<EntitySchema>,
    client: Arc<dyn RemoteSyncClient>,
    shared: Arc<Shared>,
}

impl CommandDispatcher {
    /// Creates a dispatcher with an empty record store.
    pub fn new(schema: EntitySchema, client: Arc<dyn RemoteSyncClient>) -> Self {
        let (visible_tx, _) = watch::channel(VisibleSnapshot::default());
        let shared = Shared {
            collection: schema.collection().to_string(),
            state: Mutex::new(SyncState::default()),
            visible_tx,
        };
        Self {
            schema: Arc::new(schema),
            client,
            shared: Arc::new(shared),
        }
    }

    pub fn collection(&self) -> &str {
        self.schema.collection()
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Replaces the confirmed collection; in-flight overlays stay in place.
    pub fn replace_all(&self, entities: Vec<Entity>) -> Result<(), CommandError> {
        let mut state = self.shared.state.lock();
        state.store.replace_all(entities)?;
        self.shared.publish(&state);
        Ok(())
    }

    /// Loads the full collection from the remote side.
    ///
    /// Returns the number of confirmed entities now held.
    pub async fn refresh(&self) -> Result<usize, CommandError> {
        let started_at = Instant::now();
        let entities = self
            .client
            .fetch_all(self.collection())
            .await
            .map_err(|failure| {
                warn!(
                    "event=collection_refresh module=sync status=error collection={} error_kind={}",
                    self.collection(),
                    failure.kind
                );
                CommandError::Refresh(failure)
            })?;
        let count = entities.len();
        self.replace_all(entities)?;
        info!(
            "event=collection_refresh module=sync status=ok collection={} count={} duration_ms={}",
            self.collection(),
            count,
            started_at.elapsed().as_millis()
        );
        Ok(count)
    }

    /// Issues a create; the entity shows up as provisional until confirmed.
    ///
    /// # Errors
    /// `CommandError::Validation` before any mutation or remote call.
    pub fn create(&self, fields: FieldMap) -> Result<PendingCommand, CommandError> {
        let fields = self.schema.validate_create(&fields)?;

        let mut state = self.shared.state.lock();
        let command = state.next_command_id();
        state.overlay.add_provisional(command, fields.clone());
        state.in_flight.insert(
            command,
            InFlight {
                op: Operation::Create,
                id: None,
            },
        );
        self.shared.publish(&state);
        drop(state);

        Ok(self.issue(
            command,
            RemoteRequest::create(self.collection(), fields),
        ))
    }

    /// Issues an update; the patch is visible before this returns.
    ///
    /// # Errors
    /// - `CommandError::NotFound` when `id` is not in the record store.
    /// - `CommandError::Validation` when the patch breaks field rules.
    pub fn update(&self, id: EntityId, patch: FieldMap) -> Result<PendingCommand, CommandError> {
        let mut state = self.shared.state.lock();
        if !state.store.contains(id) {
            return Err(CommandError::NotFound { id });
        }
        self.schema.validate_patch(&patch)?;

        let command = state.next_command_id();
        let applied = state.overlay.apply(id, command, &patch);
        state.take_over(
            command,
            InFlight {
                op: Operation::Update,
                id: Some(id),
            },
            applied.superseded,
        );
        self.shared.publish(&state);
        drop(state);

        Ok(self.issue(
            command,
            RemoteRequest::update(self.collection(), id, applied.patch),
        ))
    }

    /// Issues a delete; the entity is hidden before this returns.
    ///
    /// # Errors
    /// `CommandError::NotFound` when `id` is not in the record store.
    pub fn delete(&self, id: EntityId) -> Result<PendingCommand, CommandError> {
        let mut state = self.shared.state.lock();
        if !state.store.contains(id) {
            return Err(CommandError::NotFound { id });
        }

        let command = state.next_command_id();
        let superseded = state.overlay.suppress(id, command);
        state.take_over(
            command,
            InFlight {
                op: Operation::Delete,
                id: Some(id),
            },
            superseded,
        );
        self.shared.publish(&state);
        drop(state);

        Ok(self.issue(command, RemoteRequest::delete(self.collection(), id)))
    }

    fn issue(&self, command: CommandId, request: RemoteRequest) -> PendingCommand {
        info!(
            "event=command_issue module=sync status=ok collection={} command={} op={} id={} request_id={}",
            request.collection,
            command,
            request.op,
            display_id(request.id),
            request.request_id
        );
        let op = request.op;
        let id = request.id;
        let client = Arc::clone(&self.client);
        let call = async move { client.send(request).await }.boxed();
        PendingCommand {
            command,
            op,
            id,
            shared: Arc::clone(&self.shared),
            call,
            settled: false,
        }
    }

    /// Current visible sequence.
    pub fn visible(&self) -> Vec<VisibleEntity> {
        let state = self.shared.state.lock();
        state.overlay.visible(&state.store)
    }

    /// Visible value of one committed entity; `None` when absent or hidden by
    /// a pending delete.
    pub fn get_visible(&self, id: EntityId) -> Option<VisibleEntity> {
        let state = self.shared.state.lock();
        state.overlay.visible_for(id, &state.store)
    }

    /// Last confirmed value of one entity.
    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.shared.state.lock().store.get(id).cloned()
    }

    /// Last confirmed collection in store order.
    pub fn confirmed(&self) -> Vec<Entity> {
        self.shared.state.lock().store.iter().cloned().collect()
    }

    /// Receives a new snapshot on every visible change.
    pub fn subscribe(&self) -> watch::Receiver<VisibleSnapshot> {
        self.shared.visible_tx.subscribe()
    }

    /// Number of unresolved commands that still own their optimistic state.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Number of overlays currently shaping the visible sequence.
    pub fn pending_overlays(&self) -> usize {
        self.shared.state.lock().overlay.len()
    }
}

fn display_id(id: Option<EntityId>) -> String {
    id.map_or_else(|| "-".to_string(), |id| id.to_string())
}
