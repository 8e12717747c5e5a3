//! Remote sync boundary.
//!
//! # Responsibility
//! - Define the one-call-per-command contract (`RemoteSyncClient`).
//! - Normalize every transport outcome into `RemoteOutcome`.
//!
//! # Invariants
//! - Implementations never panic or return errors past this boundary.
//! - One attempt per call: no retry, no backoff.

pub mod http;
pub mod local;
pub mod wire;

use crate::model::entity::{Entity, EntityId, FieldMap};
use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Mutating operation carried by one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote call addressed by operation and collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    /// Correlation id shared by client and server log lines.
    pub request_id: Uuid,
    pub collection: String,
    pub op: Operation,
    /// Target id; `None` only for creates.
    pub id: Option<EntityId>,
    /// Field payload; empty for deletes.
    pub fields: FieldMap,
}

impl RemoteRequest {
    pub fn create(collection: impl Into<String>, fields: FieldMap) -> Self {
        Self::new(collection, Operation::Create, None, fields)
    }

    pub fn update(collection: impl Into<String>, id: EntityId, fields: FieldMap) -> Self {
        Self::new(collection, Operation::Update, Some(id), fields)
    }

    pub fn delete(collection: impl Into<String>, id: EntityId) -> Self {
        Self::new(collection, Operation::Delete, Some(id), FieldMap::new())
    }

    fn new(
        collection: impl Into<String>,
        op: Operation,
        id: Option<EntityId>,
        fields: FieldMap,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            collection: collection.into(),
            op,
            id,
            fields,
        }
    }
}

/// Classified remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    Timeout,
    /// Connection-level failure, no response received.
    Transport,
    /// Non-2xx response without a more specific kind.
    Status(u16),
    NotFound,
    /// Server-side validation refused the payload.
    Rejected,
    /// Response arrived but could not be understood.
    Malformed,
}

impl Display for RemoteErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Transport => f.write_str("transport"),
            Self::Status(code) => write!(f, "status_{code}"),
            Self::NotFound => f.write_str("not_found"),
            Self::Rejected => f.write_str("rejected"),
            Self::Malformed => f.write_str("malformed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for RemoteFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteFailure {}

/// Successful remote result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSuccess {
    /// Canonical value after create/update.
    Entity(Entity),
    /// Delete acknowledged.
    Deleted(EntityId),
}

/// Normalized outcome of one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Confirmed(RemoteSuccess),
    Failed(RemoteFailure),
}

impl RemoteOutcome {
    pub fn entity(entity: Entity) -> Self {
        Self::Confirmed(RemoteSuccess::Entity(entity))
    }

    pub fn deleted(id: EntityId) -> Self {
        Self::Confirmed(RemoteSuccess::Deleted(id))
    }

    pub fn failed(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Failed(RemoteFailure::new(kind, message))
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Performs remote calls for the command dispatcher.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    /// Executes one command against the remote side.
    async fn send(&self, request: RemoteRequest) -> RemoteOutcome;

    /// Loads the full collection, in server order.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Entity>, RemoteFailure>;
}
