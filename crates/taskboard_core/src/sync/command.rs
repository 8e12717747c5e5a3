//! Command identity, outcomes and error taxonomy.

use crate::model::entity::{Entity, EntityId};
use crate::remote::{Operation, RemoteErrorKind, RemoteFailure};
use crate::schema::ValidationError;
use crate::store::record_store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Dispatcher-local command sequence number.
///
/// Issue order equals numeric order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(u64);

impl CommandId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for CommandId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Terminal, non-error result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Server confirmed the create; carries the canonical entity.
    Created(Entity),
    /// Server confirmed the update; carries the canonical entity.
    Updated(Entity),
    Deleted(EntityId),
    /// A newer command for the same id took over; this result was ignored.
    Superseded { id: EntityId, op: Operation },
}

impl CommandOutcome {
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Created(entity) | Self::Updated(entity) => Some(entity),
            Self::Deleted(_) | Self::Superseded { .. } => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

/// Command dispatcher error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Input fields failed schema constraints; nothing was mutated.
    Validation(ValidationError),
    /// Target id is not in the record store; nothing was mutated.
    NotFound { id: EntityId },
    /// Remote call failed; optimistic state was rolled back.
    ///
    /// `id` is `None` for creates.
    Remote {
        id: Option<EntityId>,
        op: Operation,
        kind: RemoteErrorKind,
        message: String,
    },
    /// Full-collection load failed; store unchanged.
    Refresh(RemoteFailure),
    /// Remote data violated record store invariants.
    Store(StoreError),
}

impl CommandError {
    pub(crate) fn remote(id: Option<EntityId>, op: Operation, failure: RemoteFailure) -> Self {
        Self::Remote {
            id,
            op,
            kind: failure.kind,
            message: failure.message,
        }
    }

    /// Remote error kind, when the failure came from the remote side.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            Self::Refresh(failure) => Some(failure.kind),
            Self::Validation(_) | Self::NotFound { .. } | Self::Store(_) => None,
        }
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { id } => write!(f, "entity not found: {id}"),
            Self::Remote {
                id: Some(id),
                op,
                kind,
                message,
            } => write!(f, "{op} of entity {id} failed ({kind}): {message}"),
            Self::Remote {
                id: None,
                op,
                kind,
                message,
            } => write!(f, "{op} failed ({kind}): {message}"),
            Self::Refresh(failure) => write!(f, "refresh failed: {failure}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Refresh(failure) => Some(failure),
            Self::Store(err) => Some(err),
            Self::NotFound { .. } | Self::Remote { .. } => None,
        }
    }
}

impl From<ValidationError> for CommandError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for CommandError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
