//! Last known server-confirmed entity sequence.
//!
//! # Invariants
//! - Ids are unique within the store.
//! - A removed id is retired and never accepted again.
//! - A stored entity's `updated_at` never moves backwards.

use crate::model::entity::{Entity, EntityId};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    DuplicateId(EntityId),
    RetiredId(EntityId),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "duplicate entity id {id} in collection"),
            Self::RetiredId(id) => write!(f, "entity id {id} was deleted and cannot be reused"),
        }
    }
}

impl Error for StoreError {}

/// Result of installing a confirmed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
    /// Incoming `updated_at` was older than the stored one; store unchanged.
    Stale,
}

/// Ordered in-memory collection of confirmed entities.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    entities: Vec<Entity>,
    retired: HashSet<EntityId>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically swaps the whole collection.
    ///
    /// # Errors
    /// Rejects the list, leaving the store unchanged, when it repeats an id or
    /// contains a retired id.
    pub fn replace_all(&mut self, entities: Vec<Entity>) -> Result<(), StoreError> {
        let mut seen = HashSet::with_capacity(entities.len());
        for entity in &entities {
            if self.retired.contains(&entity.id) {
                return Err(StoreError::RetiredId(entity.id));
            }
            if !seen.insert(entity.id) {
                return Err(StoreError::DuplicateId(entity.id));
            }
        }
        self.entities = entities;
        Ok(())
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// Installs a canonical value returned by a confirmed create or update.
    ///
    /// Existing ids keep their position; new ids are appended.
    pub fn upsert_confirmed(&mut self, entity: Entity) -> Result<Upsert, StoreError> {
        if self.retired.contains(&entity.id) {
            return Err(StoreError::RetiredId(entity.id));
        }
        match self.entities.iter().position(|current| current.id == entity.id) {
            Some(index) if entity.updated_at < self.entities[index].updated_at => Ok(Upsert::Stale),
            Some(index) => {
                self.entities[index] = entity;
                Ok(Upsert::Replaced)
            }
            None => {
                self.entities.push(entity);
                Ok(Upsert::Inserted)
            }
        }
    }

    /// Removes a confirmed deletion and retires its id.
    pub fn remove_confirmed(&mut self, id: EntityId) -> Option<Entity> {
        self.retired.insert(id);
        let position = self.entities.iter().position(|entity| entity.id == id)?;
        Some(self.entities.remove(position))
    }

    pub fn is_retired(&self, id: EntityId) -> bool {
        self.retired.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
