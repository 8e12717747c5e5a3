//! Record repository contract and SQLite implementation.
//!
//! # Invariants
//! - Every query is scoped to one collection.
//! - `updated_at` written by `update` never precedes the stored value.

use crate::db::DbError;
use crate::model::entity::{Entity, EntityId, FieldMap};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    fields_json,
    created_at,
    updated_at
FROM records";

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(EntityId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Collection-scoped record storage.
pub trait RecordRepository {
    /// Stores a new record; the id is assigned by storage.
    fn insert(&self, collection: &str, fields: &FieldMap, now_ms: i64) -> RepoResult<Entity>;
    /// Replaces the stored field map of an existing record.
    fn update(
        &self,
        collection: &str,
        id: EntityId,
        fields: &FieldMap,
        now_ms: i64,
    ) -> RepoResult<Entity>;
    fn delete(&self, collection: &str, id: EntityId) -> RepoResult<()>;
    fn get(&self, collection: &str, id: EntityId) -> RepoResult<Option<Entity>>;
    /// All records of a collection in id order.
    fn list(&self, collection: &str) -> RepoResult<Vec<Entity>>;
    /// Lowest-id record of a collection.
    fn first(&self, collection: &str) -> RepoResult<Option<Entity>>;
}

pub struct SqliteRecordRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn insert(&self, collection: &str, fields: &FieldMap, now_ms: i64) -> RepoResult<Entity> {
        let fields_json = encode_fields(fields)?;
        self.conn.execute(
            "INSERT INTO records (collection, fields_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3);",
            params![collection, fields_json, now_ms],
        )?;
        let id = to_entity_id(self.conn.last_insert_rowid())?;
        self.get(collection, id)?
            .ok_or_else(|| RepoError::InvalidData(format!("inserted record {id} not found")))
    }

    fn update(
        &self,
        collection: &str,
        id: EntityId,
        fields: &FieldMap,
        now_ms: i64,
    ) -> RepoResult<Entity> {
        let fields_json = encode_fields(fields)?;
        let changed = self.conn.execute(
            "UPDATE records
             SET
                fields_json = ?1,
                updated_at = MAX(updated_at, ?2)
             WHERE id = ?3
               AND collection = ?4;",
            params![fields_json, now_ms, to_row_id(id)?, collection],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        self.get(collection, id)?.ok_or(RepoError::NotFound(id))
    }

    fn delete(&self, collection: &str, id: EntityId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM records WHERE id = ?1 AND collection = ?2;",
            params![to_row_id(id)?, collection],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn get(&self, collection: &str, id: EntityId) -> RepoResult<Option<Entity>> {
        let row = self
            .conn
            .query_row(
                &format!("{RECORD_SELECT_SQL} WHERE id = ?1 AND collection = ?2;"),
                params![to_row_id(id)?, collection],
                read_raw,
            )
            .optional()?;
        row.map(parse_raw).transpose()
    }

    fn list(&self, collection: &str) -> RepoResult<Vec<Entity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECORD_SELECT_SQL} WHERE collection = ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([collection])?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(parse_raw(read_raw(row)?)?);
        }
        Ok(entities)
    }

    fn first(&self, collection: &str) -> RepoResult<Option<Entity>> {
        let row = self
            .conn
            .query_row(
                &format!("{RECORD_SELECT_SQL} WHERE collection = ?1 ORDER BY id ASC LIMIT 1;"),
                [collection],
                read_raw,
            )
            .optional()?;
        row.map(parse_raw).transpose()
    }
}

struct RawRecord {
    id: i64,
    fields_json: String,
    created_at: i64,
    updated_at: i64,
}

fn read_raw(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get("id")?,
        fields_json: row.get("fields_json")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_raw(raw: RawRecord) -> RepoResult<Entity> {
    let id = to_entity_id(raw.id)?;
    let fields: FieldMap = serde_json::from_str(&raw.fields_json).map_err(|err| {
        RepoError::InvalidData(format!("invalid fields_json for record {id}: {err}"))
    })?;
    Ok(Entity::new(id, fields, raw.created_at, raw.updated_at))
}

fn encode_fields(fields: &FieldMap) -> RepoResult<String> {
    serde_json::to_string(fields)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode fields: {err}")))
}

fn to_entity_id(row_id: i64) -> RepoResult<EntityId> {
    EntityId::try_from(row_id)
        .map_err(|_| RepoError::InvalidData(format!("negative record id {row_id}")))
}

fn to_row_id(id: EntityId) -> RepoResult<i64> {
    i64::try_from(id).map_err(|_| RepoError::NotFound(id))
}

#[cfg(test)]
mod tests {
    use super::{RecordRepository, RepoError, SqliteRecordRepository};
    use crate::db::open_db_in_memory;
    use crate::model::entity::field_map;

    #[test]
    fn queries_are_scoped_to_one_collection() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(&conn);
        let task = repo.insert("tasks", &field_map([("title", "a")]), 10).unwrap();

        assert!(repo.get("about", task.id).unwrap().is_none());
        assert!(repo.list("about").unwrap().is_empty());
        assert!(matches!(
            repo.delete("about", task.id),
            Err(RepoError::NotFound(id)) if id == task.id
        ));
    }

    #[test]
    fn update_never_moves_updated_at_backwards() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(&conn);
        let created = repo.insert("tasks", &field_map([("title", "a")]), 100).unwrap();

        let updated = repo
            .update("tasks", created.id, &field_map([("title", "b")]), 50)
            .unwrap();
        assert_eq!(updated.updated_at, 100);
        assert_eq!(updated.text("title"), Some("b"));
        assert_eq!(repo.first("tasks").unwrap(), Some(updated));
    }
}
