//! Task projection over the `tasks` collection.
//!
//! # Invariants
//! - `status` defaults to `pending`, `priority` defaults to `medium`.
//! - Wire strings are kebab-case (`in-progress`).

use crate::model::entity::{Entity, EntityId, FieldMap, FieldValue};
use crate::model::ProjectionError;
use serde::{Deserialize, Serialize};

/// Collection name used for task records.
pub const TASKS_COLLECTION: &str = "tasks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Pending, Self::InProgress, Self::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|priority| priority.as_str() == value)
    }
}

/// Typed read model of one task entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Reads a task from a generic entity.
    ///
    /// Missing `status`/`priority` fall back to their defaults; an unknown
    /// value is rejected.
    pub fn from_entity(entity: &Entity) -> Result<Self, ProjectionError> {
        let title = entity
            .text("title")
            .ok_or(ProjectionError::MissingField("title"))?
            .to_string();
        let status = match entity.text("status") {
            Some(value) => TaskStatus::parse(value).ok_or(ProjectionError::InvalidValue {
                field: "status",
                value: value.to_string(),
            })?,
            None => TaskStatus::default(),
        };
        let priority = match entity.text("priority") {
            Some(value) => TaskPriority::parse(value).ok_or(ProjectionError::InvalidValue {
                field: "priority",
                value: value.to_string(),
            })?,
            None => TaskPriority::default(),
        };

        Ok(Self {
            id: entity.id,
            title,
            description: entity.text("description").map(str::to_string),
            status,
            priority,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

/// Input for a task create command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
        }
    }

    pub fn into_fields(self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::Text(self.title));
        if let Some(description) = self.description {
            fields.insert("description".to_string(), FieldValue::Text(description));
        }
        fields.insert("status".to_string(), self.status.as_str().into());
        fields.insert("priority".to_string(), self.priority.as_str().into());
        fields
    }
}

/// Partial task update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn into_fields(self) -> FieldMap {
        let mut fields = FieldMap::new();
        if let Some(title) = self.title {
            fields.insert("title".to_string(), FieldValue::Text(title));
        }
        if let Some(description) = self.description {
            fields.insert("description".to_string(), description.into());
        }
        if let Some(status) = self.status {
            fields.insert("status".to_string(), status.as_str().into());
        }
        if let Some(priority) = self.priority {
            fields.insert("priority".to_string(), priority.as_str().into());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::{NewTask, Task, TaskPatch, TaskPriority, TaskStatus};
    use crate::model::entity::{field_map, Entity, FieldValue};
    use crate::model::ProjectionError;

    #[test]
    fn status_round_trips_wire_strings() {
        for status in TaskStatus::ALL {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("done"), None);
    }

    #[test]
    fn from_entity_applies_defaults() {
        let entity = Entity::new(3, field_map([("title", "Optimize database queries")]), 1, 2);
        let task = Task::from_entity(&entity).expect("task projection");

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.description, None);
    }

    #[test]
    fn from_entity_rejects_unknown_status() {
        let entity = Entity::new(
            1,
            field_map([("title", "x"), ("status", "blocked")]),
            1,
            1,
        );
        let err = Task::from_entity(&entity).expect_err("unknown status");
        assert!(matches!(err, ProjectionError::InvalidValue { field: "status", .. }));
    }

    #[test]
    fn patch_encodes_description_clear_as_null() {
        let patch = TaskPatch {
            description: Some(None),
            ..TaskPatch::status(TaskStatus::Completed)
        };
        let fields = patch.into_fields();

        assert_eq!(fields.get("description"), Some(&FieldValue::Null));
        assert_eq!(fields.get("status"), Some(&FieldValue::from("completed")));
        assert!(!fields.contains_key("title"));
    }

    #[test]
    fn new_task_includes_default_enums() {
        let fields = NewTask::new("Write docs").into_fields();
        assert_eq!(fields.get("status"), Some(&FieldValue::from("pending")));
        assert_eq!(fields.get("priority"), Some(&FieldValue::from("medium")));
    }
}
