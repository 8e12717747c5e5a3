//! Built-in field rules for the `tasks` and `about` collections.

use super::{EntitySchema, FieldRule};
use crate::model::about::ABOUT_COLLECTION;
use crate::model::task::{TaskPriority, TaskStatus, TASKS_COLLECTION};

pub const TASK_TITLE_MAX_CHARS: usize = 100;

pub fn task_rules() -> Vec<FieldRule> {
    vec![
        FieldRule::text("title")
            .required()
            .max_len(TASK_TITLE_MAX_CHARS),
        FieldRule::text("description"),
        FieldRule::text("status")
            .one_of(TaskStatus::ALL.map(TaskStatus::as_str))
            .with_default(TaskStatus::default().as_str()),
        FieldRule::text("priority")
            .one_of(TaskPriority::ALL.map(TaskPriority::as_str))
            .with_default(TaskPriority::default().as_str()),
    ]
}

pub fn about_rules() -> Vec<FieldRule> {
    vec![
        FieldRule::text("title").required(),
        FieldRule::text("description").required(),
        FieldRule::text("content"),
    ]
}

/// Schema for the task manager collection.
pub fn task_schema() -> EntitySchema {
    build(TASKS_COLLECTION, "task", task_rules())
}

/// Schema for the about-page record.
pub fn about_schema() -> EntitySchema {
    build(ABOUT_COLLECTION, "about", about_rules())
}

fn build(collection: &str, resource_key: &str, rules: Vec<FieldRule>) -> EntitySchema {
    match EntitySchema::new(collection, resource_key, rules) {
        Ok(schema) => schema,
        // Built-in rules are static; a failure here is a programming error.
        Err(err) => unreachable!("built-in schema `{collection}` is invalid: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{about_schema, task_schema};
    use crate::model::entity::field_map;

    #[test]
    fn builtin_schemas_build() {
        assert_eq!(task_schema().collection(), "tasks");
        assert_eq!(task_schema().resource_key(), "task");
        assert_eq!(about_schema().rules().len(), 3);
    }

    #[test]
    fn about_requires_title_and_description() {
        let err = about_schema()
            .validate_create(&field_map([("content", "<p>x</p>")]))
            .expect_err("missing required fields");
        let fields: Vec<&str> = err.fields().collect();
        assert_eq!(fields, vec!["title", "description"]);
    }
}
