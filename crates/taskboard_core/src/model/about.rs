//! About-page projection over the singleton `about` collection.

use crate::model::entity::{field_map, Entity, EntityId, FieldMap, FieldValue};
use crate::model::ProjectionError;

/// Collection name used for the about record.
pub const ABOUT_COLLECTION: &str = "about";

/// Fields used when the about record is created on first read.
pub fn default_about_fields() -> FieldMap {
    field_map([
        ("title", "Default Title"),
        ("description", "Default Description"),
        ("content", ""),
    ])
}

/// Typed read model of the about record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct About {
    pub id: EntityId,
    pub title: String,
    pub description: String,
    /// Rich-text HTML body, stored verbatim.
    pub content: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl About {
    pub fn from_entity(entity: &Entity) -> Result<Self, ProjectionError> {
        Ok(Self {
            id: entity.id,
            title: entity
                .text("title")
                .ok_or(ProjectionError::MissingField("title"))?
                .to_string(),
            description: entity
                .text("description")
                .ok_or(ProjectionError::MissingField("description"))?
                .to_string(),
            content: entity.text("content").map(str::to_string),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

/// Partial about-page edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AboutPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}

impl AboutPatch {
    pub fn into_fields(self) -> FieldMap {
        [
            ("title", self.title),
            ("description", self.description),
            ("content", self.content),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), FieldValue::Text(v))))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{default_about_fields, About, AboutPatch};
    use crate::model::entity::Entity;

    #[test]
    fn default_fields_project_to_about() {
        let entity = Entity::new(1, default_about_fields(), 5, 5);
        let about = About::from_entity(&entity).expect("about projection");
        assert_eq!(about.title, "Default Title");
        assert_eq!(about.content.as_deref(), Some(""));
    }

    #[test]
    fn patch_only_carries_set_fields() {
        let fields = AboutPatch {
            content: Some("<p>hello</p>".to_string()),
            ..AboutPatch::default()
        }
        .into_fields();
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("content"));
    }
}
