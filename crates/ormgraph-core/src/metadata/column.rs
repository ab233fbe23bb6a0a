//! Column declarations.

use super::types::{ColumnRole, ColumnType, DefaultValue, Generation};
use serde::{Deserialize, Serialize};

/// A column declared on an entity or embeddable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Property name on the entity.
    pub property: String,
    /// Explicit database name (naming strategy applies otherwise).
    #[serde(default)]
    pub name: Option<String>,
    /// Declared type; inferred where possible if absent.
    #[serde(default)]
    pub column_type: Option<ColumnType>,
    /// Whether the column accepts null.
    #[serde(default)]
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary: bool,
    /// Whether the column carries a single-column unique constraint.
    #[serde(default)]
    pub unique: bool,
    /// Value generation strategy.
    #[serde(default)]
    pub generation: Generation,
    /// Default value expression.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Length for string types.
    #[serde(default)]
    pub length: Option<u32>,
    /// Precision for decimal types.
    #[serde(default)]
    pub precision: Option<u32>,
    /// Scale for decimal types.
    #[serde(default)]
    pub scale: Option<u32>,
    /// Collation.
    #[serde(default)]
    pub collation: Option<String>,
    /// Special role.
    #[serde(default)]
    pub role: ColumnRole,
}

impl ColumnDef {
    /// Create a non-nullable column.
    pub fn new(property: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            column_type: Some(column_type),
            ..Self::untyped(property)
        }
    }

    /// Create a column whose type must be inferred.
    pub fn untyped(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            name: None,
            column_type: None,
            nullable: false,
            primary: false,
            unique: false,
            generation: Generation::None,
            default: None,
            length: None,
            precision: None,
            scale: None,
            collation: None,
            role: ColumnRole::Regular,
        }
    }

    /// Create an auto-increment primary column.
    pub fn primary_generated(property: impl Into<String>) -> Self {
        Self::untyped(property)
            .primary()
            .with_generation(Generation::Increment)
    }

    /// Create a UUID primary column.
    pub fn primary_uuid(property: impl Into<String>) -> Self {
        Self::untyped(property)
            .primary()
            .with_generation(Generation::Uuid)
    }

    /// Create a column with a special role; its type is inferred.
    pub fn special(property: impl Into<String>, role: ColumnRole) -> Self {
        let mut column = Self::untyped(property);
        column.role = role;
        if role == ColumnRole::DeleteDate {
            column.nullable = true;
        }
        column
    }

    /// Set the database name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark as primary.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Mark as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the generation strategy.
    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the length.
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Set precision and scale.
    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Set the collation.
    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let column = ColumnDef::new("title", ColumnType::Varchar)
            .with_length(50)
            .with_name("post_title")
            .unique();

        assert_eq!(column.property, "title");
        assert_eq!(column.name.as_deref(), Some("post_title"));
        assert_eq!(column.length, Some(50));
        assert!(column.unique);
        assert!(!column.nullable);
    }

    #[test]
    fn test_primary_generated() {
        let column = ColumnDef::primary_generated("id");
        assert!(column.primary);
        assert_eq!(column.generation, Generation::Increment);
        assert!(column.column_type.is_none());
    }

    #[test]
    fn test_delete_date_is_nullable() {
        let column = ColumnDef::special("deletedAt", ColumnRole::DeleteDate);
        assert!(column.nullable);
    }
}
