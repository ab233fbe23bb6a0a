//! Entity declarations.

use super::column::ColumnDef;
use super::constraint::{CheckDef, ExclusionDef, IndexDef, UniqueDef};
use super::embedded::EmbeddedDef;
use super::relation::RelationDef;
use super::types::{ColumnType, InheritanceStrategy, TreeKind};
use serde::{Deserialize, Serialize};

/// A persistable type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within the registry).
    pub name: String,
    /// Explicit table name (naming strategy applies otherwise).
    #[serde(default)]
    pub table_name: Option<String>,
    /// Database schema the table lives in.
    #[serde(default)]
    pub schema: Option<String>,
    /// Abstract types own no table; their members are copied into descendants.
    #[serde(default)]
    pub is_abstract: bool,
    /// Column declarations.
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    /// Relation declarations.
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Embedded types.
    #[serde(default)]
    pub embeddeds: Vec<EmbeddedDef>,
    /// Indices.
    #[serde(default)]
    pub indices: Vec<IndexDef>,
    /// Unique constraints.
    #[serde(default)]
    pub uniques: Vec<UniqueDef>,
    /// Check constraints.
    #[serde(default)]
    pub checks: Vec<CheckDef>,
    /// Exclusion constraints.
    #[serde(default)]
    pub exclusions: Vec<ExclusionDef>,
    /// Inheritance settings of a hierarchy root.
    #[serde(default)]
    pub inheritance: Option<InheritanceDef>,
    /// Parent entity in an inheritance hierarchy.
    #[serde(default)]
    pub parent: Option<String>,
    /// Explicit discriminator value (single-table inheritance).
    #[serde(default)]
    pub discriminator_value: Option<String>,
    /// Tree representation.
    #[serde(default)]
    pub tree: Option<TreeKind>,
}

/// Inheritance settings declared on a hierarchy root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritanceDef {
    /// Mapping strategy.
    pub strategy: InheritanceStrategy,
    /// Discriminator column (single-table and class-table).
    #[serde(default)]
    pub discriminator: Option<DiscriminatorDef>,
}

/// Discriminator column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorDef {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(default = "default_discriminator_type")]
    pub column_type: ColumnType,
}

fn default_discriminator_type() -> ColumnType {
    ColumnType::Varchar
}

impl InheritanceDef {
    /// Single-table inheritance with the default discriminator column.
    pub fn single_table() -> Self {
        Self {
            strategy: InheritanceStrategy::SingleTable,
            discriminator: None,
        }
    }

    /// Class-table inheritance.
    pub fn class_table() -> Self {
        Self {
            strategy: InheritanceStrategy::ClassTable,
            discriminator: None,
        }
    }

    /// Concrete-table inheritance.
    pub fn concrete_table() -> Self {
        Self {
            strategy: InheritanceStrategy::ConcreteTable,
            discriminator: None,
        }
    }

    /// Set the discriminator column name.
    pub fn with_discriminator(mut self, name: impl Into<String>) -> Self {
        self.discriminator = Some(DiscriminatorDef {
            name: name.into(),
            column_type: ColumnType::Varchar,
        });
        self
    }
}

impl EntityDef {
    /// Create a new entity declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            schema: None,
            is_abstract: false,
            columns: Vec::new(),
            relations: Vec::new(),
            embeddeds: Vec::new(),
            indices: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            exclusions: Vec::new(),
            inheritance: None,
            parent: None,
            discriminator_value: None,
            tree: None,
        }
    }

    /// Create an abstract base declaration.
    pub fn abstract_base(name: impl Into<String>) -> Self {
        let mut def = Self::new(name);
        def.is_abstract = true;
        def
    }

    /// Set the table name.
    pub fn with_table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    /// Set the database schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add multiple columns.
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add an embedded type.
    pub fn with_embedded(mut self, embedded: EmbeddedDef) -> Self {
        self.embeddeds.push(embedded);
        self
    }

    /// Add an index.
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indices.push(index);
        self
    }

    /// Add a unique constraint.
    pub fn with_unique(mut self, unique: UniqueDef) -> Self {
        self.uniques.push(unique);
        self
    }

    /// Add a check constraint.
    pub fn with_check(mut self, check: CheckDef) -> Self {
        self.checks.push(check);
        self
    }

    /// Add an exclusion constraint.
    pub fn with_exclusion(mut self, exclusion: ExclusionDef) -> Self {
        self.exclusions.push(exclusion);
        self
    }

    /// Declare this entity as an inheritance root.
    pub fn with_inheritance(mut self, inheritance: InheritanceDef) -> Self {
        self.inheritance = Some(inheritance);
        self
    }

    /// Link to a parent entity.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the discriminator value.
    pub fn with_discriminator_value(mut self, value: impl Into<String>) -> Self {
        self.discriminator_value = Some(value.into());
        self
    }

    /// Declare a tree representation.
    pub fn with_tree(mut self, tree: TreeKind) -> Self {
        self.tree = Some(tree);
        self
    }

    /// Get a column declaration by property name.
    pub fn get_column(&self, property: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Get a relation declaration by property name.
    pub fn get_relation(&self, property: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.property == property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnType;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("Post")
            .with_column(ColumnDef::primary_generated("id"))
            .with_column(ColumnDef::new("title", ColumnType::Varchar).with_length(50))
            .with_relation(RelationDef::many_to_one("author", "User"));

        assert_eq!(entity.name, "Post");
        assert_eq!(entity.columns.len(), 2);
        assert!(entity.get_column("title").is_some());
        assert!(entity.get_relation("author").is_some());
        assert!(entity.get_column("nonexistent").is_none());
    }

    #[test]
    fn test_inheritance_root() {
        let root = EntityDef::new("Content")
            .with_inheritance(InheritanceDef::single_table().with_discriminator("kind"));
        let child = EntityDef::new("Photo")
            .extends("Content")
            .with_discriminator_value("photo");

        assert_eq!(
            root.inheritance.as_ref().unwrap().strategy,
            InheritanceStrategy::SingleTable
        );
        assert_eq!(child.parent.as_deref(), Some("Content"));
    }
}
