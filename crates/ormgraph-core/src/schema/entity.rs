//! Resolved entity, column, relation and constraint records.

use crate::metadata::{
    CascadeSet, ColumnRole, ColumnType, DefaultValue, Generation, InheritanceStrategy, Loading,
    OrphanedRowAction, ReferentialAction, RelationKind, TreeKind,
};
use std::fmt;

/// Index of an entity in the schema graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub usize);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    /// Database schema, if any.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
}

impl TableName {
    /// Create a table name.
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    /// Schema-qualified rendering (`schema.table` or `table`).
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// What an entity schema stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A registered entity.
    Regular,
    /// Junction table of a many-to-many relation.
    Junction,
    /// Closure table of a closure-table tree.
    Closure,
}

/// A fully resolved column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Dotted path through embeds (`counters.likes`). Unique per entity.
    pub property_path: String,
    /// Last segment of the property path.
    pub property_name: String,
    /// Physical column name.
    pub database_name: String,
    /// Resolved type.
    pub column_type: ColumnType,
    /// Whether the column accepts null.
    pub nullable: bool,
    /// Part of the primary key.
    pub primary: bool,
    /// Value generation.
    pub generation: Generation,
    /// Static default.
    pub default: Option<DefaultValue>,
    /// Length for string types.
    pub length: Option<u32>,
    /// Precision for decimal types.
    pub precision: Option<u32>,
    /// Scale for decimal types.
    pub scale: Option<u32>,
    /// Collation.
    pub collation: Option<String>,
    /// Special meaning.
    pub role: ColumnRole,
    /// Entity whose table physically stores this column.
    pub table_owner: EntityId,
    /// Entity that declared this column.
    pub declared_by: EntityId,
    /// Embed path the column was flattened from.
    pub embedded_path: Option<String>,
    /// Relation this column is a join column of.
    pub reference: Option<ColumnReference>,
}

impl Column {
    /// Check if the value comes from the database on insert.
    pub fn is_generated(&self) -> bool {
        self.generation.is_generated()
    }
}

/// Link from a join column to the column it references.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReference {
    /// Relation property path on the owning entity.
    pub relation: String,
    /// Referenced entity.
    pub target: EntityId,
    /// Referenced column property path on the target.
    pub referenced_column: String,
}

/// Junction columns of a many-to-many relation, as seen from one side.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionRef {
    /// Junction entity.
    pub entity: EntityId,
    /// (junction column path, referenced column path) pairs for this side.
    pub owner_columns: Vec<(String, String)>,
    /// (junction column path, referenced column path) pairs for the target side.
    pub target_columns: Vec<(String, String)>,
}

/// A fully resolved relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Dotted property path.
    pub property_path: String,
    /// Cardinality.
    pub kind: RelationKind,
    /// Target entity.
    pub target: EntityId,
    /// Property path of the inverse relation on the target.
    pub inverse: Option<String>,
    /// Whether this side holds the join columns or junction table.
    pub owning: bool,
    /// Cascade options.
    pub cascade: CascadeSet,
    /// Whether the relation may be unset.
    pub nullable: bool,
    /// Loading mode.
    pub loading: Loading,
    /// Referential action on delete.
    pub on_delete: ReferentialAction,
    /// Referential action on update.
    pub on_update: ReferentialAction,
    /// What happens to children dropped from a one-to-many collection.
    pub orphaned_row_action: OrphanedRowAction,
    /// Join column property paths on this entity (owning to-one relations).
    pub join_columns: Vec<String>,
    /// Junction table (many-to-many relations).
    pub junction: Option<JunctionRef>,
    /// Parent link of a tree entity.
    pub tree_parent: bool,
    /// Children link of a tree entity.
    pub tree_children: bool,
    /// Embed path the relation was flattened from.
    pub embedded_path: Option<String>,
}

impl Relation {
    /// Check if this is a to-one relation holding join columns.
    pub fn has_join_columns(&self) -> bool {
        self.owning && !self.join_columns.is_empty()
    }
}

/// A resolved foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Table holding the constraint.
    pub table: TableName,
    /// Local column names.
    pub columns: Vec<String>,
    /// Referenced entity.
    pub referenced_entity: EntityId,
    /// Referenced table.
    pub referenced_table: TableName,
    /// Referenced column names.
    pub referenced_columns: Vec<String>,
    /// Action on delete.
    pub on_delete: ReferentialAction,
    /// Action on update.
    pub on_update: ReferentialAction,
}

/// A resolved index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: TableName,
    /// Column names.
    pub columns: Vec<String>,
    /// Unique index.
    pub unique: bool,
    /// Spatial index.
    pub spatial: bool,
    /// Fulltext index.
    pub fulltext: bool,
    /// Partial index predicate.
    pub where_clause: Option<String>,
}

/// A resolved unique constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Unique {
    /// Constraint name.
    pub name: String,
    /// Constrained table.
    pub table: TableName,
    /// Column names.
    pub columns: Vec<String>,
}

/// A resolved check constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    /// Constraint name.
    pub name: String,
    /// Constrained table.
    pub table: TableName,
    /// Boolean expression.
    pub expression: String,
}

/// A resolved exclusion constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    /// Constraint name.
    pub name: String,
    /// Constrained table.
    pub table: TableName,
    /// Exclusion expression.
    pub expression: String,
}

/// Discriminator of an entity in an inheritance hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct Discriminator {
    /// Discriminator column property path (on the hierarchy root).
    pub column: String,
    /// This entity's value.
    pub value: String,
}

/// Closure table columns of a closure-table tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureRef {
    /// Closure entity.
    pub entity: EntityId,
    /// (closure column path, node primary column path) pairs for the ancestor side.
    pub ancestor_columns: Vec<(String, String)>,
    /// (closure column path, node primary column path) pairs for the descendant side.
    pub descendant_columns: Vec<(String, String)>,
}

/// Tree metadata of a tree entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSchema {
    /// Tree strategy.
    pub kind: TreeKind,
    /// Parent relation property path.
    pub parent_relation: String,
    /// Children relation property path.
    pub children_relation: Option<String>,
    /// Closure table (closure-table trees).
    pub closure: Option<ClosureRef>,
    /// Path column property path (materialized-path trees).
    pub path_column: Option<String>,
    /// Left bound column property path (nested-set trees).
    pub left_column: Option<String>,
    /// Right bound column property path (nested-set trees).
    pub right_column: Option<String>,
}

/// An embedded value flattened into its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedSchema {
    /// Dotted property path of the embed.
    pub property_path: String,
    /// Embeddable name.
    pub embeddable: String,
    /// Column name prefixes in effect inside the embed.
    pub prefixes: Vec<String>,
}

/// A fully resolved entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    /// Arena index.
    pub id: EntityId,
    /// Entity name.
    pub name: String,
    /// What the schema stands for.
    pub kind: EntityKind,
    /// Table holding this entity's rows. Single-table children share the root's.
    pub table: TableName,
    /// Tables written for one row, root first. Longer than one only for
    /// class-table children.
    pub tables: Vec<EntityId>,
    /// Primary key constraint name of `table`.
    pub primary_key_name: String,
    /// All columns, inherited ones included.
    pub columns: Vec<Column>,
    /// All relations, inherited ones included.
    pub relations: Vec<Relation>,
    /// Flattened embeds.
    pub embeddeds: Vec<EmbeddedSchema>,
    /// Foreign keys of tables this entity writes.
    pub foreign_keys: Vec<ForeignKey>,
    /// Indices.
    pub indices: Vec<Index>,
    /// Unique constraints.
    pub uniques: Vec<Unique>,
    /// Check constraints.
    pub checks: Vec<Check>,
    /// Exclusion constraints.
    pub exclusions: Vec<Exclusion>,
    /// Direct parent in an inheritance hierarchy.
    pub parent: Option<EntityId>,
    /// Direct children in an inheritance hierarchy.
    pub children: Vec<EntityId>,
    /// Inheritance strategy of the hierarchy this entity belongs to.
    pub inheritance: Option<InheritanceStrategy>,
    /// Discriminator, for single-table and class-table hierarchies.
    pub discriminator: Option<Discriminator>,
    /// Tree metadata.
    pub tree: Option<TreeSchema>,
}

impl EntitySchema {
    /// Find a column by property path.
    pub fn column(&self, property_path: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.property_path == property_path)
    }

    /// Find a relation by property path.
    pub fn relation(&self, property_path: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.property_path == property_path)
    }

    /// Primary columns in declaration order.
    pub fn primary_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary)
    }

    /// First column with the given role.
    pub fn column_with_role(&self, role: ColumnRole) -> Option<&Column> {
        self.columns.iter().find(|c| c.role == role)
    }

    /// Check if rows of this entity are written to more than one table.
    pub fn is_multi_table(&self) -> bool {
        self.tables.len() > 1
    }
}
