//! Core type definitions shared by declarations and the schema graph.

use serde::{Deserialize, Serialize};

/// Logical column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Boolean value.
    Boolean,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Fixed-precision decimal.
    Decimal,
    /// Variable-length string.
    Varchar,
    /// Fixed-length string.
    Char,
    /// Unbounded text.
    Text,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Timestamp.
    Timestamp,
    /// UUID.
    Uuid,
    /// JSON document.
    Json,
    /// Binary data.
    Binary,
    /// Backend-specific type name, passed through verbatim.
    Custom(String),
}

impl ColumnType {
    /// Normalized type name used in the backend-neutral schema shape.
    pub fn name(&self) -> &str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::SmallInt => "smallint",
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::Decimal => "decimal",
            ColumnType::Varchar => "varchar",
            ColumnType::Char => "char",
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Uuid => "uuid",
            ColumnType::Json => "json",
            ColumnType::Binary => "binary",
            ColumnType::Custom(name) => name,
        }
    }

    /// Check if this type carries a length.
    pub fn has_length(&self) -> bool {
        matches!(self, ColumnType::Varchar | ColumnType::Char)
    }

    /// Check if this type carries precision and scale.
    pub fn has_precision(&self) -> bool {
        matches!(self, ColumnType::Decimal)
    }
}

/// Default value expression for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Current timestamp (evaluated at insert time).
    CurrentTimestamp,
    /// Raw expression, passed through verbatim.
    Expression(String),
}

impl DefaultValue {
    /// Canonical SQL-ish rendering used when comparing against introspected defaults.
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Bool(b) => b.to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            DefaultValue::Expression(e) => e.clone(),
        }
    }
}

/// How a column value is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    /// Not generated.
    #[default]
    None,
    /// Auto-increment integer.
    Increment,
    /// UUID.
    Uuid,
    /// Row id (backend-assigned rowid).
    RowId,
}

impl Generation {
    /// Check if the column is generated at all.
    pub fn is_generated(&self) -> bool {
        !matches!(self, Generation::None)
    }

    /// Name used in the backend-neutral schema shape.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Generation::None => None,
            Generation::Increment => Some("increment"),
            Generation::Uuid => Some("uuid"),
            Generation::RowId => Some("rowid"),
        }
    }
}

/// Special meaning of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Ordinary column.
    #[default]
    Regular,
    /// Set by the database on insert.
    CreateDate,
    /// Set by the database on insert and update.
    UpdateDate,
    /// Marks soft-deleted rows.
    DeleteDate,
    /// Optimistic version counter, incremented on update.
    Version,
    /// Discriminator of single-table inheritance.
    Discriminator,
    /// Materialized path of a tree entity.
    MaterializedPath,
    /// Left bound of a nested-set tree entity.
    NestedSetLeft,
    /// Right bound of a nested-set tree entity.
    NestedSetRight,
}

/// Relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// One-to-one; the side with the join column owns it.
    OneToOne,
    /// Many-to-one; always owning.
    ManyToOne,
    /// One-to-many; always the inverse side.
    OneToMany,
    /// Many-to-many; the side with the join table owns it.
    ManyToMany,
}

impl RelationKind {
    /// Check if the relation holds a collection.
    pub fn is_to_many(&self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// Persistence operations that can cascade over a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cascade {
    /// Insert new related entities.
    Insert,
    /// Update existing related entities.
    Update,
    /// Remove related entities.
    Remove,
    /// Soft-remove related entities.
    SoftRemove,
    /// Recover soft-removed related entities.
    Recover,
}

/// A set of cascade operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CascadeSet {
    /// Cascade inserts.
    #[serde(default)]
    pub insert: bool,
    /// Cascade updates.
    #[serde(default)]
    pub update: bool,
    /// Cascade removes.
    #[serde(default)]
    pub remove: bool,
    /// Cascade soft removes.
    #[serde(default)]
    pub soft_remove: bool,
    /// Cascade recovers.
    #[serde(default)]
    pub recover: bool,
}

impl CascadeSet {
    /// No cascades.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every cascade.
    pub fn all() -> Self {
        Self {
            insert: true,
            update: true,
            remove: true,
            soft_remove: true,
            recover: true,
        }
    }

    /// Build a set from a list of operations.
    pub fn of(ops: impl IntoIterator<Item = Cascade>) -> Self {
        let mut set = Self::none();
        for op in ops {
            set = set.with(op);
        }
        set
    }

    /// Add one operation.
    pub fn with(mut self, op: Cascade) -> Self {
        match op {
            Cascade::Insert => self.insert = true,
            Cascade::Update => self.update = true,
            Cascade::Remove => self.remove = true,
            Cascade::SoftRemove => self.soft_remove = true,
            Cascade::Recover => self.recover = true,
        }
        self
    }

    /// Check if the set contains an operation.
    pub fn contains(&self, op: Cascade) -> bool {
        match op {
            Cascade::Insert => self.insert,
            Cascade::Update => self.update,
            Cascade::Remove => self.remove,
            Cascade::SoftRemove => self.soft_remove,
            Cascade::Recover => self.recover,
        }
    }
}

/// Loading mode of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loading {
    /// Loaded only when requested.
    #[default]
    Lazy,
    /// Loaded with the owning entity.
    Eager,
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// No action.
    #[default]
    NoAction,
    /// Prevent the change if referencing rows exist.
    Restrict,
    /// Propagate the change.
    Cascade,
    /// Set referencing columns to null.
    SetNull,
    /// Set referencing columns to their default.
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword for the action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// What happens to a child row removed from a one-to-many collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanedRowAction {
    /// Set the child's foreign key to null.
    #[default]
    Nullify,
    /// Remove the child row.
    Delete,
    /// Soft-remove the child row.
    SoftDelete,
    /// Leave the child row untouched.
    Disable,
}

/// Inheritance mapping strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceStrategy {
    /// One physical table for the whole hierarchy.
    SingleTable,
    /// One table per class, joined by the primary key.
    ClassTable,
    /// One table per concrete class holding all inherited columns.
    ConcreteTable,
}

/// Tree representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    /// Parent reference only.
    AdjacencyList,
    /// Separate ancestor/descendant pairs table.
    ClosureTable,
    /// Delimited ancestor path column.
    MaterializedPath,
    /// Left/right bounds.
    NestedSet,
}

/// Prefix applied to the columns of an embedded type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedPrefix {
    /// Use the embedding property name.
    #[default]
    Default,
    /// Use a custom prefix.
    Custom(String),
    /// No prefix.
    Disabled,
}
