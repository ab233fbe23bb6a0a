//! Backend-neutral database schema shape.
//!
//! Both sides of a diff are expressed in these types: the desired schema is
//! projected from the schema graph, the actual one comes from an
//! introspector or a saved snapshot.

use super::error::SyncError;
use super::plan::DdlOperation;
use crate::schema::TableName;
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::path::Path;

/// All tables of a database.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct DatabaseSchema {
    /// Tables.
    pub tables: Vec<TableInfo>,
}

impl DatabaseSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table.
    pub fn with_table(mut self, table: TableInfo) -> Self {
        self.tables.push(table);
        self
    }

    /// Find a table by qualified name.
    pub fn table(&self, name: &TableName) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.is(name))
    }

    fn table_mut(&mut self, name: &TableName) -> Option<&mut TableInfo> {
        self.tables.iter_mut().find(|t| t.is(name))
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| SyncError::Snapshot(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| SyncError::Snapshot(e.to_string()))
    }

    /// Write a snapshot file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SyncError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| SyncError::Snapshot(format!("{}: {}", path.as_ref().display(), e)))
    }

    /// Read a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| SyncError::Snapshot(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_bytes(&bytes)
    }

    /// Apply one operation in memory.
    ///
    /// Operations on tables that do not exist are ignored.
    pub fn apply(&mut self, operation: &DdlOperation) {
        if let DdlOperation::CreateTable(table) = operation {
            self.tables.retain(|t| !t.is(&table.name()));
            self.tables.push(table.clone());
            return;
        }
        if let DdlOperation::DropTable { table } = operation {
            self.tables.retain(|t| !t.is(table));
            return;
        }
        let Some(info) = self.table_mut(&operation.table()) else {
            return;
        };
        match operation {
            DdlOperation::CreateTable(_) | DdlOperation::DropTable { .. } => {}
            DdlOperation::AddColumn { column, .. } => {
                info.columns.retain(|c| c.name != column.name);
                info.columns.push(column.clone());
            }
            DdlOperation::AlterColumn { to, .. } => {
                if let Some(column) = info.columns.iter_mut().find(|c| c.name == to.name) {
                    *column = to.clone();
                }
            }
            DdlOperation::DropColumn { column, .. } => info.columns.retain(|c| c.name != *column),
            DdlOperation::UpdatePrimaryKey { to, .. } => info.primary_key = to.clone(),
            DdlOperation::CreateIndex { index, .. } => info.indices.push(index.clone()),
            DdlOperation::DropIndex { index, .. } => info.indices.retain(|i| i.name != index.name),
            DdlOperation::AddUnique { unique, .. } => info.uniques.push(unique.clone()),
            DdlOperation::DropUnique { unique, .. } => {
                info.uniques.retain(|u| u.name != unique.name)
            }
            DdlOperation::AddCheck { check, .. } => info.checks.push(check.clone()),
            DdlOperation::DropCheck { check, .. } => info.checks.retain(|c| c.name != check.name),
            DdlOperation::AddExclusion { exclusion, .. } => info.exclusions.push(exclusion.clone()),
            DdlOperation::DropExclusion { exclusion, .. } => {
                info.exclusions.retain(|x| x.name != exclusion.name)
            }
            DdlOperation::AddForeignKey { foreign_key, .. } => {
                info.foreign_keys.push(foreign_key.clone())
            }
            DdlOperation::DropForeignKey { foreign_key, .. } => {
                info.foreign_keys.retain(|f| f.name != foreign_key.name)
            }
        }
    }
}

/// A table.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct TableInfo {
    /// Database schema, if any.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
    /// Columns in table order.
    pub columns: Vec<ColumnInfo>,
    /// Primary key.
    pub primary_key: Option<PrimaryKeyInfo>,
    /// Indices.
    pub indices: Vec<IndexInfo>,
    /// Unique constraints.
    pub uniques: Vec<UniqueInfo>,
    /// Check constraints.
    pub checks: Vec<CheckInfo>,
    /// Exclusion constraints.
    pub exclusions: Vec<ExclusionInfo>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableInfo {
    /// Create an empty table.
    pub fn new(name: &TableName) -> Self {
        Self {
            schema: name.schema.clone(),
            name: name.name.clone(),
            ..Self::default()
        }
    }

    /// Qualified table name.
    pub fn name(&self) -> TableName {
        TableName::new(self.schema.clone(), self.name.clone())
    }

    fn is(&self, name: &TableName) -> bool {
        self.name == name.name && self.schema == name.schema
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn with_primary_key(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.primary_key = Some(PrimaryKeyInfo {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Check if `column` is part of the primary key.
    pub fn is_primary(&self, column: &str) -> bool {
        self.primary_key
            .as_ref()
            .is_some_and(|pk| pk.columns.iter().any(|c| c == column))
    }
}

/// A column.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Normalized type name.
    pub type_name: String,
    /// Length for string types.
    pub length: Option<u32>,
    /// Precision for decimal types.
    pub precision: Option<u32>,
    /// Scale for decimal types.
    pub scale: Option<u32>,
    /// Whether the column accepts null.
    pub nullable: bool,
    /// Default expression.
    pub default: Option<String>,
    /// Generation strategy (`increment`, `uuid`, `rowid`).
    pub generated: Option<String>,
    /// Collation.
    pub collation: Option<String>,
}

impl ColumnInfo {
    /// Create a non-null column.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Accept null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set the length.
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the generation strategy.
    pub fn generated(mut self, strategy: impl Into<String>) -> Self {
        self.generated = Some(strategy.into());
        self
    }
}

/// A primary key.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct PrimaryKeyInfo {
    /// Constraint name.
    pub name: String,
    /// Key columns.
    pub columns: Vec<String>,
}

/// An index.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed columns.
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

/// A unique constraint.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct UniqueInfo {
    /// Constraint name.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
}

/// A check constraint.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct CheckInfo {
    /// Constraint name.
    pub name: String,
    /// Boolean expression.
    pub expression: String,
}

/// An exclusion constraint.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct ExclusionInfo {
    /// Constraint name.
    pub name: String,
    /// Exclusion expression.
    pub expression: String,
}

/// A foreign key.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct ForeignKeyInfo {
    /// Constraint name.
    pub name: String,
    /// Local columns.
    pub columns: Vec<String>,
    /// Schema of the referenced table.
    pub referenced_schema: Option<String>,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced columns.
    pub referenced_columns: Vec<String>,
    /// Action on delete (`CASCADE`, `NO ACTION`, ...).
    pub on_delete: String,
    /// Action on update.
    pub on_update: String,
}

impl ForeignKeyInfo {
    /// Qualified name of the referenced table.
    pub fn referenced(&self) -> TableName {
        TableName::new(self.referenced_schema.clone(), self.referenced_table.clone())
    }
}
