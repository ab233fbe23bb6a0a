//! DDL operations, safety grading and ordering.

use super::database::{
    CheckInfo, ColumnInfo, ExclusionInfo, ForeignKeyInfo, IndexInfo, PrimaryKeyInfo, TableInfo,
    UniqueInfo,
};
use super::error::{SafetyGrade, SyncError};
use crate::order::DependencyGraph;
use crate::schema::TableName;
use std::fmt;

/// One DDL action.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlOperation {
    /// Create a table with its columns, primary key and table constraints.
    /// Indices and foreign keys are separate operations.
    CreateTable(TableInfo),
    /// Drop a table.
    DropTable { table: TableName },
    /// Add a column.
    AddColumn { table: TableName, column: ColumnInfo },
    /// Change a column in place.
    AlterColumn {
        table: TableName,
        from: ColumnInfo,
        to: ColumnInfo,
    },
    /// Drop a column.
    DropColumn { table: TableName, column: String },
    /// Replace the primary key.
    UpdatePrimaryKey {
        table: TableName,
        from: Option<PrimaryKeyInfo>,
        to: Option<PrimaryKeyInfo>,
    },
    /// Create an index.
    CreateIndex { table: TableName, index: IndexInfo },
    /// Drop an index.
    DropIndex { table: TableName, index: IndexInfo },
    /// Add a unique constraint.
    AddUnique { table: TableName, unique: UniqueInfo },
    /// Drop a unique constraint.
    DropUnique { table: TableName, unique: UniqueInfo },
    /// Add a check constraint.
    AddCheck { table: TableName, check: CheckInfo },
    /// Drop a check constraint.
    DropCheck { table: TableName, check: CheckInfo },
    /// Add an exclusion constraint.
    AddExclusion {
        table: TableName,
        exclusion: ExclusionInfo,
    },
    /// Drop an exclusion constraint.
    DropExclusion {
        table: TableName,
        exclusion: ExclusionInfo,
    },
    /// Add a foreign key.
    AddForeignKey {
        table: TableName,
        foreign_key: ForeignKeyInfo,
    },
    /// Drop a foreign key.
    DropForeignKey {
        table: TableName,
        foreign_key: ForeignKeyInfo,
    },
}

impl DdlOperation {
    /// Table the operation acts on.
    pub fn table(&self) -> TableName {
        match self {
            DdlOperation::CreateTable(info) => info.name(),
            DdlOperation::DropTable { table }
            | DdlOperation::AddColumn { table, .. }
            | DdlOperation::AlterColumn { table, .. }
            | DdlOperation::DropColumn { table, .. }
            | DdlOperation::UpdatePrimaryKey { table, .. }
            | DdlOperation::CreateIndex { table, .. }
            | DdlOperation::DropIndex { table, .. }
            | DdlOperation::AddUnique { table, .. }
            | DdlOperation::DropUnique { table, .. }
            | DdlOperation::AddCheck { table, .. }
            | DdlOperation::DropCheck { table, .. }
            | DdlOperation::AddExclusion { table, .. }
            | DdlOperation::DropExclusion { table, .. }
            | DdlOperation::AddForeignKey { table, .. }
            | DdlOperation::DropForeignKey { table, .. } => table.clone(),
        }
    }

    /// Safety grade of the operation on its own.
    pub fn grade(&self) -> SafetyGrade {
        match self {
            DdlOperation::CreateTable(_)
            | DdlOperation::DropIndex { .. }
            | DdlOperation::DropUnique { .. }
            | DdlOperation::DropCheck { .. }
            | DdlOperation::DropExclusion { .. }
            | DdlOperation::DropForeignKey { .. } => SafetyGrade::A,
            DdlOperation::AddColumn { column, .. } => {
                if column.nullable || column.default.is_some() || column.generated.is_some() {
                    SafetyGrade::A
                } else {
                    SafetyGrade::B
                }
            }
            DdlOperation::CreateIndex { index, .. } => {
                if index.unique {
                    SafetyGrade::B
                } else {
                    SafetyGrade::A
                }
            }
            DdlOperation::AlterColumn { .. }
            | DdlOperation::AddUnique { .. }
            | DdlOperation::AddCheck { .. }
            | DdlOperation::AddExclusion { .. }
            | DdlOperation::AddForeignKey { .. } => SafetyGrade::B,
            DdlOperation::UpdatePrimaryKey { .. } => SafetyGrade::C,
            DdlOperation::DropTable { .. } | DdlOperation::DropColumn { .. } => SafetyGrade::D,
        }
    }

    /// Position among operations with no dependency between them.
    fn rank(&self) -> u8 {
        match self {
            DdlOperation::DropForeignKey { .. } => 0,
            DdlOperation::DropIndex { .. }
            | DdlOperation::DropUnique { .. }
            | DdlOperation::DropCheck { .. }
            | DdlOperation::DropExclusion { .. } => 1,
            DdlOperation::DropColumn { .. } => 3,
            DdlOperation::DropTable { .. } => 4,
            DdlOperation::CreateTable(_) => 5,
            DdlOperation::AddColumn { .. } => 6,
            DdlOperation::AlterColumn { .. } => 7,
            DdlOperation::UpdatePrimaryKey { .. } => 8,
            DdlOperation::CreateIndex { .. }
            | DdlOperation::AddUnique { .. }
            | DdlOperation::AddCheck { .. }
            | DdlOperation::AddExclusion { .. } => 9,
            DdlOperation::AddForeignKey { .. } => 10,
        }
    }

    /// Column the operation removes or rewrites.
    fn rewritten_column(&self) -> Option<(TableName, &str)> {
        match self {
            DdlOperation::DropColumn { table, column } => Some((table.clone(), column.as_str())),
            DdlOperation::AlterColumn { table, to, .. } => Some((table.clone(), to.name.as_str())),
            _ => None,
        }
    }

    /// Column the operation creates or rewrites.
    fn provided_column(&self) -> Option<(TableName, &str)> {
        match self {
            DdlOperation::AddColumn { table, column } => {
                Some((table.clone(), column.name.as_str()))
            }
            DdlOperation::AlterColumn { table, to, .. } => Some((table.clone(), to.name.as_str())),
            _ => None,
        }
    }

    /// Columns a constraint addition needs in their final shape.
    fn required_columns(&self) -> Vec<(TableName, &str)> {
        match self {
            DdlOperation::CreateIndex { table, index } => on(table, &index.columns),
            DdlOperation::AddUnique { table, unique } => on(table, &unique.columns),
            DdlOperation::AddForeignKey { table, foreign_key } => {
                let mut columns = on(table, &foreign_key.columns);
                columns.extend(on(&foreign_key.referenced(), &foreign_key.referenced_columns));
                columns
            }
            DdlOperation::UpdatePrimaryKey { table, to: Some(pk), .. } => on(table, &pk.columns),
            _ => Vec::new(),
        }
    }

    /// Columns a constraint drop releases.
    fn released_columns(&self) -> Vec<(TableName, &str)> {
        match self {
            DdlOperation::DropIndex { table, index } => on(table, &index.columns),
            DdlOperation::DropUnique { table, unique } => on(table, &unique.columns),
            DdlOperation::DropForeignKey { table, foreign_key } => {
                let mut columns = on(table, &foreign_key.columns);
                columns.extend(on(&foreign_key.referenced(), &foreign_key.referenced_columns));
                columns
            }
            DdlOperation::UpdatePrimaryKey {
                table,
                from: Some(from),
                to,
            } => from
                .columns
                .iter()
                .filter(|c| !to.as_ref().is_some_and(|pk| pk.columns.contains(c)))
                .map(|c| (table.clone(), c.as_str()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Check if `self` has to run before `other`.
    fn must_precede(&self, other: &DdlOperation) -> bool {
        match (self, other) {
            (DdlOperation::CreateTable(info), DdlOperation::AddForeignKey { foreign_key, .. }) => {
                foreign_key.referenced() == info.name()
            }
            (
                DdlOperation::DropForeignKey { foreign_key, .. },
                DdlOperation::DropTable { table },
            ) => foreign_key.referenced() == *table,
            (
                DdlOperation::UpdatePrimaryKey { table, .. },
                DdlOperation::AddForeignKey { foreign_key, .. },
            ) => foreign_key.referenced() == *table,
            (
                DdlOperation::DropColumn { table, column },
                DdlOperation::AddColumn {
                    table: added_to,
                    column: added,
                },
            ) => table == added_to && *column == added.name,
            _ => {
                if let Some(rewritten) = other.rewritten_column() {
                    if self.released_columns().contains(&rewritten) {
                        return true;
                    }
                }
                match self.provided_column() {
                    Some(provided) => other.required_columns().contains(&provided),
                    None => false,
                }
            }
        }
    }
}

fn on<'a>(table: &TableName, columns: &'a [String]) -> Vec<(TableName, &'a str)> {
    columns.iter().map(|c| (table.clone(), c.as_str())).collect()
}

impl fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlOperation::CreateTable(info) => write!(f, "create table {}", info.name()),
            DdlOperation::DropTable { table } => write!(f, "drop table {}", table),
            DdlOperation::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column.name)
            }
            DdlOperation::AlterColumn { table, to, .. } => {
                write!(f, "alter column {}.{}", table, to.name)
            }
            DdlOperation::DropColumn { table, column } => {
                write!(f, "drop column {}.{}", table, column)
            }
            DdlOperation::UpdatePrimaryKey { table, .. } => {
                write!(f, "update primary key of {}", table)
            }
            DdlOperation::CreateIndex { table, index } => {
                write!(f, "create index {} on {}", index.name, table)
            }
            DdlOperation::DropIndex { table, index } => {
                write!(f, "drop index {} on {}", index.name, table)
            }
            DdlOperation::AddUnique { table, unique } => {
                write!(f, "add unique {} on {}", unique.name, table)
            }
            DdlOperation::DropUnique { table, unique } => {
                write!(f, "drop unique {} on {}", unique.name, table)
            }
            DdlOperation::AddCheck { table, check } => {
                write!(f, "add check {} on {}", check.name, table)
            }
            DdlOperation::DropCheck { table, check } => {
                write!(f, "drop check {} on {}", check.name, table)
            }
            DdlOperation::AddExclusion { table, exclusion } => {
                write!(f, "add exclusion {} on {}", exclusion.name, table)
            }
            DdlOperation::DropExclusion { table, exclusion } => {
                write!(f, "drop exclusion {} on {}", exclusion.name, table)
            }
            DdlOperation::AddForeignKey { table, foreign_key } => {
                write!(f, "add foreign key {} on {}", foreign_key.name, table)
            }
            DdlOperation::DropForeignKey { table, foreign_key } => {
                write!(f, "drop foreign key {} on {}", foreign_key.name, table)
            }
        }
    }
}

/// An operation with its safety grade.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOperation {
    /// The operation.
    pub operation: DdlOperation,
    /// Safety grade.
    pub grade: SafetyGrade,
}

impl PlannedOperation {
    /// Plan an operation graded on its own.
    pub fn new(operation: DdlOperation) -> Self {
        let grade = operation.grade();
        Self { operation, grade }
    }

    /// Plan half of a column recreation.
    pub fn recreation(operation: DdlOperation) -> Self {
        Self {
            operation,
            grade: SafetyGrade::C,
        }
    }
}

/// Ordered DDL operations bringing a database in line with the schema graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    operations: Vec<PlannedOperation>,
}

impl SyncPlan {
    /// Order operations so that every dependency runs first.
    pub(crate) fn ordered(mut operations: Vec<PlannedOperation>) -> Result<Self, SyncError> {
        operations.sort_by_key(|op| op.operation.rank());

        let mut graph = DependencyGraph::new(operations.len());
        for (i, a) in operations.iter().enumerate() {
            for (j, b) in operations.iter().enumerate() {
                if i != j && a.operation.must_precede(&b.operation) {
                    graph.add_edge(i, j, None, false);
                }
            }
        }

        let order = graph.sort().map_err(|cycle| {
            let first = cycle
                .first()
                .map(|&edge| &operations[graph.edge(edge).from].operation);
            SyncError::UnsupportedAlter {
                table: first.map(|op| op.table().to_string()).unwrap_or_default(),
                column: String::new(),
                reason: "operations depend on each other in a cycle".to_string(),
            }
        })?;

        let mut slots: Vec<Option<PlannedOperation>> = operations.into_iter().map(Some).collect();
        let operations = order.into_iter().filter_map(|i| slots[i].take()).collect();
        Ok(Self { operations })
    }

    /// Operations in execution order.
    pub fn operations(&self) -> &[PlannedOperation] {
        &self.operations
    }

    /// Check if the database already matches.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Worst grade of any operation; `A` for an empty plan.
    pub fn grade(&self) -> SafetyGrade {
        self.operations
            .iter()
            .map(|op| op.grade)
            .max()
            .unwrap_or(SafetyGrade::A)
    }

    /// Human-readable summary, one operation per line.
    pub fn describe(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| format!("[{:?}] {}", op.grade, op.operation))
            .collect()
    }
}
