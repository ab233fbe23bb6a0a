//! Row-level steps produced by the planner.

use super::subject::SubjectId;
use crate::schema::TableName;
use crate::tree::TreeOperation;
use crate::value::Value;

/// A column value that may only be known once an earlier step has run.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    /// Known at planning time.
    Value(Value),
    /// A value of another subject's row, known once that row is written.
    Generated {
        /// Subject whose row provides the value.
        subject: SubjectId,
        /// Property path on that subject's entity.
        property: String,
    },
    /// String concatenation of the parts, used for materialized paths.
    Concat(Vec<StepValue>),
}

impl StepValue {
    /// Literal string part.
    pub fn text(s: impl Into<String>) -> Self {
        StepValue::Value(Value::String(s.into()))
    }

    /// Check if the value is a null literal.
    pub fn is_null(&self) -> bool {
        matches!(self, StepValue::Value(Value::Null))
    }

    /// Subjects this value waits for.
    pub fn dependencies(&self) -> Vec<SubjectId> {
        match self {
            StepValue::Value(_) => Vec::new(),
            StepValue::Generated { subject, .. } => vec![*subject],
            StepValue::Concat(parts) => parts.iter().flat_map(|p| p.dependencies()).collect(),
        }
    }

    /// Resolve against generated values, looked up by subject and property path.
    pub fn resolve<E>(
        &self,
        lookup: &mut impl FnMut(SubjectId, &str) -> Result<Value, E>,
    ) -> Result<Value, E> {
        match self {
            StepValue::Value(value) => Ok(value.clone()),
            StepValue::Generated { subject, property } => lookup(*subject, property),
            StepValue::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&part.resolve(lookup)?.to_string());
                }
                Ok(Value::String(out))
            }
        }
    }
}

impl From<Value> for StepValue {
    fn from(value: Value) -> Self {
        StepValue::Value(value)
    }
}

/// One column of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue<V> {
    /// Database column name.
    pub column: String,
    /// Property path on the step's entity. Generated tables use the column name.
    pub property: String,
    /// The value.
    pub value: V,
}

impl<V> ColumnValue<V> {
    /// Create a column value.
    pub fn new(column: impl Into<String>, property: impl Into<String>, value: V) -> Self {
        Self {
            column: column.into(),
            property: property.into(),
            value,
        }
    }

    pub(crate) fn try_map<U, E>(
        &self,
        f: &mut impl FnMut(&V) -> Result<U, E>,
    ) -> Result<ColumnValue<U>, E> {
        Ok(ColumnValue {
            column: self.column.clone(),
            property: self.property.clone(),
            value: f(&self.value)?,
        })
    }
}

/// What a step does to the database.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction<V> {
    /// Insert one row.
    Insert {
        /// Target table.
        table: TableName,
        /// Column values; columns left out take their database default.
        values: Vec<ColumnValue<V>>,
        /// Columns whose values the database generates, reported back on completion.
        returning: Vec<ColumnValue<()>>,
    },
    /// Update one row identified by `key`.
    Update {
        /// Target table.
        table: TableName,
        /// Column values to set.
        values: Vec<ColumnValue<V>>,
        /// Primary key of the row.
        key: Vec<ColumnValue<V>>,
    },
    /// Delete one row identified by `key`.
    Delete {
        /// Target table.
        table: TableName,
        /// Primary key of the row.
        key: Vec<ColumnValue<V>>,
    },
    /// Tree bookkeeping.
    Tree(TreeOperation<V>),
}

/// Why a step exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPurpose {
    /// The subject's own row.
    Row,
    /// Follow-up update setting a relation left null to break a cycle.
    DeferredRelation,
    /// Junction row of a many-to-many relation.
    Junction,
    /// Row dropped from a one-to-many collection.
    Orphan,
    /// Tree strategy bookkeeping.
    Tree,
}

/// One database operation of a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<V = StepValue> {
    /// Subject the step belongs to, if any.
    pub subject: Option<SubjectId>,
    /// Why the step exists.
    pub purpose: StepPurpose,
    /// The operation.
    pub action: StepAction<V>,
}

/// A step whose values are all concrete.
pub type ResolvedStep = Step<Value>;

impl<V> Step<V> {
    /// Table the step writes to.
    pub fn table(&self) -> &TableName {
        match &self.action {
            StepAction::Insert { table, .. }
            | StepAction::Update { table, .. }
            | StepAction::Delete { table, .. } => table,
            StepAction::Tree(operation) => operation.table(),
        }
    }

    /// Check if the step inserts a row.
    pub fn is_insert(&self) -> bool {
        matches!(self.action, StepAction::Insert { .. })
    }

    /// Check if the step updates a row.
    pub fn is_update(&self) -> bool {
        matches!(self.action, StepAction::Update { .. })
    }

    /// Check if the step deletes a row.
    pub fn is_delete(&self) -> bool {
        matches!(self.action, StepAction::Delete { .. })
    }

    /// Values written by an insert or update.
    pub fn values(&self) -> &[ColumnValue<V>] {
        match &self.action {
            StepAction::Insert { values, .. } | StepAction::Update { values, .. } => values,
            _ => &[],
        }
    }

    /// Value written to `column`, if any.
    pub fn value_of(&self, column: &str) -> Option<&V> {
        self.values()
            .iter()
            .find(|c| c.column == column)
            .map(|c| &c.value)
    }

    /// Map every value, failing on the first error.
    pub fn try_map<U, E>(&self, mut f: impl FnMut(&V) -> Result<U, E>) -> Result<Step<U>, E> {
        let action = match &self.action {
            StepAction::Insert {
                table,
                values,
                returning,
            } => StepAction::Insert {
                table: table.clone(),
                values: map_columns(values, &mut f)?,
                returning: returning.clone(),
            },
            StepAction::Update { table, values, key } => StepAction::Update {
                table: table.clone(),
                values: map_columns(values, &mut f)?,
                key: map_columns(key, &mut f)?,
            },
            StepAction::Delete { table, key } => StepAction::Delete {
                table: table.clone(),
                key: map_columns(key, &mut f)?,
            },
            StepAction::Tree(operation) => StepAction::Tree(operation.try_map(&mut f)?),
        };
        Ok(Step {
            subject: self.subject,
            purpose: self.purpose,
            action,
        })
    }
}

pub(crate) fn map_columns<V, U, E>(
    columns: &[ColumnValue<V>],
    f: &mut impl FnMut(&V) -> Result<U, E>,
) -> Result<Vec<ColumnValue<U>>, E> {
    columns.iter().map(|c| c.try_map(f)).collect()
}
