//! Tree persistence strategies.
//!
//! A tree entity keeps bookkeeping beside its parent relation so that
//! ancestors and descendants can be queried without recursion. Each strategy
//! turns node insertions, moves and removals into [`TreeOperation`]s which
//! the unit of work places around the node's own row step:
//!
//! - closure table: ancestor/descendant pairs in a separate table
//! - materialized path: a `"<ancestorId>.<parentId>.<id>."` column per row
//! - nested set: left/right bounds per row
//!
//! Operations are descriptors. Rendering them into SQL belongs to the
//! executor, like any other step.

mod closure;
mod materialized_path;
mod nested_set;

pub use closure::ClosureTableStrategy;
pub use materialized_path::MaterializedPathStrategy;
pub use nested_set::{moved_bound, shifted_bound, NestedSetStrategy};

use crate::error::TreeError;
use crate::metadata::TreeKind;
use crate::persist::{map_columns, ColumnValue, StepValue};
use crate::schema::{EntitySchema, SchemaGraph, TableName};

/// Tree bookkeeping operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeOperation<V> {
    /// Insert the self pair of `node` plus one pair per ancestor of `parent`,
    /// the parent's own self pair included.
    ClosureInsert {
        /// Closure table.
        table: TableName,
        /// Ancestor column names.
        ancestor_columns: Vec<String>,
        /// Descendant column names.
        descendant_columns: Vec<String>,
        /// Primary key of the node.
        node: Vec<V>,
        /// Primary key of the parent, if any.
        parent: Option<Vec<V>>,
    },
    /// Detach the subtree of `node` from its former ancestors and pair every
    /// subtree member with each ancestor of `parent`.
    ClosureMove {
        /// Closure table.
        table: TableName,
        /// Ancestor column names.
        ancestor_columns: Vec<String>,
        /// Descendant column names.
        descendant_columns: Vec<String>,
        /// Primary key of the node.
        node: Vec<V>,
        /// Primary key of the new parent, if any.
        parent: Option<Vec<V>>,
    },
    /// Delete every pair whose descendant lies in the subtree of `node`.
    ClosureRemove {
        /// Closure table.
        table: TableName,
        /// Ancestor column names.
        ancestor_columns: Vec<String>,
        /// Descendant column names.
        descendant_columns: Vec<String>,
        /// Primary key of the node.
        node: Vec<V>,
    },
    /// Set the path column of one row.
    SetPath {
        /// Tree table.
        table: TableName,
        /// Path column name.
        column: String,
        /// Primary key of the row.
        key: Vec<ColumnValue<V>>,
        /// The new path.
        path: V,
    },
    /// Replace `old_prefix` with `new_prefix` in every path starting with it.
    ///
    /// Soft-deleted rows are rewritten as well.
    RewritePathPrefix {
        /// Tree table.
        table: TableName,
        /// Path column name.
        column: String,
        /// Path of the moved node before the move.
        old_prefix: String,
        /// Path of the moved node after the move.
        new_prefix: V,
    },
    /// Add `delta` to every left and right bound that is `>= from`.
    ShiftBounds {
        /// Tree table.
        table: TableName,
        /// Left bound column name.
        left_column: String,
        /// Right bound column name.
        right_column: String,
        /// First affected bound.
        from: i64,
        /// Amount added.
        delta: i64,
    },
    /// Move the subtree `[left, right]` so it ends right before `target`,
    /// or after the last root when `target` is `None`. See [`moved_bound`].
    MoveSubtree {
        /// Tree table.
        table: TableName,
        /// Left bound column name.
        left_column: String,
        /// Right bound column name.
        right_column: String,
        /// Left bound of the moved node.
        left: i64,
        /// Right bound of the moved node.
        right: i64,
        /// Right bound of the new parent.
        target: Option<i64>,
    },
    /// Place a node as the last child of `parent`, whose bounds are only
    /// known to the database: every bound at or after the parent's right
    /// bound grows by 2 and the node takes the parent's former right bound.
    AppendChild {
        /// Tree table.
        table: TableName,
        /// Left bound column name.
        left_column: String,
        /// Right bound column name.
        right_column: String,
        /// Primary key of the node.
        key: Vec<ColumnValue<V>>,
        /// Primary key of the parent.
        parent: Vec<ColumnValue<V>>,
    },
    /// Place a new root after the greatest right bound in the table.
    AppendRoot {
        /// Tree table.
        table: TableName,
        /// Left bound column name.
        left_column: String,
        /// Right bound column name.
        right_column: String,
        /// Primary key of the root.
        key: Vec<ColumnValue<V>>,
    },
}

impl<V> TreeOperation<V> {
    /// Table the operation writes to.
    pub fn table(&self) -> &TableName {
        match self {
            TreeOperation::ClosureInsert { table, .. }
            | TreeOperation::ClosureMove { table, .. }
            | TreeOperation::ClosureRemove { table, .. }
            | TreeOperation::SetPath { table, .. }
            | TreeOperation::RewritePathPrefix { table, .. }
            | TreeOperation::ShiftBounds { table, .. }
            | TreeOperation::MoveSubtree { table, .. }
            | TreeOperation::AppendChild { table, .. }
            | TreeOperation::AppendRoot { table, .. } => table,
        }
    }

    pub(crate) fn try_map<U, E>(
        &self,
        f: &mut impl FnMut(&V) -> Result<U, E>,
    ) -> Result<TreeOperation<U>, E> {
        let map_key = |values: &[V], f: &mut dyn FnMut(&V) -> Result<U, E>| {
            values.iter().map(|v| f(v)).collect::<Result<Vec<_>, E>>()
        };
        Ok(match self {
            TreeOperation::ClosureInsert {
                table,
                ancestor_columns,
                descendant_columns,
                node,
                parent,
            } => TreeOperation::ClosureInsert {
                table: table.clone(),
                ancestor_columns: ancestor_columns.clone(),
                descendant_columns: descendant_columns.clone(),
                node: map_key(node, f)?,
                parent: match parent {
                    Some(parent) => Some(map_key(parent, f)?),
                    None => None,
                },
            },
            TreeOperation::ClosureMove {
                table,
                ancestor_columns,
                descendant_columns,
                node,
                parent,
            } => TreeOperation::ClosureMove {
                table: table.clone(),
                ancestor_columns: ancestor_columns.clone(),
                descendant_columns: descendant_columns.clone(),
                node: map_key(node, f)?,
                parent: match parent {
                    Some(parent) => Some(map_key(parent, f)?),
                    None => None,
                },
            },
            TreeOperation::ClosureRemove {
                table,
                ancestor_columns,
                descendant_columns,
                node,
            } => TreeOperation::ClosureRemove {
                table: table.clone(),
                ancestor_columns: ancestor_columns.clone(),
                descendant_columns: descendant_columns.clone(),
                node: map_key(node, f)?,
            },
            TreeOperation::SetPath {
                table,
                column,
                key,
                path,
            } => TreeOperation::SetPath {
                table: table.clone(),
                column: column.clone(),
                key: map_columns(key, f)?,
                path: f(path)?,
            },
            TreeOperation::RewritePathPrefix {
                table,
                column,
                old_prefix,
                new_prefix,
            } => TreeOperation::RewritePathPrefix {
                table: table.clone(),
                column: column.clone(),
                old_prefix: old_prefix.clone(),
                new_prefix: f(new_prefix)?,
            },
            TreeOperation::ShiftBounds {
                table,
                left_column,
                right_column,
                from,
                delta,
            } => TreeOperation::ShiftBounds {
                table: table.clone(),
                left_column: left_column.clone(),
                right_column: right_column.clone(),
                from: *from,
                delta: *delta,
            },
            TreeOperation::MoveSubtree {
                table,
                left_column,
                right_column,
                left,
                right,
                target,
            } => TreeOperation::MoveSubtree {
                table: table.clone(),
                left_column: left_column.clone(),
                right_column: right_column.clone(),
                left: *left,
                right: *right,
                target: *target,
            },
            TreeOperation::AppendChild {
                table,
                left_column,
                right_column,
                key,
                parent,
            } => TreeOperation::AppendChild {
                table: table.clone(),
                left_column: left_column.clone(),
                right_column: right_column.clone(),
                key: map_columns(key, f)?,
                parent: map_columns(parent, f)?,
            },
            TreeOperation::AppendRoot {
                table,
                left_column,
                right_column,
                key,
            } => TreeOperation::AppendRoot {
                table: table.clone(),
                left_column: left_column.clone(),
                right_column: right_column.clone(),
                key: map_columns(key, f)?,
            },
        })
    }
}

/// A tree node as seen by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Entity name, for errors.
    pub entity: String,
    /// Identifier rendering, for errors.
    pub label: String,
    /// Tree table.
    pub table: TableName,
    /// Primary key columns and values.
    pub key: Vec<ColumnValue<StepValue>>,
    /// Current materialized path, if known.
    pub path: Option<StepValue>,
    /// Current nested-set bounds, if known.
    pub bounds: Option<(i64, i64)>,
    /// Whether the row is soft-deleted.
    pub soft_deleted: bool,
    /// Whether the row is inserted by the plan being built.
    pub pending: bool,
}

impl TreeNode {
    /// Path segment of this node: its key values joined by `-`.
    pub fn segment(&self) -> StepValue {
        let mut parts = Vec::new();
        for (i, column) in self.key.iter().enumerate() {
            if i > 0 {
                parts.push(StepValue::text("-"));
            }
            parts.push(column.value.clone());
        }
        StepValue::Concat(parts)
    }

    /// Key values in column order.
    pub fn key_values(&self) -> Vec<StepValue> {
        self.key.iter().map(|c| c.value.clone()).collect()
    }

    /// Materialized path as a literal, when known at planning time.
    pub fn known_path(&self) -> Option<&str> {
        match &self.path {
            Some(StepValue::Value(value)) => value.as_str(),
            _ => None,
        }
    }
}

/// What a strategy adds to a node's row operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeEffects {
    /// Operations to run before the row step.
    pub before: Vec<TreeOperation<StepValue>>,
    /// Extra column values for the row insert.
    pub values: Vec<ColumnValue<StepValue>>,
    /// Operations to run after the row step.
    pub after: Vec<TreeOperation<StepValue>>,
    /// The node's path after the operation.
    pub path: Option<StepValue>,
    /// The node's bounds after the operation.
    pub bounds: Option<(i64, i64)>,
}

/// Maintains tree bookkeeping for one tree entity.
pub trait TreeStrategy: Send + Sync {
    /// The representation this strategy maintains.
    fn kind(&self) -> TreeKind;

    /// A new node is inserted under `parent`, or as a root.
    fn on_insert(&self, node: &TreeNode, parent: Option<&TreeNode>)
        -> Result<TreeEffects, TreeError>;

    /// An existing node changes parent.
    fn on_move(
        &self,
        node: &TreeNode,
        old_parent: Option<&TreeNode>,
        new_parent: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError>;

    /// A node is removed.
    fn on_remove(&self, node: &TreeNode) -> Result<TreeEffects, TreeError>;
}

/// Parent reference only; nothing to maintain.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjacencyListStrategy;

impl TreeStrategy for AdjacencyListStrategy {
    fn kind(&self) -> TreeKind {
        TreeKind::AdjacencyList
    }

    fn on_insert(&self, _: &TreeNode, _: Option<&TreeNode>) -> Result<TreeEffects, TreeError> {
        Ok(TreeEffects::default())
    }

    fn on_move(
        &self,
        _: &TreeNode,
        _: Option<&TreeNode>,
        _: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError> {
        Ok(TreeEffects::default())
    }

    fn on_remove(&self, _: &TreeNode) -> Result<TreeEffects, TreeError> {
        Ok(TreeEffects::default())
    }
}

/// Strategy for a tree entity, or `None` when the entity is not a tree.
pub fn strategy_for(graph: &SchemaGraph, entity: &EntitySchema) -> Option<Box<dyn TreeStrategy>> {
    let tree = entity.tree.as_ref()?;
    let column_name = |path: &Option<String>| {
        path.as_deref()
            .and_then(|p| entity.column(p))
            .map(|c| c.database_name.clone())
    };
    match tree.kind {
        TreeKind::AdjacencyList => Some(Box::new(AdjacencyListStrategy)),
        TreeKind::ClosureTable => {
            let closure = tree.closure.as_ref()?;
            Some(Box::new(ClosureTableStrategy {
                table: graph.entity(closure.entity).table.clone(),
                ancestor_columns: closure.ancestor_columns.iter().map(|(c, _)| c.clone()).collect(),
                descendant_columns: closure
                    .descendant_columns
                    .iter()
                    .map(|(c, _)| c.clone())
                    .collect(),
            }))
        }
        TreeKind::MaterializedPath => Some(Box::new(MaterializedPathStrategy {
            table: entity.table.clone(),
            column: column_name(&tree.path_column)?,
        })),
        TreeKind::NestedSet => Some(Box::new(NestedSetStrategy {
            table: entity.table.clone(),
            left_column: column_name(&tree.left_column)?,
            right_column: column_name(&tree.right_column)?,
        })),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::persist::SubjectId;
    use crate::value::Value;

    pub(crate) fn node(id: i64) -> TreeNode {
        TreeNode {
            entity: "Category".into(),
            label: id.to_string(),
            table: TableName::new(None, "category"),
            key: vec![ColumnValue::new("id", "id", StepValue::Value(Value::Int(id)))],
            path: None,
            bounds: None,
            soft_deleted: false,
            pending: false,
        }
    }

    pub(crate) fn new_node(subject: usize) -> TreeNode {
        TreeNode {
            label: "<new>".into(),
            key: vec![ColumnValue::new(
                "id",
                "id",
                StepValue::Generated {
                    subject: SubjectId(subject),
                    property: "id".into(),
                },
            )],
            pending: true,
            ..node(0)
        }
    }

    #[test]
    fn test_segment_of_composite_key() {
        let mut composite = node(1);
        composite
            .key
            .push(ColumnValue::new("tenant", "tenant", StepValue::Value(Value::Int(9))));
        let segment = composite
            .segment()
            .resolve(&mut |_, _| -> Result<Value, ()> { Err(()) })
            .unwrap();
        assert_eq!(segment, Value::String("1-9".into()));
    }

    #[test]
    fn test_adjacency_list_has_no_effects() {
        let effects = AdjacencyListStrategy.on_insert(&node(2), Some(&node(1))).unwrap();
        assert_eq!(effects, TreeEffects::default());
    }
}
