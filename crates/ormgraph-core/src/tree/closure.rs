//! Closure table strategy.

use super::{TreeEffects, TreeNode, TreeOperation, TreeStrategy};
use crate::error::TreeError;
use crate::metadata::TreeKind;
use crate::schema::TableName;

/// Keeps one row per ancestor/descendant pair, self pairs included.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureTableStrategy {
    /// Closure table.
    pub table: TableName,
    /// Ancestor column names, in primary key order.
    pub ancestor_columns: Vec<String>,
    /// Descendant column names, in primary key order.
    pub descendant_columns: Vec<String>,
}

impl TreeStrategy for ClosureTableStrategy {
    fn kind(&self) -> TreeKind {
        TreeKind::ClosureTable
    }

    fn on_insert(
        &self,
        node: &TreeNode,
        parent: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError> {
        Ok(TreeEffects {
            after: vec![TreeOperation::ClosureInsert {
                table: self.table.clone(),
                ancestor_columns: self.ancestor_columns.clone(),
                descendant_columns: self.descendant_columns.clone(),
                node: node.key_values(),
                parent: parent.map(TreeNode::key_values),
            }],
            ..TreeEffects::default()
        })
    }

    fn on_move(
        &self,
        node: &TreeNode,
        _old_parent: Option<&TreeNode>,
        new_parent: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError> {
        Ok(TreeEffects {
            after: vec![TreeOperation::ClosureMove {
                table: self.table.clone(),
                ancestor_columns: self.ancestor_columns.clone(),
                descendant_columns: self.descendant_columns.clone(),
                node: node.key_values(),
                parent: new_parent.map(TreeNode::key_values),
            }],
            ..TreeEffects::default()
        })
    }

    fn on_remove(&self, node: &TreeNode) -> Result<TreeEffects, TreeError> {
        Ok(TreeEffects {
            before: vec![TreeOperation::ClosureRemove {
                table: self.table.clone(),
                ancestor_columns: self.ancestor_columns.clone(),
                descendant_columns: self.descendant_columns.clone(),
                node: node.key_values(),
            }],
            ..TreeEffects::default()
        })
    }
}
