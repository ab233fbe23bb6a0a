//! Materialized path strategy.
//!
//! Each row stores its ancestor chain as `"<rootId>.<...>.<id>."`. A root's
//! path is `"<id>."`. Ancestry is resolved through soft-deleted rows: a move
//! rewrites the paths of soft-deleted descendants too. Attaching a node under
//! a soft-deleted parent is rejected.

use super::{TreeEffects, TreeNode, TreeOperation, TreeStrategy};
use crate::error::TreeError;
use crate::metadata::TreeKind;
use crate::persist::StepValue;
use crate::schema::TableName;

/// Separator closing every path segment.
const SEPARATOR: &str = ".";

/// Maintains the path column of a tree entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedPathStrategy {
    /// Tree table.
    pub table: TableName,
    /// Path column name.
    pub column: String,
}

impl MaterializedPathStrategy {
    fn path_under(
        &self,
        node: &TreeNode,
        parent: Option<&TreeNode>,
    ) -> Result<StepValue, TreeError> {
        let mut parts = Vec::new();
        if let Some(parent) = parent {
            if parent.soft_deleted {
                return Err(TreeError::SoftDeletedAncestor {
                    entity: node.entity.clone(),
                    ancestor: parent.label.clone(),
                });
            }
            let parent_path = parent.path.clone().ok_or_else(|| TreeError::MissingPath {
                entity: parent.entity.clone(),
                node: parent.label.clone(),
            })?;
            parts.push(parent_path);
        }
        parts.push(node.segment());
        parts.push(StepValue::text(SEPARATOR));
        Ok(StepValue::Concat(parts))
    }
}

impl TreeStrategy for MaterializedPathStrategy {
    fn kind(&self) -> TreeKind {
        TreeKind::MaterializedPath
    }

    fn on_insert(
        &self,
        node: &TreeNode,
        parent: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError> {
        let path = self.path_under(node, parent)?;
        Ok(TreeEffects {
            after: vec![TreeOperation::SetPath {
                table: self.table.clone(),
                column: self.column.clone(),
                key: node.key.clone(),
                path: path.clone(),
            }],
            path: Some(path),
            ..TreeEffects::default()
        })
    }

    fn on_move(
        &self,
        node: &TreeNode,
        _old_parent: Option<&TreeNode>,
        new_parent: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError> {
        let old_path = node
            .known_path()
            .ok_or_else(|| TreeError::MissingPath {
                entity: node.entity.clone(),
                node: node.label.clone(),
            })?
            .to_string();
        if let Some(parent_path) = new_parent.and_then(TreeNode::known_path) {
            if parent_path.starts_with(&old_path) {
                return Err(TreeError::MoveIntoOwnSubtree {
                    entity: node.entity.clone(),
                    node: node.label.clone(),
                });
            }
        }

        let path = self.path_under(node, new_parent)?;
        Ok(TreeEffects {
            after: vec![TreeOperation::RewritePathPrefix {
                table: self.table.clone(),
                column: self.column.clone(),
                old_prefix: old_path,
                new_prefix: path.clone(),
            }],
            path: Some(path),
            ..TreeEffects::default()
        })
    }

    fn on_remove(&self, _node: &TreeNode) -> Result<TreeEffects, TreeError> {
        Ok(TreeEffects::default())
    }
}
