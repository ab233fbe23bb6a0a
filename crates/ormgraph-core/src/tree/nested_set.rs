//! Nested set strategy.
//!
//! Every row holds left/right bounds enclosing the bounds of its subtree.
//! Inserting or moving shifts the bounds of every row to the right of the
//! insertion point, so these operations touch a whole table range.

use super::{TreeEffects, TreeNode, TreeOperation, TreeStrategy};
use crate::error::TreeError;
use crate::metadata::TreeKind;
use crate::persist::ColumnValue;
use crate::schema::TableName;
use crate::value::Value;

/// Maintains left/right bounds of a tree entity.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedSetStrategy {
    /// Tree table.
    pub table: TableName,
    /// Left bound column name.
    pub left_column: String,
    /// Right bound column name.
    pub right_column: String,
}

impl NestedSetStrategy {
    fn bounds_of(node: &TreeNode) -> Result<(i64, i64), TreeError> {
        node.bounds.ok_or_else(|| TreeError::MissingTreeBounds {
            entity: node.entity.clone(),
            node: node.label.clone(),
        })
    }
}

impl TreeStrategy for NestedSetStrategy {
    fn kind(&self) -> TreeKind {
        TreeKind::NestedSet
    }

    fn on_insert(
        &self,
        node: &TreeNode,
        parent: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError> {
        let Some(parent) = parent else {
            return Ok(TreeEffects {
                after: vec![TreeOperation::AppendRoot {
                    table: self.table.clone(),
                    left_column: self.left_column.clone(),
                    right_column: self.right_column.clone(),
                    key: node.key.clone(),
                }],
                ..TreeEffects::default()
            });
        };

        if parent.bounds.is_none() && parent.pending {
            return Ok(TreeEffects {
                after: vec![TreeOperation::AppendChild {
                    table: self.table.clone(),
                    left_column: self.left_column.clone(),
                    right_column: self.right_column.clone(),
                    key: node.key.clone(),
                    parent: parent.key.clone(),
                }],
                ..TreeEffects::default()
            });
        }

        let (_, right) = Self::bounds_of(parent)?;
        Ok(TreeEffects {
            before: vec![TreeOperation::ShiftBounds {
                table: self.table.clone(),
                left_column: self.left_column.clone(),
                right_column: self.right_column.clone(),
                from: right,
                delta: 2,
            }],
            values: vec![
                ColumnValue::new(
                    self.left_column.clone(),
                    self.left_column.clone(),
                    Value::Int(right).into(),
                ),
                ColumnValue::new(
                    self.right_column.clone(),
                    self.right_column.clone(),
                    Value::Int(right + 1).into(),
                ),
            ],
            bounds: Some((right, right + 1)),
            ..TreeEffects::default()
        })
    }

    fn on_move(
        &self,
        node: &TreeNode,
        _old_parent: Option<&TreeNode>,
        new_parent: Option<&TreeNode>,
    ) -> Result<TreeEffects, TreeError> {
        let (left, right) = Self::bounds_of(node)?;
        let target = match new_parent {
            Some(parent) => {
                let (parent_left, parent_right) = Self::bounds_of(parent)?;
                if parent_left >= left && parent_left <= right {
                    return Err(TreeError::MoveIntoOwnSubtree {
                        entity: node.entity.clone(),
                        node: node.label.clone(),
                    });
                }
                Some(parent_right)
            }
            None => None,
        };
        let bounds = target.map(|target| {
            (
                moved_bound(left, left, right, target),
                moved_bound(right, left, right, target),
            )
        });
        Ok(TreeEffects {
            after: vec![TreeOperation::MoveSubtree {
                table: self.table.clone(),
                left_column: self.left_column.clone(),
                right_column: self.right_column.clone(),
                left,
                right,
                target,
            }],
            bounds,
            ..TreeEffects::default()
        })
    }

    fn on_remove(&self, node: &TreeNode) -> Result<TreeEffects, TreeError> {
        let (left, right) = Self::bounds_of(node)?;
        Ok(TreeEffects {
            after: vec![TreeOperation::ShiftBounds {
                table: self.table.clone(),
                left_column: self.left_column.clone(),
                right_column: self.right_column.clone(),
                from: right + 1,
                delta: -(right - left + 1),
            }],
            ..TreeEffects::default()
        })
    }
}

/// A bound after a [`TreeOperation::ShiftBounds`].
pub fn shifted_bound(bound: i64, from: i64, delta: i64) -> i64 {
    if bound >= from {
        bound + delta
    } else {
        bound
    }
}

/// A bound after the subtree `[left, right]` moves to end right before `target`.
///
/// `target` is the new parent's right bound and lies outside the subtree.
/// Rows between the old and new position close or open the gap.
pub fn moved_bound(bound: i64, left: i64, right: i64, target: i64) -> i64 {
    let width = right - left + 1;
    let inside = bound >= left && bound <= right;
    if target > right {
        if inside {
            bound + (target - right - 1)
        } else if bound > right && bound < target {
            bound - width
        } else {
            bound
        }
    } else if inside {
        bound - (left - target)
    } else if bound >= target && bound < left {
        bound + width
    } else {
        bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::StepValue;
    use crate::tree::tests::{new_node, node};

    fn strategy() -> NestedSetStrategy {
        NestedSetStrategy {
            table: TableName::new(None, "category"),
            left_column: "nsleft".into(),
            right_column: "nsright".into(),
        }
    }

    fn bounded(id: i64, left: i64, right: i64) -> TreeNode {
        let mut n = node(id);
        n.bounds = Some((left, right));
        n
    }

    #[test]
    fn test_insert_shifts_by_two() {
        let parent = bounded(1, 1, 2);
        let effects = strategy().on_insert(&new_node(0), Some(&parent)).unwrap();
        assert_eq!(
            effects.before,
            vec![TreeOperation::ShiftBounds {
                table: TableName::new(None, "category"),
                left_column: "nsleft".into(),
                right_column: "nsright".into(),
                from: 2,
                delta: 2,
            }]
        );
        assert_eq!(effects.bounds, Some((2, 3)));
        assert_eq!(effects.values[0].value, StepValue::Value(Value::Int(2)));
        assert_eq!(effects.values[1].value, StepValue::Value(Value::Int(3)));
        assert_eq!(shifted_bound(2, 2, 2), 4);
        assert_eq!(shifted_bound(1, 2, 2), 1);
    }

    #[test]
    fn test_root_insert_appends() {
        let effects = strategy().on_insert(&new_node(0), None).unwrap();
        assert!(effects.bounds.is_none());
        assert!(matches!(&effects.after[..], [TreeOperation::AppendRoot { .. }]));
    }

    #[test]
    fn test_insert_under_pending_root() {
        let root = new_node(0);
        let effects = strategy().on_insert(&new_node(1), Some(&root)).unwrap();
        assert!(effects.before.is_empty());
        assert!(effects.bounds.is_none());
        match &effects.after[..] {
            [TreeOperation::AppendChild { key, parent, .. }] => {
                assert_eq!(key, &new_node(1).key);
                assert_eq!(parent, &root.key);
            }
            other => panic!("unexpected operations: {other:?}"),
        }
    }

    #[test]
    fn test_insert_under_unbounded_parent() {
        let err = strategy().on_insert(&new_node(0), Some(&node(1))).unwrap_err();
        assert!(matches!(err, TreeError::MissingTreeBounds { .. }));
    }

    #[test]
    fn test_moved_bounds() {
        // root(1,6) with children a(2,3) and b(4,5)
        // a moves under b
        let moved: Vec<_> = [1, 2, 3, 4, 5, 6]
            .iter()
            .map(|b| moved_bound(*b, 2, 3, 5))
            .collect();
        assert_eq!(moved, vec![1, 3, 4, 2, 5, 6]);

        // b moves under a
        let moved: Vec<_> = [1, 2, 3, 4, 5, 6]
            .iter()
            .map(|b| moved_bound(*b, 4, 5, 3))
            .collect();
        assert_eq!(moved, vec![1, 2, 5, 3, 4, 6]);
    }

    #[test]
    fn test_move_into_own_subtree() {
        let moved = bounded(2, 2, 7);
        let below = bounded(3, 3, 4);
        let err = strategy().on_move(&moved, None, Some(&below)).unwrap_err();
        assert!(matches!(err, TreeError::MoveIntoOwnSubtree { .. }));
    }

    #[test]
    fn test_remove_closes_gap() {
        let effects = strategy().on_remove(&bounded(2, 2, 5)).unwrap();
        assert!(matches!(
            &effects.after[..],
            [TreeOperation::ShiftBounds { from: 6, delta: -4, .. }]
        ));
    }
}
