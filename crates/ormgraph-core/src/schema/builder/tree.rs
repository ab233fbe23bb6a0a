//! Tree entities: bookkeeping columns and closure tables.

use super::hierarchy::generated_entity;
use super::junction::key_column;
use super::SchemaBuilder;
use crate::error::MetadataError;
use crate::metadata::{
    ColumnRole, ColumnType, DefaultValue, EntityDef, Generation, ReferentialAction, RelationKind,
    TreeKind,
};
use crate::schema::entity::{
    ClosureRef, Column, EntityId, EntityKind, ForeignKey, TableName, TreeSchema,
};
use std::collections::HashMap;
use tracing::debug;

impl<'a> SchemaBuilder<'a> {
    /// Tree kind declared by `def` or the nearest ancestor.
    fn tree_kind(&self, def: &'a EntityDef) -> Result<Option<TreeKind>, MetadataError> {
        let mut current = def;
        loop {
            if current.tree.is_some() {
                return Ok(current.tree);
            }
            match &current.parent {
                Some(parent) => current = self.def(parent)?,
                None => return Ok(None),
            }
        }
    }

    pub(super) fn add_tree_columns(
        &self,
        def: &'a EntityDef,
        id: EntityId,
        columns: &mut Vec<Column>,
    ) -> Result<(), MetadataError> {
        let owner = self.entities[id.0].tables[0];
        let specials: Vec<(&str, ColumnRole, ColumnType, DefaultValue, bool)> =
            match self.tree_kind(def)? {
                Some(TreeKind::MaterializedPath) => vec![(
                    "mpath",
                    ColumnRole::MaterializedPath,
                    ColumnType::Varchar,
                    DefaultValue::String(String::new()),
                    true,
                )],
                Some(TreeKind::NestedSet) => vec![
                    (
                        "nsleft",
                        ColumnRole::NestedSetLeft,
                        ColumnType::Integer,
                        DefaultValue::Int(1),
                        false,
                    ),
                    (
                        "nsright",
                        ColumnRole::NestedSetRight,
                        ColumnType::Integer,
                        DefaultValue::Int(2),
                        false,
                    ),
                ],
                _ => Vec::new(),
            };

        for (name, role, column_type, default, nullable) in specials {
            if columns.iter().any(|c| c.role == role) {
                continue;
            }
            columns.push(Column {
                property_path: name.to_string(),
                property_name: name.to_string(),
                database_name: self.naming.column_name(name, None, &[]),
                column_type,
                nullable,
                primary: false,
                generation: Generation::None,
                default: Some(default),
                length: None,
                precision: None,
                scale: None,
                collation: None,
                role,
                table_owner: owner,
                declared_by: owner,
                embedded_path: None,
                reference: None,
            });
        }
        Ok(())
    }

    pub(super) fn resolve_trees(&mut self) -> Result<(), MetadataError> {
        let mut closures: HashMap<String, ClosureRef> = HashMap::new();
        let concrete: Vec<&'a EntityDef> = self
            .registry
            .entities
            .iter()
            .filter(|d| !d.is_abstract)
            .collect();

        for def in concrete {
            let Some(kind) = self.tree_kind(def)? else {
                continue;
            };
            let id = self.ids[&def.name];
            let invalid = |reason: &str| MetadataError::InvalidTree {
                entity: def.name.clone(),
                reason: reason.to_string(),
            };

            let entity = &self.entities[id.0];
            let self_parents: Vec<_> = entity
                .relations
                .iter()
                .filter(|r| {
                    r.kind == RelationKind::ManyToOne && self.is_same_or_descendant(id, r.target)
                })
                .collect();
            let parent = match self_parents.iter().find(|r| r.tree_parent) {
                Some(parent) => *parent,
                None if self_parents.len() == 1 => self_parents[0],
                None if self_parents.is_empty() => {
                    return Err(invalid("no many-to-one parent relation to itself"))
                }
                None => {
                    return Err(invalid("parent relation is ambiguous; mark one as tree parent"))
                }
            };
            let parent_relation = parent.property_path.clone();
            let children_relation = entity
                .relations
                .iter()
                .find(|r| {
                    r.tree_children
                        || (r.kind == RelationKind::OneToMany
                            && r.inverse.as_deref() == Some(parent_relation.as_str()))
                })
                .map(|r| r.property_path.clone());
            let role_path = |role: ColumnRole| {
                entity
                    .column_with_role(role)
                    .map(|c| c.property_path.clone())
            };
            let path_column = role_path(ColumnRole::MaterializedPath);
            let left_column = role_path(ColumnRole::NestedSetLeft);
            let right_column = role_path(ColumnRole::NestedSetRight);
            let table = entity.table.clone();

            let closure = if kind == TreeKind::ClosureTable {
                let closure = match closures.get(&table.qualified()) {
                    Some(closure) => closure.clone(),
                    None => {
                        let closure = self.create_closure(id, &table)?;
                        closures.insert(table.qualified(), closure.clone());
                        closure
                    }
                };
                Some(closure)
            } else {
                None
            };

            self.entities[id.0].tree = Some(TreeSchema {
                kind,
                parent_relation,
                children_relation,
                closure,
                path_column,
                left_column,
                right_column,
            });
            debug!(entity = %def.name, ?kind, "tree resolved");
        }
        Ok(())
    }

    fn create_closure(
        &mut self,
        id: EntityId,
        table: &TableName,
    ) -> Result<ClosureRef, MetadataError> {
        let primary: Vec<Column> = self.entities[id.0].primary_columns().cloned().collect();
        let name = self.naming.closure_junction_table_name(&table.name);
        let closure_table = TableName::new(table.schema.clone(), name.clone());

        let mut ancestor_columns = Vec::new();
        let mut descendant_columns = Vec::new();
        let mut columns = Vec::new();
        for column in &primary {
            let ancestor = self.naming.closure_column_name(&column.database_name, true);
            let descendant = self.naming.closure_column_name(&column.database_name, false);
            columns.push(key_column(&ancestor, column));
            columns.push(key_column(&descendant, column));
            ancestor_columns.push((ancestor, column.property_path.clone()));
            descendant_columns.push((descendant, column.property_path.clone()));
        }

        let mut schema = generated_entity(&name, EntityKind::Closure, closure_table.clone());
        let column_names: Vec<String> = columns.iter().map(|c| c.database_name.clone()).collect();
        schema.primary_key_name = self.naming.primary_key_name(&name, &column_names);
        schema.columns = columns;

        let referenced: Vec<String> = primary.iter().map(|c| c.database_name.clone()).collect();
        for side in [&ancestor_columns, &descendant_columns] {
            let local: Vec<String> = side.iter().map(|(name, _)| name.clone()).collect();
            schema.foreign_keys.push(ForeignKey {
                name: self
                    .naming
                    .foreign_key_name(&name, &local, &table.name, &referenced),
                table: closure_table.clone(),
                columns: local,
                referenced_entity: id,
                referenced_table: table.clone(),
                referenced_columns: referenced.clone(),
                on_delete: ReferentialAction::Cascade,
                on_update: ReferentialAction::NoAction,
            });
        }

        let entity = self.push_entity(schema);
        debug!(closure = %closure_table, "closure table created");
        Ok(ClosureRef {
            entity,
            ancestor_columns,
            descendant_columns,
        })
    }
}
