//! Junction entities of many-to-many relations.

use super::hierarchy::generated_entity;
use super::SchemaBuilder;
use crate::error::MetadataError;
use crate::metadata::{
    ColumnRole, Generation, JoinColumnDef, JoinTableDef, ReferentialAction, RelationKind,
};
use crate::schema::entity::{
    Column, EntityId, EntityKind, ForeignKey, Index, JunctionRef, TableName,
};
use std::collections::HashMap;
use tracing::debug;

/// One side of a junction table: column names and the columns they reference.
struct Side<'a> {
    table: TableName,
    entity: EntityId,
    names: Vec<String>,
    referenced: Vec<(Option<&'a JoinColumnDef>, Column)>,
}

impl<'a> SchemaBuilder<'a> {
    /// Create one junction entity per owning many-to-many relation.
    ///
    /// Relations inherited by several members of a single-table hierarchy
    /// resolve to the same junction table and share it.
    pub(super) fn resolve_junctions(&mut self) -> Result<(), MetadataError> {
        let mut junctions: HashMap<String, JunctionRef> = HashMap::new();

        for index in 0..self.members.len() {
            for position in 0..self.members[index].relations.len() {
                let flat = &self.members[index].relations[position];
                let def = flat.def;
                let Some(join_table) = def.join_table.as_ref() else {
                    continue;
                };
                if def.kind != RelationKind::ManyToMany {
                    continue;
                }
                let owner = flat.owner;
                let path = flat.path.clone();
                let target = self.entities[index].relations[position].target;

                let owner_table = &self.entities[owner.0].table;
                let target_table = &self.entities[target.0].table;
                let name = join_table.name.clone().unwrap_or_else(|| {
                    self.naming
                        .join_table_name(&owner_table.name, &target_table.name, &path)
                });
                let table = TableName::new(owner_table.schema.clone(), name);

                let junction = match junctions.get(&table.qualified()) {
                    Some(junction) => junction.clone(),
                    None => {
                        let junction = self.create_junction(
                            owner,
                            target,
                            join_table,
                            def.on_delete,
                            def.on_update,
                            table.clone(),
                        )?;
                        junctions.insert(table.qualified(), junction.clone());
                        junction
                    }
                };
                self.entities[index].relations[position].junction = Some(junction);
            }
        }
        Ok(())
    }

    fn create_junction(
        &mut self,
        owner: EntityId,
        target: EntityId,
        join_table: &'a JoinTableDef,
        on_delete: ReferentialAction,
        on_update: ReferentialAction,
        table: TableName,
    ) -> Result<JunctionRef, MetadataError> {
        let mut owner_side = self.junction_side(owner, &join_table.join_columns)?;
        let mut target_side = self.junction_side(target, &join_table.inverse_join_columns)?;

        if !join_table.preserve_shared_columns {
            for i in 0..owner_side.names.len() {
                let Some(j) = target_side
                    .names
                    .iter()
                    .position(|n| n == &owner_side.names[i])
                else {
                    continue;
                };
                let preserved = owner_side.referenced[i]
                    .0
                    .map(|d| d.preserve_shared_column)
                    .unwrap_or(false)
                    || target_side.referenced[j]
                        .0
                        .map(|d| d.preserve_shared_column)
                        .unwrap_or(false);
                if preserved {
                    continue;
                }
                let shared = owner_side.names[i].clone();
                owner_side.names[i] = self.naming.join_table_column_duplication_suffix(&shared, 1);
                target_side.names[j] = self.naming.join_table_column_duplication_suffix(&shared, 2);
            }
        }

        let mut columns: Vec<Column> = Vec::new();
        for side in [&owner_side, &target_side] {
            for (name, (_, referenced)) in side.names.iter().zip(&side.referenced) {
                if columns.iter().any(|c| &c.database_name == name) {
                    continue;
                }
                columns.push(key_column(name, referenced));
            }
        }
        let column_names: Vec<String> = columns.iter().map(|c| c.database_name.clone()).collect();

        let mut schema = generated_entity(&table.name, EntityKind::Junction, table.clone());
        schema.primary_key_name = self.naming.primary_key_name(&table.name, &column_names);
        schema.columns = columns;

        let owner_action = match on_delete {
            ReferentialAction::NoAction => ReferentialAction::Cascade,
            action => action,
        };
        let sides = [
            (&owner_side, owner_action),
            (&target_side, ReferentialAction::Cascade),
        ];
        for (side, action) in sides {
            let referenced_columns: Vec<String> = side
                .referenced
                .iter()
                .map(|(_, c)| c.database_name.clone())
                .collect();
            schema.foreign_keys.push(ForeignKey {
                name: self.naming.foreign_key_name(
                    &table.name,
                    &side.names,
                    &side.table.name,
                    &referenced_columns,
                ),
                table: table.clone(),
                columns: side.names.clone(),
                referenced_entity: side.entity,
                referenced_table: side.table.clone(),
                referenced_columns,
                on_delete: action,
                on_update,
            });
            schema.indices.push(Index {
                name: self.naming.index_name(&table.name, &side.names, None),
                table: table.clone(),
                columns: side.names.clone(),
                unique: false,
                spatial: false,
                fulltext: false,
                where_clause: None,
            });
        }

        let entity = self.push_entity(schema);
        debug!(junction = %table, "junction table created");

        let pairs = |side: &Side<'a>| -> Vec<(String, String)> {
            side.names
                .iter()
                .zip(&side.referenced)
                .map(|(name, (_, c))| (name.clone(), c.property_path.clone()))
                .collect()
        };
        Ok(JunctionRef {
            entity,
            owner_columns: pairs(&owner_side),
            target_columns: pairs(&target_side),
        })
    }

    fn junction_side(
        &self,
        entity: EntityId,
        join_defs: &'a [JoinColumnDef],
    ) -> Result<Side<'a>, MetadataError> {
        let table = self.entities[entity.0].table.clone();
        let referenced = self
            .referenced_columns(entity, join_defs, true)?
            .unwrap_or_default();
        let names = referenced
            .iter()
            .map(|(join_def, column)| match join_def.and_then(|d| d.name.clone()) {
                Some(name) => name,
                None => self
                    .naming
                    .join_table_column_name(&table.name, &column.database_name),
            })
            .collect();
        Ok(Side {
            table,
            entity,
            names,
            referenced,
        })
    }
}

/// Primary key column of a generated entity, typed after the column it references.
pub(super) fn key_column(name: &str, referenced: &Column) -> Column {
    Column {
        property_path: name.to_string(),
        property_name: name.to_string(),
        database_name: name.to_string(),
        column_type: referenced.column_type.clone(),
        nullable: false,
        primary: true,
        generation: Generation::None,
        default: None,
        length: referenced.length,
        precision: referenced.precision,
        scale: referenced.scale,
        collation: referenced.collation.clone(),
        role: ColumnRole::Regular,
        table_owner: EntityId(0),
        declared_by: EntityId(0),
        embedded_path: None,
        reference: None,
    }
}
