//! Indices, uniques, checks, exclusions and primary key names.

use super::SchemaBuilder;
use crate::error::MetadataError;
use crate::metadata::ReferentialAction;
use crate::schema::entity::{Check, EntityId, Exclusion, ForeignKey, Index, Unique};

impl<'a> SchemaBuilder<'a> {
    pub(super) fn resolve_constraints(&mut self) -> Result<(), MetadataError> {
        for index in 0..self.members.len() {
            let id = EntityId(index);
            let members = &self.members[index];

            let mut indices = Vec::new();
            for scoped in &members.indices {
                let table = self.entities[scoped.owner.0].table.clone();
                let columns = self.column_names(id, &scoped.def.columns)?;
                let name = scoped.def.name.clone().unwrap_or_else(|| {
                    self.naming
                        .index_name(&table.name, &columns, scoped.def.where_clause.as_deref())
                });
                indices.push(Index {
                    name,
                    table,
                    columns,
                    unique: scoped.def.unique,
                    spatial: scoped.def.spatial,
                    fulltext: scoped.def.fulltext,
                    where_clause: scoped.def.where_clause.clone(),
                });
            }

            let mut uniques = Vec::new();
            let declared = members
                .uniques
                .iter()
                .map(|s| (s.def.name.clone(), s.def.columns.clone(), s.owner));
            let column_level = members
                .unique_columns
                .iter()
                .map(|(path, owner)| (None, vec![path.clone()], *owner));
            for (name, paths, owner) in declared.chain(column_level) {
                let table = self.entities[owner.0].table.clone();
                let columns = self.column_names(id, &paths)?;
                let name = name
                    .unwrap_or_else(|| self.naming.unique_constraint_name(&table.name, &columns));
                uniques.push(Unique {
                    name,
                    table,
                    columns,
                });
            }

            let mut checks = Vec::new();
            for scoped in &members.checks {
                let table = self.entities[scoped.owner.0].table.clone();
                let name = scoped.def.name.clone().unwrap_or_else(|| {
                    self.naming
                        .check_constraint_name(&table.name, &scoped.def.expression)
                });
                checks.push(Check {
                    name,
                    table,
                    expression: scoped.def.expression.clone(),
                });
            }

            let mut exclusions = Vec::new();
            for scoped in &members.exclusions {
                let table = self.entities[scoped.owner.0].table.clone();
                let name = scoped.def.name.clone().unwrap_or_else(|| {
                    self.naming
                        .exclusion_constraint_name(&table.name, &scoped.def.expression)
                });
                exclusions.push(Exclusion {
                    name,
                    table,
                    expression: scoped.def.expression.clone(),
                });
            }

            let parent_key = self.class_table_parent_key(id);
            let entity = &self.entities[id.0];
            let primary: Vec<String> = entity
                .primary_columns()
                .map(|c| c.database_name.clone())
                .collect();
            let primary_key_name = self.naming.primary_key_name(&entity.table.name, &primary);

            let entity = &mut self.entities[id.0];
            entity.primary_key_name = primary_key_name;
            entity.indices.extend(indices);
            for unique in uniques {
                if !entity.uniques.iter().any(|u| u.name == unique.name) {
                    entity.uniques.push(unique);
                }
            }
            entity.checks.extend(checks);
            entity.exclusions.extend(exclusions);
            if let Some(foreign_key) = parent_key {
                entity.foreign_keys.push(foreign_key);
            }
        }
        Ok(())
    }

    /// Foreign key from a class-table child's primary key to its parent's table.
    fn class_table_parent_key(&self, id: EntityId) -> Option<ForeignKey> {
        let entity = &self.entities[id.0];
        if !entity.is_multi_table() {
            return None;
        }
        let parent = &self.entities[entity.parent?.0];
        let columns: Vec<String> = entity
            .primary_columns()
            .map(|c| c.database_name.clone())
            .collect();
        Some(ForeignKey {
            name: self.naming.foreign_key_name(
                &entity.table.name,
                &columns,
                &parent.table.name,
                &columns,
            ),
            table: entity.table.clone(),
            columns: columns.clone(),
            referenced_entity: parent.id,
            referenced_table: parent.table.clone(),
            referenced_columns: columns,
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
        })
    }

    /// Database names for property paths; a relation path stands for its join columns.
    fn column_names(&self, id: EntityId, paths: &[String]) -> Result<Vec<String>, MetadataError> {
        let entity = &self.entities[id.0];
        let mut names = Vec::new();
        for path in paths {
            if let Some(column) = entity
                .columns
                .iter()
                .find(|c| &c.property_path == path || &c.database_name == path)
            {
                names.push(column.database_name.clone());
                continue;
            }
            match entity.relation(path) {
                Some(relation) if !relation.join_columns.is_empty() => {
                    for join in &relation.join_columns {
                        if let Some(column) = entity.column(join) {
                            names.push(column.database_name.clone());
                        }
                    }
                }
                _ => {
                    return Err(MetadataError::EntityColumnNotFound {
                        entity: entity.name.clone(),
                        column: path.clone(),
                    })
                }
            }
        }
        Ok(names)
    }
}
