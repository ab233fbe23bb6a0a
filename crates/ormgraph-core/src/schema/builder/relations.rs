//! Join columns of owning to-one relations and inverse relation resolution.

use super::SchemaBuilder;
use crate::error::MetadataError;
use crate::metadata::{JoinColumnDef, RelationKind};
use crate::schema::entity::{
    Column, ColumnReference, EntityId, ForeignKey, JunctionRef, Relation, Unique,
};
use tracing::debug;

impl<'a> SchemaBuilder<'a> {
    /// Synthesize join columns and foreign keys for many-to-one and owning
    /// one-to-one relations.
    ///
    /// A referenced column may itself be a join column still waiting for its
    /// type, so relations are resolved in rounds until none makes progress.
    pub(super) fn resolve_join_columns(&mut self) -> Result<(), MetadataError> {
        let mut pending = Vec::new();
        for (index, members) in self.members.iter().enumerate() {
            for (position, flat) in members.relations.iter().enumerate() {
                let def = flat.def;
                let holds_columns = def.kind == RelationKind::ManyToOne
                    || (def.kind == RelationKind::OneToOne && def.join_columns.is_some());
                if holds_columns {
                    pending.push((EntityId(index), position));
                }
            }
        }

        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for (id, position) in pending {
                if !self.resolve_join_relation(id, position, false)? {
                    deferred.push((id, position));
                }
            }
            if deferred.len() == before {
                let (id, position) = deferred[0];
                // A final attempt reports why the relation cannot be resolved.
                self.resolve_join_relation(id, position, true)?;
            }
            pending = deferred;
        }
        Ok(())
    }

    fn resolve_join_relation(
        &mut self,
        id: EntityId,
        position: usize,
        last_attempt: bool,
    ) -> Result<bool, MetadataError> {
        let flat = &self.members[id.0].relations[position];
        let def = flat.def;
        let path = flat.path.clone();
        let prefixes = flat.prefixes.clone();
        let owner = flat.owner;
        let declared_by = flat.declared_by;
        let target = self.entities[id.0].relations[position].target;

        let join_defs = def.join_columns.as_deref().unwrap_or(&[]);
        let Some(referenced) = self.referenced_columns(target, join_defs, last_attempt)? else {
            return Ok(false);
        };

        let mut join_paths = Vec::new();
        let mut join_names = Vec::new();
        for (join_def, referenced_column) in &referenced {
            let name = match join_def.and_then(|j| j.name.clone()) {
                Some(name) => name,
                None => {
                    let base = self
                        .naming
                        .join_column_name(&def.property, &referenced_column.database_name);
                    self.naming.column_name(&base, None, &prefixes)
                }
            };
            let preserve = join_def.map(|j| j.preserve_shared_column).unwrap_or(false);
            let reference = ColumnReference {
                relation: path.clone(),
                target,
                referenced_column: referenced_column.property_path.clone(),
            };

            let entity = &mut self.entities[id.0];
            let shared = entity
                .columns
                .iter_mut()
                .find(|c| c.database_name == name && c.table_owner == owner);
            let column_path = match shared {
                Some(existing) => {
                    let untyped = self.untyped.remove(&(id, existing.property_path.clone()));
                    if !preserve || untyped {
                        existing.column_type = referenced_column.column_type.clone();
                        existing.length = referenced_column.length;
                        existing.precision = referenced_column.precision;
                        existing.scale = referenced_column.scale;
                    }
                    existing.reference = Some(reference);
                    existing.property_path.clone()
                }
                None => {
                    let column_path = format!("{}.{}", path, referenced_column.property_path);
                    entity.columns.push(Column {
                        property_path: column_path.clone(),
                        property_name: referenced_column.property_name.clone(),
                        database_name: name.clone(),
                        column_type: referenced_column.column_type.clone(),
                        nullable: def.nullable,
                        primary: false,
                        generation: Default::default(),
                        default: None,
                        length: referenced_column.length,
                        precision: referenced_column.precision,
                        scale: referenced_column.scale,
                        collation: referenced_column.collation.clone(),
                        role: Default::default(),
                        table_owner: owner,
                        declared_by,
                        embedded_path: path.rsplit_once('.').map(|(p, _)| p.to_string()),
                        reference: Some(reference),
                    });
                    column_path
                }
            };
            join_paths.push(column_path);
            join_names.push(name);
        }

        let table = self.entities[owner.0].table.clone();
        let referenced_names: Vec<String> = referenced
            .iter()
            .map(|(_, c)| c.database_name.clone())
            .collect();
        let referenced_table = match referenced.first() {
            Some((_, c)) if !c.primary => self.entities[c.table_owner.0].table.clone(),
            _ => self.entities[target.0].table.clone(),
        };

        if def.create_foreign_key {
            let foreign_key = ForeignKey {
                name: self.naming.foreign_key_name(
                    &table.name,
                    &join_names,
                    &referenced_table.name,
                    &referenced_names,
                ),
                table: table.clone(),
                columns: join_names.clone(),
                referenced_entity: target,
                referenced_table,
                referenced_columns: referenced_names,
                on_delete: def.on_delete,
                on_update: def.on_update,
            };
            let entity = &mut self.entities[id.0];
            if !entity.foreign_keys.iter().any(|fk| fk.name == foreign_key.name) {
                entity.foreign_keys.push(foreign_key);
            }
        }

        if def.kind == RelationKind::OneToOne {
            let unique = Unique {
                name: self.naming.relation_constraint_name(&table.name, &join_names),
                table,
                columns: join_names,
            };
            self.entities[id.0].uniques.push(unique);
        }

        debug!(
            entity = %self.entities[id.0].name,
            relation = %path,
            columns = ?join_paths,
            "join columns resolved"
        );
        self.entities[id.0].relations[position].join_columns = join_paths;
        Ok(true)
    }

    /// Target columns referenced by a relation's join columns.
    ///
    /// Returns `None` while a referenced column is still untyped, unless this
    /// is the last attempt.
    pub(super) fn referenced_columns(
        &self,
        target: EntityId,
        join_defs: &'a [JoinColumnDef],
        last_attempt: bool,
    ) -> Result<Option<Vec<(Option<&'a JoinColumnDef>, Column)>>, MetadataError> {
        let entity = &self.entities[target.0];
        let primary: Vec<&Column> = entity.primary_columns().collect();
        if primary.is_empty() {
            return Err(MetadataError::MissingPrimaryKey {
                entity: entity.name.clone(),
            });
        }

        let mut referenced = Vec::new();
        if join_defs.is_empty() {
            referenced.extend(primary.iter().map(|c| (None, (*c).clone())));
        } else {
            for join_def in join_defs {
                let column = match &join_def.referenced_column {
                    Some(path) => entity
                        .columns
                        .iter()
                        .find(|c| &c.property_path == path || &c.database_name == path),
                    None if primary.len() == 1 => Some(primary[0]),
                    None => None,
                };
                let column = column.ok_or_else(|| MetadataError::EntityColumnNotFound {
                    entity: entity.name.clone(),
                    column: join_def
                        .referenced_column
                        .clone()
                        .unwrap_or_else(|| "<composite primary key>".to_string()),
                })?;
                referenced.push((Some(join_def), column.clone()));
            }
        }

        let waiting = referenced
            .iter()
            .find(|(_, c)| self.untyped.contains(&(target, c.property_path.clone())));
        match waiting {
            Some((_, column)) if last_attempt => Err(MetadataError::ColumnTypeUndefined {
                entity: entity.name.clone(),
                property: column.property_path.clone(),
            }),
            Some(_) => Ok(None),
            None => Ok(Some(referenced)),
        }
    }

    /// Link inverse sides to their owning relations.
    pub(super) fn resolve_inverse_relations(&mut self) -> Result<(), MetadataError> {
        for index in 0..self.members.len() {
            let id = EntityId(index);
            for position in 0..self.entities[index].relations.len() {
                let relation = self.entities[index].relations[position].clone();
                let linked = match (relation.kind, relation.owning) {
                    (RelationKind::OneToMany, _) => {
                        let inverse = self.find_inverse(id, &relation, RelationKind::ManyToOne)?;
                        Some((inverse.property_path, None))
                    }
                    (RelationKind::OneToOne, false) => {
                        let inverse = self.find_inverse(id, &relation, RelationKind::OneToOne)?;
                        Some((inverse.property_path, None))
                    }
                    (RelationKind::ManyToMany, false) => {
                        let inverse = self.find_inverse(id, &relation, RelationKind::ManyToMany)?;
                        let junction = inverse.junction.map(|j| JunctionRef {
                            entity: j.entity,
                            owner_columns: j.target_columns,
                            target_columns: j.owner_columns,
                        });
                        Some((inverse.property_path, junction))
                    }
                    _ => {
                        if let Some(inverse) = &relation.inverse {
                            if self.entities[relation.target.0].relation(inverse).is_none() {
                                return Err(self.invalid_relation(
                                    id,
                                    &relation,
                                    format!("inverse '{inverse}' does not exist on the target"),
                                ));
                            }
                        }
                        None
                    }
                };

                if let Some((inverse, junction)) = linked {
                    let relation = &mut self.entities[index].relations[position];
                    relation.inverse = Some(inverse);
                    if junction.is_some() {
                        relation.junction = junction;
                    }
                }
            }
        }
        Ok(())
    }

    /// The owning relation on the target that `relation` mirrors.
    fn find_inverse(
        &self,
        id: EntityId,
        relation: &Relation,
        kind: RelationKind,
    ) -> Result<Relation, MetadataError> {
        let target = &self.entities[relation.target.0];
        let found = match &relation.inverse {
            Some(name) => target.relation(name),
            None => target.relations.iter().find(|r| {
                r.owning
                    && r.kind == kind
                    && r.inverse.as_deref() == Some(relation.property_path.as_str())
            }),
        };

        let Some(inverse) = found else {
            return Err(self.invalid_relation(
                id,
                relation,
                "no owning relation on the target points back".to_string(),
            ));
        };
        if inverse.kind != kind || !inverse.owning {
            return Err(self.invalid_relation(
                id,
                relation,
                format!("inverse '{}' is not an owning side", inverse.property_path),
            ));
        }
        if !self.is_same_or_descendant(id, inverse.target) {
            return Err(self.invalid_relation(
                id,
                relation,
                format!("inverse '{}' targets another entity", inverse.property_path),
            ));
        }
        if kind == RelationKind::ManyToMany && inverse.junction.is_none() {
            return Err(self.invalid_relation(
                id,
                relation,
                "the owning side has no junction table".to_string(),
            ));
        }
        Ok(inverse.clone())
    }

    fn invalid_relation(&self, id: EntityId, relation: &Relation, reason: String) -> MetadataError {
        MetadataError::InvalidRelation {
            entity: self.entities[id.0].name.clone(),
            property: relation.property_path.clone(),
            reason,
        }
    }
}
