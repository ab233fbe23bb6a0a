//! Member flattening: inherited declarations, embeds and plain columns.

use super::SchemaBuilder;
use crate::error::MetadataError;
use crate::metadata::{
    CheckDef, ColumnDef, ColumnRole, ColumnType, DefaultValue, EmbeddedDef, EntityDef,
    ExclusionDef, Generation, IndexDef, RelationDef, UniqueDef,
};
use crate::schema::entity::{Column, EmbeddedSchema, EntityId, Relation};
use std::collections::HashSet;

/// A declaration together with the entity whose table it lands in.
pub(super) struct Scoped<'a, T> {
    pub def: &'a T,
    pub owner: EntityId,
}

/// A relation declaration at its flattened position.
pub(super) struct FlatRelation<'a> {
    pub def: &'a RelationDef,
    pub path: String,
    pub prefixes: Vec<String>,
    pub owner: EntityId,
    pub declared_by: EntityId,
}

/// Declarations of one entity still to be resolved by later passes.
#[derive(Default)]
pub(super) struct Members<'a> {
    pub relations: Vec<FlatRelation<'a>>,
    /// Property paths of columns declared unique, with their owner.
    pub unique_columns: Vec<(String, EntityId)>,
    pub indices: Vec<Scoped<'a, IndexDef>>,
    pub uniques: Vec<Scoped<'a, UniqueDef>>,
    pub checks: Vec<Scoped<'a, CheckDef>>,
    pub exclusions: Vec<Scoped<'a, ExclusionDef>>,
}

struct FlatColumn<'a> {
    def: &'a ColumnDef,
    path: String,
    prefixes: Vec<String>,
    embedded_path: Option<String>,
    owner: EntityId,
    declared_by: EntityId,
}

#[derive(Clone)]
struct Scope {
    path: Option<String>,
    prefixes: Vec<String>,
    owner: EntityId,
    declared_by: EntityId,
}

impl Scope {
    fn join(&self, property: &str) -> String {
        match &self.path {
            Some(path) => format!("{path}.{property}"),
            None => property.to_string(),
        }
    }
}

#[derive(Default)]
struct Collected<'a> {
    columns: Vec<FlatColumn<'a>>,
    embeddeds: Vec<EmbeddedSchema>,
}

impl<'a> SchemaBuilder<'a> {
    pub(super) fn resolve_members(&mut self) -> Result<(), MetadataError> {
        let concrete: Vec<&'a EntityDef> = self
            .registry
            .entities
            .iter()
            .filter(|d| !d.is_abstract)
            .collect();

        for def in concrete {
            let id = self.ids[&def.name];
            let mut members = Members::default();
            let mut collected = Collected::default();

            for (decl, owner, declared_by) in self.chain_members(def)? {
                let scope = Scope {
                    path: None,
                    prefixes: Vec::new(),
                    owner,
                    declared_by,
                };
                let mut stack = Vec::new();
                self.collect(
                    &decl.columns,
                    &decl.relations,
                    &decl.embeddeds,
                    &scope,
                    &mut stack,
                    &mut collected,
                    &mut members,
                )?;
                members
                    .indices
                    .extend(decl.indices.iter().map(|def| Scoped { def, owner }));
                members
                    .uniques
                    .extend(decl.uniques.iter().map(|def| Scoped { def, owner }));
                members
                    .checks
                    .extend(decl.checks.iter().map(|def| Scoped { def, owner }));
                members
                    .exclusions
                    .extend(decl.exclusions.iter().map(|def| Scoped { def, owner }));
            }

            let mut columns = collected
                .columns
                .iter()
                .map(|flat| self.resolve_column(id, &def.name, flat))
                .collect::<Result<Vec<_>, _>>()?;
            self.add_discriminator_column(id, &mut columns);
            self.add_tree_columns(def, id, &mut columns)?;

            let relations = members
                .relations
                .iter()
                .map(|flat| self.relation_record(&def.name, flat))
                .collect::<Result<Vec<_>, _>>()?;

            check_unique_members(&def.name, &columns, &relations)?;

            let entity = &mut self.entities[id.0];
            entity.columns = columns;
            entity.relations = relations;
            entity.embeddeds = collected.embeddeds;
            self.members[id.0] = members;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn collect(
        &self,
        columns: &'a [ColumnDef],
        relations: &'a [RelationDef],
        embeddeds: &'a [EmbeddedDef],
        scope: &Scope,
        stack: &mut Vec<String>,
        collected: &mut Collected<'a>,
        members: &mut Members<'a>,
    ) -> Result<(), MetadataError> {
        for def in columns {
            if def.unique {
                members
                    .unique_columns
                    .push((scope.join(&def.property), scope.owner));
            }
            collected.columns.push(FlatColumn {
                def,
                path: scope.join(&def.property),
                prefixes: scope.prefixes.clone(),
                embedded_path: scope.path.clone(),
                owner: scope.owner,
                declared_by: scope.declared_by,
            });
        }
        for def in relations {
            members.relations.push(FlatRelation {
                def,
                path: scope.join(&def.property),
                prefixes: scope.prefixes.clone(),
                owner: scope.owner,
                declared_by: scope.declared_by,
            });
        }
        for embed in embeddeds {
            let embeddable = self.registry.get_embeddable(&embed.embeddable).ok_or_else(|| {
                MetadataError::UnknownEmbeddable {
                    name: embed.embeddable.clone(),
                }
            })?;
            if stack.contains(&embeddable.name) {
                let mut path = stack.clone();
                path.push(embeddable.name.clone());
                return Err(MetadataError::CircularEmbedded { path });
            }

            let mut inner = scope.clone();
            inner.path = Some(scope.join(&embed.property));
            if let Some(segment) = embed.prefix_segment() {
                inner.prefixes.push(segment.to_string());
            }
            collected.embeddeds.push(EmbeddedSchema {
                property_path: scope.join(&embed.property),
                embeddable: embeddable.name.clone(),
                prefixes: inner.prefixes.clone(),
            });

            stack.push(embeddable.name.clone());
            self.collect(
                &embeddable.columns,
                &embeddable.relations,
                &embeddable.embeddeds,
                &inner,
                stack,
                collected,
                members,
            )?;
            stack.pop();
        }
        Ok(())
    }

    fn resolve_column(
        &mut self,
        id: EntityId,
        entity: &str,
        flat: &FlatColumn<'a>,
    ) -> Result<Column, MetadataError> {
        let def = flat.def;
        if def.generation.is_generated() && def.default.is_some() {
            return Err(MetadataError::GeneratedWithDefault {
                entity: entity.to_string(),
                property: flat.path.clone(),
            });
        }

        let column_type = match def.column_type.clone().or_else(|| infer_type(def)) {
            Some(column_type) => column_type,
            None => {
                // Placeholder until a relation sharing this column supplies the type.
                self.untyped.insert((id, flat.path.clone()));
                ColumnType::Integer
            }
        };
        let default = def.default.clone().or_else(|| match def.role {
            ColumnRole::CreateDate | ColumnRole::UpdateDate => Some(DefaultValue::CurrentTimestamp),
            _ => None,
        });
        let length = def.length.or(if column_type == ColumnType::Varchar {
            self.options.default_varchar_length
        } else {
            None
        });

        Ok(Column {
            property_path: flat.path.clone(),
            property_name: def.property.clone(),
            database_name: self
                .naming
                .column_name(&def.property, def.name.as_deref(), &flat.prefixes),
            column_type,
            nullable: !def.primary && (def.nullable || def.role == ColumnRole::DeleteDate),
            primary: def.primary,
            generation: def.generation,
            default,
            length,
            precision: def.precision,
            scale: def.scale,
            collation: def.collation.clone(),
            role: def.role,
            table_owner: flat.owner,
            declared_by: flat.declared_by,
            embedded_path: flat.embedded_path.clone(),
            reference: None,
        })
    }

    fn add_discriminator_column(&self, id: EntityId, columns: &mut Vec<Column>) {
        let entity = &self.entities[id.0];
        let Some(discriminator) = &entity.discriminator else {
            return;
        };
        let root = entity.tables[0];
        if let Some(existing) = columns
            .iter_mut()
            .find(|c| c.property_path == discriminator.column)
        {
            existing.role = ColumnRole::Discriminator;
            return;
        }

        let column_type = self
            .defs
            .get(self.entities[root.0].name.as_str())
            .and_then(|d| d.inheritance.as_ref())
            .and_then(|i| i.discriminator.as_ref())
            .map(|d| d.column_type.clone())
            .unwrap_or(ColumnType::Varchar);

        columns.push(Column {
            property_path: discriminator.column.clone(),
            property_name: discriminator.column.clone(),
            database_name: self.naming.column_name(&discriminator.column, None, &[]),
            column_type,
            nullable: false,
            primary: false,
            generation: Generation::None,
            default: None,
            length: None,
            precision: None,
            scale: None,
            collation: None,
            role: ColumnRole::Discriminator,
            table_owner: root,
            declared_by: root,
            embedded_path: None,
            reference: None,
        });
    }

    fn relation_record(
        &self,
        entity: &str,
        flat: &FlatRelation<'a>,
    ) -> Result<Relation, MetadataError> {
        let def = flat.def;
        Ok(Relation {
            property_path: flat.path.clone(),
            kind: def.kind,
            target: self.target_id(entity, &flat.path, &def.target)?,
            inverse: def.inverse.clone(),
            owning: def.is_owning(),
            cascade: def.cascade,
            nullable: def.nullable,
            loading: def.loading,
            on_delete: def.on_delete,
            on_update: def.on_update,
            orphaned_row_action: def.orphaned_row_action,
            join_columns: Vec::new(),
            junction: None,
            tree_parent: def.tree_parent,
            tree_children: def.tree_children,
            embedded_path: flat.path.rsplit_once('.').map(|(parent, _)| parent.to_string()),
        })
    }
}

/// Type of an undeclared column, from its generation or role.
fn infer_type(def: &ColumnDef) -> Option<ColumnType> {
    match def.generation {
        Generation::Increment | Generation::RowId => return Some(ColumnType::Integer),
        Generation::Uuid => return Some(ColumnType::Uuid),
        Generation::None => {}
    }
    match def.role {
        ColumnRole::CreateDate | ColumnRole::UpdateDate | ColumnRole::DeleteDate => {
            Some(ColumnType::Timestamp)
        }
        ColumnRole::Version | ColumnRole::NestedSetLeft | ColumnRole::NestedSetRight => {
            Some(ColumnType::Integer)
        }
        ColumnRole::Discriminator | ColumnRole::MaterializedPath => Some(ColumnType::Varchar),
        ColumnRole::Regular => None,
    }
}

fn check_unique_members(
    entity: &str,
    columns: &[Column],
    relations: &[Relation],
) -> Result<(), MetadataError> {
    let mut paths = HashSet::new();
    let mut names = HashSet::new();
    let duplicate = |path: &str| MetadataError::DuplicatePropertyPath {
        entity: entity.to_string(),
        path: path.to_string(),
    };

    for column in columns {
        if !paths.insert(column.property_path.as_str()) {
            return Err(duplicate(&column.property_path));
        }
        if !names.insert((column.table_owner, column.database_name.as_str())) {
            return Err(duplicate(&column.database_name));
        }
    }
    for relation in relations {
        if !paths.insert(relation.property_path.as_str()) {
            return Err(duplicate(&relation.property_path));
        }
    }
    Ok(())
}
