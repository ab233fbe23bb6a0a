//! The resolved schema graph.

use super::entity::{Column, EntityId, EntityKind, EntitySchema, Relation, TableName};
use crate::value::{Identifier, Value};
use std::collections::HashMap;

/// Closed set of resolved entity schemas.
///
/// Entities live in an arena and reference each other by [`EntityId`], so
/// self references and mutual references are plain edges. The graph is built
/// once per connection and read concurrently afterwards.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    entities: Vec<EntitySchema>,
    by_name: HashMap<String, EntityId>,
}

impl SchemaGraph {
    pub(crate) fn from_entities(entities: Vec<EntitySchema>) -> Self {
        let by_name = entities
            .iter()
            .map(|e| (e.name.clone(), e.id))
            .collect();
        Self { entities, by_name }
    }

    /// Get an entity by id.
    ///
    /// Ids are only handed out by this graph, so a foreign id is a caller bug.
    pub fn entity(&self, id: EntityId) -> &EntitySchema {
        &self.entities[id.0]
    }

    /// Get an entity by id for in-place adjustment.
    ///
    /// Only safe while no unit of work or diff reads the graph.
    pub fn entity_mut(&mut self, id: EntityId) -> &mut EntitySchema {
        &mut self.entities[id.0]
    }

    /// Get an entity by name.
    pub fn entity_by_name(&self, name: &str) -> Option<&EntitySchema> {
        self.by_name.get(name).map(|id| self.entity(*id))
    }

    /// Get an entity id by name.
    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// Get the entity whose table is `table`.
    ///
    /// For single-table hierarchies this returns the root.
    pub fn entity_by_table(&self, table: &TableName) -> Option<&EntitySchema> {
        self.entities
            .iter()
            .find(|e| &e.table == table && self.owns_table(e))
    }

    /// All entities, registration order first, junctions and closures after.
    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.iter()
    }

    /// Registered entities only.
    pub fn regular_entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities
            .iter()
            .filter(|e| e.kind == EntityKind::Regular)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Find a column by its dotted property path.
    pub fn find_column_with_property_path(&self, id: EntityId, path: &str) -> Option<&Column> {
        self.entity(id).column(path)
    }

    /// Find a column by its physical name.
    pub fn find_column_by_database_name(&self, id: EntityId, name: &str) -> Option<&Column> {
        self.entity(id)
            .columns
            .iter()
            .find(|c| c.database_name == name)
    }

    /// Find a relation by its dotted property path.
    pub fn find_relation(&self, id: EntityId, path: &str) -> Option<&Relation> {
        self.entity(id).relation(path)
    }

    /// Primary columns of an entity.
    pub fn primary_columns(&self, id: EntityId) -> Vec<&Column> {
        self.entity(id).primary_columns().collect()
    }

    /// Inverse relation of `relation` on its target, if declared.
    pub fn inverse_relation(&self, relation: &Relation) -> Option<&Relation> {
        let inverse = relation.inverse.as_deref()?;
        self.find_relation(relation.target, inverse)
    }

    /// Values of a relation's join columns derived from the related row's identifier.
    ///
    /// Returns `None` when the relation has no join columns or the identifier
    /// lacks a referenced column.
    pub fn relation_id_of(
        &self,
        id: EntityId,
        relation: &str,
        target_identifier: &Identifier,
    ) -> Option<Vec<(String, Value)>> {
        let entity = self.entity(id);
        let relation = entity.relation(relation)?;
        if relation.join_columns.is_empty() {
            return None;
        }
        relation
            .join_columns
            .iter()
            .map(|path| {
                let column = entity.column(path)?;
                let reference = column.reference.as_ref()?;
                let value = target_identifier.get(&reference.referenced_column)?;
                Some((path.clone(), value.clone()))
            })
            .collect()
    }

    /// Root of the inheritance hierarchy `id` belongs to.
    pub fn root_of(&self, id: EntityId) -> EntityId {
        let mut current = id;
        while let Some(parent) = self.entity(current).parent {
            current = parent;
        }
        current
    }

    /// Check if `id` is `ancestor` or one of its descendants.
    pub fn is_same_or_descendant(&self, id: EntityId, ancestor: EntityId) -> bool {
        let mut current = Some(id);
        while let Some(entity) = current {
            if entity == ancestor {
                return true;
            }
            current = self.entity(entity).parent;
        }
        false
    }

    /// `id` and all of its descendants, breadth first.
    pub fn descendants_of(&self, id: EntityId) -> Vec<EntityId> {
        let mut result = vec![id];
        let mut index = 0;
        while index < result.len() {
            result.extend(self.entity(result[index]).children.iter().copied());
            index += 1;
        }
        result
    }

    /// Discriminator values a query for `id` must match: its own and its descendants'.
    ///
    /// Values come from `id`'s own hierarchy only.
    pub fn discriminator_values(&self, id: EntityId) -> Vec<String> {
        self.descendants_of(id)
            .into_iter()
            .filter_map(|e| self.entity(e).discriminator.as_ref())
            .map(|d| d.value.clone())
            .collect()
    }

    /// Check if the entity creates `entity.table` rather than sharing a root's.
    pub(crate) fn owns_table(&self, entity: &EntitySchema) -> bool {
        match entity.parent {
            Some(parent) => self.entity(parent).table != entity.table,
            None => true,
        }
    }
}
