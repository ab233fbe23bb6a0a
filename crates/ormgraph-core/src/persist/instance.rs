//! In-memory entity instances handed to the unit of work.

use super::run::PersistOutcome;
use crate::schema::{EntityId, EntitySchema};
use crate::value::{Identifier, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Index of an instance in an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub usize);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Value of a relation property.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// To-one relation, explicitly unset when `None`.
    One(Option<InstanceId>),
    /// To-many relation.
    Many(Vec<InstanceId>),
}

impl RelationValue {
    /// Related instances.
    pub fn instances(&self) -> Vec<InstanceId> {
        match self {
            RelationValue::One(one) => one.iter().copied().collect(),
            RelationValue::Many(many) => many.clone(),
        }
    }
}

/// Row state as last read from the database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedState {
    /// Column values keyed by property path, join columns included.
    pub values: BTreeMap<String, Value>,
    /// Identifiers of related rows of to-many relations, keyed by relation path.
    pub related: BTreeMap<String, Vec<Identifier>>,
}

impl LoadedState {
    /// Empty loaded state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a loaded column value.
    pub fn with_value(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(path.into(), value.into());
        self
    }

    /// Set the loaded identifiers of a to-many relation.
    pub fn with_related(
        mut self,
        relation: impl Into<String>,
        identifiers: impl IntoIterator<Item = Identifier>,
    ) -> Self {
        self.related
            .insert(relation.into(), identifiers.into_iter().collect());
        self
    }
}

/// One entity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Entity of the instance. Must be a concrete registered entity.
    pub entity: EntityId,
    /// Column values keyed by property path.
    pub values: BTreeMap<String, Value>,
    /// Relation values keyed by relation path. Absent relations are left alone.
    pub relations: BTreeMap<String, RelationValue>,
    /// Database state, `None` for instances never persisted.
    pub loaded: Option<LoadedState>,
}

impl Instance {
    /// Create a new, unsaved instance.
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            loaded: None,
        }
    }

    /// Set a column value.
    pub fn with_value(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(path.into(), value.into());
        self
    }

    /// Set a to-one relation.
    pub fn with_one(mut self, relation: impl Into<String>, related: Option<InstanceId>) -> Self {
        self.relations
            .insert(relation.into(), RelationValue::One(related));
        self
    }

    /// Set a to-many relation.
    pub fn with_many(
        mut self,
        relation: impl Into<String>,
        related: impl IntoIterator<Item = InstanceId>,
    ) -> Self {
        self.relations.insert(
            relation.into(),
            RelationValue::Many(related.into_iter().collect()),
        );
        self
    }

    /// Mark the instance as persisted with the given state.
    ///
    /// Loaded values are also copied into the current values where unset.
    pub fn with_loaded(mut self, loaded: LoadedState) -> Self {
        for (path, value) in &loaded.values {
            self.values
                .entry(path.clone())
                .or_insert_with(|| value.clone());
        }
        self.loaded = Some(loaded);
        self
    }

    /// Check if the instance was never persisted.
    pub fn is_new(&self) -> bool {
        self.loaded.is_none()
    }

    /// Current value of a column.
    pub fn value(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    /// Loaded value of a column.
    pub fn loaded_value(&self, path: &str) -> Option<&Value> {
        self.loaded.as_ref().and_then(|l| l.values.get(path))
    }

    /// Identifier from the current primary column values.
    ///
    /// Returns `None` while any primary column is unset or null.
    pub fn identifier(&self, schema: &EntitySchema) -> Option<Identifier> {
        let mut parts = BTreeMap::new();
        for column in schema.primary_columns() {
            match self.values.get(&column.property_path) {
                Some(value) if !value.is_null() => {
                    parts.insert(column.property_path.clone(), value.clone());
                }
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Identifier(parts))
    }
}

/// Arena of instances forming the object graph of a unit of work.
///
/// Instances reference each other by [`InstanceId`], so cyclic object graphs
/// are ordinary edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityGraph {
    instances: Vec<Instance>,
}

impl EntityGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance.
    pub fn add(&mut self, instance: Instance) -> InstanceId {
        let id = InstanceId(self.instances.len());
        self.instances.push(instance);
        id
    }

    /// Get an instance.
    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id.0)
    }

    /// Get an instance mutably.
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(id.0)
    }

    /// Set a column value on an instance.
    pub fn set_value(&mut self, id: InstanceId, path: impl Into<String>, value: impl Into<Value>) {
        if let Some(instance) = self.instances.get_mut(id.0) {
            instance.values.insert(path.into(), value.into());
        }
    }

    /// Set a to-one relation on an instance.
    pub fn relate_one(
        &mut self,
        id: InstanceId,
        relation: impl Into<String>,
        related: Option<InstanceId>,
    ) {
        if let Some(instance) = self.instances.get_mut(id.0) {
            instance
                .relations
                .insert(relation.into(), RelationValue::One(related));
        }
    }

    /// Append to a to-many relation on an instance.
    pub fn relate_many(
        &mut self,
        id: InstanceId,
        relation: impl Into<String>,
        related: InstanceId,
    ) {
        if let Some(instance) = self.instances.get_mut(id.0) {
            let entry = instance
                .relations
                .entry(relation.into())
                .or_insert_with(|| RelationValue::Many(Vec::new()));
            match entry {
                RelationValue::Many(many) => many.push(related),
                RelationValue::One(one) => *one = Some(related),
            }
        }
    }

    /// Iterate over all instances.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .map(|(i, instance)| (InstanceId(i), instance))
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Write generated values of a finished run back into the instances.
    pub fn apply(&mut self, outcome: &PersistOutcome) {
        for (id, values) in &outcome.generated {
            if let Some(instance) = self.instances.get_mut(id.0) {
                for (path, value) in values {
                    instance.values.insert(path.clone(), value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_values_are_current_values() {
        let instance = Instance::new(EntityId(0))
            .with_value("title", "new title")
            .with_loaded(
                LoadedState::new()
                    .with_value("id", 1)
                    .with_value("title", "old title"),
            );
        assert!(!instance.is_new());
        assert_eq!(instance.value("id"), Some(&Value::Int(1)));
        assert_eq!(instance.value("title"), Some(&Value::from("new title")));
        assert_eq!(instance.loaded_value("title"), Some(&Value::from("old title")));
    }

    #[test]
    fn test_relate_many_appends() {
        let mut graph = EntityGraph::new();
        let post = graph.add(Instance::new(EntityId(0)));
        let a = graph.add(Instance::new(EntityId(1)));
        let b = graph.add(Instance::new(EntityId(1)));
        graph.relate_many(post, "categories", a);
        graph.relate_many(post, "categories", b);

        let relation = &graph.get(post).unwrap().relations["categories"];
        assert_eq!(relation.instances(), vec![a, b]);
        assert_eq!(graph.len(), 3);
    }
}
