//! Subjects and cascade discovery.
//!
//! Discovery walks the object graph breadth first from the roots, following
//! relations whose cascade set covers the operation, and creates one subject
//! per affected instance.

use super::instance::{EntityGraph, Instance, InstanceId};
use crate::config::PersistOptions;
use crate::error::PersistError;
use crate::metadata::{Cascade, RelationKind};
use crate::schema::{EntityId, EntityKind, EntitySchema, Relation, SchemaGraph};
use crate::value::Identifier;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// Index of a subject in a unit of work, in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(pub usize);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// What a caller asks the unit of work to do with its roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOperation {
    /// Insert new instances, update persisted ones.
    Save,
    /// Delete rows.
    Remove,
    /// Set the delete date.
    SoftRemove,
    /// Clear the delete date.
    Recover,
}

impl PersistOperation {
    fn is_removal(&self) -> bool {
        !matches!(self, PersistOperation::Save)
    }
}

/// What happens to one subject's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectOperation {
    /// Insert a new row.
    Insert,
    /// Update changed columns.
    Update,
    /// Delete the row.
    Remove,
    /// Set the delete date.
    SoftRemove,
    /// Clear the delete date.
    Recover,
}

impl SubjectOperation {
    /// Lower-case name, used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            SubjectOperation::Insert => "insert",
            SubjectOperation::Update => "update",
            SubjectOperation::Remove => "remove",
            SubjectOperation::SoftRemove => "soft remove",
            SubjectOperation::Recover => "recover",
        }
    }

    fn cascade(&self) -> Cascade {
        match self {
            SubjectOperation::Insert => Cascade::Insert,
            SubjectOperation::Update => Cascade::Update,
            SubjectOperation::Remove => Cascade::Remove,
            SubjectOperation::SoftRemove => Cascade::SoftRemove,
            SubjectOperation::Recover => Cascade::Recover,
        }
    }
}

/// A pending row operation for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    /// Discovery index.
    pub id: SubjectId,
    /// The instance.
    pub instance: InstanceId,
    /// Entity of the instance.
    pub entity: EntityId,
    /// Row operation.
    pub operation: SubjectOperation,
    /// Identifier, when every primary column is known.
    pub identifier: Option<Identifier>,
    /// Cascade depth at which the subject was discovered.
    pub depth: usize,
    /// Update only the join columns of this relation. Set for persisted
    /// children of a one-to-many collection that does not cascade updates.
    pub restrict_to: Option<String>,
}

impl Subject {
    /// Check if the subject inserts a row.
    pub fn is_insert(&self) -> bool {
        self.operation == SubjectOperation::Insert
    }

    /// Check if the subject deletes or soft-deletes its row.
    pub fn is_removal(&self) -> bool {
        matches!(
            self.operation,
            SubjectOperation::Remove | SubjectOperation::SoftRemove
        )
    }
}

/// Discovered subjects with an instance index.
#[derive(Debug, Clone, Default)]
pub(crate) struct Subjects {
    pub(crate) list: Vec<Subject>,
    pub(crate) by_instance: HashMap<InstanceId, SubjectId>,
}

impl Subjects {
    pub(crate) fn get(&self, id: SubjectId) -> &Subject {
        &self.list[id.0]
    }

    pub(crate) fn of_instance(&self, instance: InstanceId) -> Option<&Subject> {
        self.by_instance.get(&instance).map(|id| self.get(*id))
    }
}

struct Discovery<'a> {
    schema: &'a SchemaGraph,
    options: &'a PersistOptions,
    operation: PersistOperation,
    subjects: Subjects,
    queue: VecDeque<SubjectId>,
}

/// Discover the subjects of a unit of work.
///
/// Client-generated UUID keys are assigned to new instances on the way.
pub(crate) fn discover(
    schema: &SchemaGraph,
    graph: &mut EntityGraph,
    roots: &[InstanceId],
    operation: PersistOperation,
    options: &PersistOptions,
) -> Result<Subjects, PersistError> {
    let mut discovery = Discovery {
        schema,
        options,
        operation,
        subjects: Subjects::default(),
        queue: VecDeque::new(),
    };

    for root in roots {
        if discovery.subjects.by_instance.contains_key(root) {
            continue;
        }
        let instance = instance_of(graph, *root)?;
        let entity = entity_of(schema, instance)?;
        let subject_operation = match operation {
            PersistOperation::Save if instance.is_new() => SubjectOperation::Insert,
            PersistOperation::Save => SubjectOperation::Update,
            PersistOperation::Remove => SubjectOperation::Remove,
            PersistOperation::SoftRemove => SubjectOperation::SoftRemove,
            PersistOperation::Recover => SubjectOperation::Recover,
        };
        if operation.is_removal() && instance.identifier(entity).is_none() {
            return Err(PersistError::MissingIdentifier {
                entity: entity.name.clone(),
                operation: subject_operation.name().to_string(),
            });
        }
        discovery.add(graph, *root, subject_operation, 0, None)?;
    }

    while let Some(id) = discovery.queue.pop_front() {
        discovery.walk(graph, id)?;
    }

    if operation == PersistOperation::Save {
        discovery.check_unsaved(graph)?;
    }

    debug!(
        subjects = discovery.subjects.list.len(),
        ?operation,
        "subjects discovered"
    );
    Ok(discovery.subjects)
}

impl Discovery<'_> {
    fn add(
        &mut self,
        graph: &mut EntityGraph,
        instance_id: InstanceId,
        operation: SubjectOperation,
        depth: usize,
        restrict_to: Option<String>,
    ) -> Result<SubjectId, PersistError> {
        let entity = entity_of(self.schema, instance_of(graph, instance_id)?)?;
        if operation == SubjectOperation::Insert && self.options.generate_uuids {
            if let Some(instance) = graph.get_mut(instance_id) {
                assign_uuids(entity, instance);
            }
        }
        let instance = instance_of(graph, instance_id)?;

        let id = SubjectId(self.subjects.list.len());
        self.subjects.list.push(Subject {
            id,
            instance: instance_id,
            entity: entity.id,
            operation,
            identifier: instance.identifier(entity),
            depth,
            restrict_to,
        });
        self.subjects.by_instance.insert(instance_id, id);
        self.queue.push_back(id);
        Ok(id)
    }

    fn walk(&mut self, graph: &mut EntityGraph, id: SubjectId) -> Result<(), PersistError> {
        let subject = self.subjects.get(id).clone();
        if subject.restrict_to.is_some() {
            return Ok(());
        }
        let entity = self.schema.entity(subject.entity);
        let instance = instance_of(graph, subject.instance)?;

        let mut found = Vec::new();
        for (path, value) in &instance.relations {
            let relation = relation_of(entity, path)?;
            for related_id in value.instances() {
                let related = instance_of(graph, related_id)?;
                entity_of(self.schema, related)?;
                let operation = match self.operation {
                    PersistOperation::Save if related.is_new() => SubjectOperation::Insert,
                    PersistOperation::Save => SubjectOperation::Update,
                    _ if related.is_new() => continue,
                    PersistOperation::Remove => SubjectOperation::Remove,
                    PersistOperation::SoftRemove => SubjectOperation::SoftRemove,
                    PersistOperation::Recover => SubjectOperation::Recover,
                };
                let cascades = relation.cascade.contains(operation.cascade());
                let restricted = !cascades
                    && operation == SubjectOperation::Update
                    && relation.kind == RelationKind::OneToMany;
                if !cascades && !restricted {
                    continue;
                }
                let restrict_to = if restricted {
                    relation.inverse.clone()
                } else {
                    None
                };
                found.push((related_id, operation, restrict_to));
            }
        }

        for (related_id, operation, restrict_to) in found {
            let depth = subject.depth + 1;
            if depth > self.options.max_cascade_depth {
                return Err(PersistError::MaxCascadeDepthExceeded { depth });
            }
            match self.subjects.by_instance.get(&related_id).copied() {
                Some(existing) => {
                    let existing = &mut self.subjects.list[existing.0];
                    if restrict_to.is_none() && existing.restrict_to.is_some() {
                        existing.restrict_to = None;
                        self.queue.push_back(existing.id);
                    }
                }
                None => {
                    self.add(graph, related_id, operation, depth, restrict_to)?;
                }
            }
        }
        Ok(())
    }

    /// Reject new related instances a saved row needs but no subject writes.
    fn check_unsaved(&self, graph: &EntityGraph) -> Result<(), PersistError> {
        for subject in &self.subjects.list {
            if subject.restrict_to.is_some() {
                continue;
            }
            let entity = self.schema.entity(subject.entity);
            let instance = instance_of(graph, subject.instance)?;
            for (path, value) in &instance.relations {
                let relation = relation_of(entity, path)?;
                let needed = relation.has_join_columns()
                    || matches!(
                        relation.kind,
                        RelationKind::ManyToMany | RelationKind::OneToMany
                    );
                if !needed {
                    continue;
                }
                for related_id in value.instances() {
                    let related = instance_of(graph, related_id)?;
                    if related.is_new() && !self.subjects.by_instance.contains_key(&related_id) {
                        return Err(PersistError::UnsavedRelatedEntity {
                            entity: entity.name.clone(),
                            relation: path.clone(),
                            target: self.schema.entity(relation.target).name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(feature = "uuid")]
fn assign_uuids(entity: &EntitySchema, instance: &mut Instance) {
    use crate::metadata::Generation;
    use crate::value::Value;

    for column in entity
        .columns
        .iter()
        .filter(|c| c.generation == Generation::Uuid)
    {
        let unset = instance
            .values
            .get(&column.property_path)
            .map_or(true, Value::is_null);
        if unset {
            instance
                .values
                .insert(column.property_path.clone(), Value::new_uuid());
        }
    }
}

#[cfg(not(feature = "uuid"))]
fn assign_uuids(_entity: &EntitySchema, _instance: &mut Instance) {}

pub(crate) fn instance_of(graph: &EntityGraph, id: InstanceId) -> Result<&Instance, PersistError> {
    graph.get(id).ok_or(PersistError::UnknownInstanceEntity)
}

pub(crate) fn entity_of<'s>(
    schema: &'s SchemaGraph,
    instance: &Instance,
) -> Result<&'s EntitySchema, PersistError> {
    if instance.entity.0 >= schema.len() {
        return Err(PersistError::UnknownInstanceEntity);
    }
    let entity = schema.entity(instance.entity);
    if entity.kind != EntityKind::Regular {
        return Err(PersistError::UnknownInstanceEntity);
    }
    Ok(entity)
}

pub(crate) fn relation_of<'s>(
    entity: &'s EntitySchema,
    path: &str,
) -> Result<&'s Relation, PersistError> {
    entity
        .relation(path)
        .ok_or_else(|| PersistError::UnknownRelation {
            entity: entity.name.clone(),
            relation: path.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataOptions;
    use crate::metadata::{
        CascadeSet, ColumnDef, ColumnType, EntityDef, MetadataRegistry, RelationDef,
    };
    use crate::persist::{Instance, LoadedState};

    fn schema() -> SchemaGraph {
        MetadataRegistry::new()
            .with_entity(
                EntityDef::new("User")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(
                        RelationDef::one_to_many("posts", "Post", "author")
                            .cascade(Cascade::Insert),
                    ),
            )
            .with_entity(
                EntityDef::new("Post")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("title", ColumnType::Varchar))
                    .with_relation(
                        RelationDef::many_to_one("author", "User").with_inverse("posts"),
                    ),
            )
            .with_entity(
                EntityDef::new("Node")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(
                        RelationDef::many_to_one("next", "Node")
                            .with_cascade(CascadeSet::all()),
                    ),
            )
            .build(&MetadataOptions::default())
            .unwrap()
    }

    fn subjects_of(
        schema: &SchemaGraph,
        graph: &mut EntityGraph,
        roots: &[InstanceId],
        operation: PersistOperation,
    ) -> Result<Subjects, PersistError> {
        discover(schema, graph, roots, operation, &PersistOptions::default())
    }

    #[test]
    fn test_cascade_insert_discovers_children() {
        let schema = schema();
        let user = schema.entity_id("User").unwrap();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let p1 = graph.add(Instance::new(post).with_value("title", "a"));
        let p2 = graph.add(Instance::new(post).with_value("title", "b"));
        let u = graph.add(Instance::new(user).with_many("posts", [p1, p2]));

        let subjects = subjects_of(&schema, &mut graph, &[u], PersistOperation::Save).unwrap();
        let instances: Vec<_> = subjects.list.iter().map(|s| s.instance).collect();
        assert_eq!(instances, vec![u, p1, p2]);
        assert!(subjects.list.iter().all(Subject::is_insert));
        assert_eq!(subjects.list[1].depth, 1);
    }

    #[test]
    fn test_persisted_child_without_cascade_is_restricted() {
        let schema = schema();
        let user = schema.entity_id("User").unwrap();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let p = graph.add(
            Instance::new(post).with_loaded(LoadedState::new().with_value("id", 3)),
        );
        let u = graph.add(Instance::new(user).with_many("posts", [p]));

        let subjects = subjects_of(&schema, &mut graph, &[u], PersistOperation::Save).unwrap();
        let child = subjects.of_instance(p).unwrap();
        assert_eq!(child.operation, SubjectOperation::Update);
        assert_eq!(child.restrict_to.as_deref(), Some("author"));
    }

    #[test]
    fn test_unsaved_related_entity() {
        let schema = schema();
        let user = schema.entity_id("User").unwrap();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let u = graph.add(Instance::new(user));
        let p = graph.add(Instance::new(post).with_one("author", Some(u)));

        let err = subjects_of(&schema, &mut graph, &[p], PersistOperation::Save).unwrap_err();
        assert_eq!(
            err,
            PersistError::UnsavedRelatedEntity {
                entity: "Post".into(),
                relation: "author".into(),
                target: "User".into(),
            }
        );
    }

    #[test]
    fn test_max_cascade_depth() {
        let schema = schema();
        let node = schema.entity_id("Node").unwrap();
        let mut graph = EntityGraph::new();
        let mut next = None;
        for _ in 0..5 {
            next = Some(graph.add(Instance::new(node).with_one("next", next)));
        }
        let head = next.unwrap();
        let options = PersistOptions::default().max_cascade_depth(3);

        let err =
            discover(&schema, &mut graph, &[head], PersistOperation::Save, &options).unwrap_err();
        assert_eq!(err, PersistError::MaxCascadeDepthExceeded { depth: 4 });

        let options = PersistOptions::default().max_cascade_depth(4);
        let subjects =
            discover(&schema, &mut graph, &[head], PersistOperation::Save, &options).unwrap();
        assert_eq!(subjects.list.len(), 5);
    }

    #[test]
    fn test_remove_requires_identifier() {
        let schema = schema();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let p = graph.add(Instance::new(post));

        let err = subjects_of(&schema, &mut graph, &[p], PersistOperation::Remove).unwrap_err();
        assert!(matches!(err, PersistError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_unknown_relation() {
        let schema = schema();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let p = graph.add(Instance::new(post).with_one("editor", None));

        let err = subjects_of(&schema, &mut graph, &[p], PersistOperation::Save).unwrap_err();
        assert!(matches!(err, PersistError::UnknownRelation { .. }));
    }
}
