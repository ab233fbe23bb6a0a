//! Step planning.
//!
//! Planning runs in three phases:
//!
//! 1. a row draft per subject: insert, update, delete or soft-delete steps
//!    with pending values, plus the relations that tie it to other inserts
//! 2. ordering: a stable topological sort over those ties, deferring a
//!    nullable relation whenever the sort gets stuck on a cycle
//! 3. assembly: tree bookkeeping around each row, in final order, followed
//!    by deferred relation updates, orphan handling and junction rows

use super::instance::{EntityGraph, Instance, InstanceId, RelationValue};
use super::step::{ColumnValue, Step, StepAction, StepPurpose, StepValue};
use super::subject::{
    entity_of, instance_of, relation_of, PersistOperation, Subject, SubjectId, SubjectOperation,
    Subjects,
};
use crate::config::PersistOptions;
use crate::error::{PersistError, TreeError};
use crate::metadata::{ColumnRole, OrphanedRowAction, RelationKind, TreeKind};
use crate::order::DependencyGraph;
use crate::schema::{Column, EntityId, EntitySchema, Relation, SchemaGraph, TableName, TreeSchema};
use crate::tree::{moved_bound, shifted_bound, strategy_for, TreeEffects, TreeNode, TreeOperation};
use crate::value::{Identifier, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Join columns of a row that point at another insert of the same unit.
#[derive(Debug, Clone)]
struct Link {
    relation: String,
    target: SubjectId,
    nullable: bool,
}

#[derive(Debug, Clone, Default)]
struct RowDraft {
    steps: Vec<Step>,
    links: Vec<Link>,
}

/// Junction and orphan steps collected after the ordered rows.
#[derive(Default)]
struct Trailing {
    junction_deletes: Vec<Step>,
    junction_inserts: Vec<Step>,
    orphans: Vec<Step>,
    seen_inserts: HashSet<(EntityId, BTreeMap<String, InstanceId>)>,
    seen_deletes: HashSet<(EntityId, BTreeMap<String, Value>)>,
}

pub(crate) struct Planner<'a> {
    schema: &'a SchemaGraph,
    graph: &'a EntityGraph,
    options: &'a PersistOptions,
    subjects: &'a Subjects,
    /// (child, relation on child) -> parent, from inverse-side relation values.
    implied: HashMap<(InstanceId, String), InstanceId>,
    /// Materialized paths decided during this plan.
    paths: HashMap<InstanceId, StepValue>,
    /// Nested-set bounds as they will be once the preceding steps ran.
    bounds: HashMap<InstanceId, (i64, i64)>,
}

impl<'a> Planner<'a> {
    pub(crate) fn new(
        schema: &'a SchemaGraph,
        graph: &'a EntityGraph,
        options: &'a PersistOptions,
        subjects: &'a Subjects,
    ) -> Result<Self, PersistError> {
        let mut planner = Self {
            schema,
            graph,
            options,
            subjects,
            implied: HashMap::new(),
            paths: HashMap::new(),
            bounds: HashMap::new(),
        };
        planner.collect_implied()?;
        planner.seed_bounds();
        Ok(planner)
    }

    pub(crate) fn plan(&mut self, operation: PersistOperation) -> Result<Vec<Step>, PersistError> {
        match operation {
            PersistOperation::Save => self.plan_save(),
            PersistOperation::Remove => self.plan_remove(),
            PersistOperation::SoftRemove | PersistOperation::Recover => self.plan_soft(),
        }
    }

    fn collect_implied(&mut self) -> Result<(), PersistError> {
        for subject in &self.subjects.list {
            if subject.restrict_to.is_some() {
                continue;
            }
            let entity = self.schema.entity(subject.entity);
            let instance = instance_of(self.graph, subject.instance)?;
            for (path, value) in &instance.relations {
                let relation = relation_of(entity, path)?;
                if relation.owning
                    || !matches!(relation.kind, RelationKind::OneToMany | RelationKind::OneToOne)
                {
                    continue;
                }
                let Some(inverse) = &relation.inverse else {
                    continue;
                };
                for child in value.instances() {
                    self.implied
                        .insert((child, inverse.clone()), subject.instance);
                }
            }
        }
        Ok(())
    }

    fn seed_bounds(&mut self) {
        for (id, instance) in self.graph.iter() {
            if instance.entity.0 >= self.schema.len() {
                continue;
            }
            let entity = self.schema.entity(instance.entity);
            let Some(tree) = entity.tree.as_ref().filter(|t| t.kind == TreeKind::NestedSet) else {
                continue;
            };
            let bound = |path: &Option<String>| {
                path.as_deref()
                    .and_then(|p| instance.value(p))
                    .and_then(Value::as_i64)
            };
            if let (Some(left), Some(right)) =
                (bound(&tree.left_column), bound(&tree.right_column))
            {
                self.bounds.insert(id, (left, right));
            }
        }
    }

    // ---------------------------------------------------------------
    // Save
    // ---------------------------------------------------------------

    fn plan_save(&mut self) -> Result<Vec<Step>, PersistError> {
        let mut drafts = Vec::with_capacity(self.subjects.list.len());
        for subject in &self.subjects.list {
            drafts.push(match subject.operation {
                SubjectOperation::Insert => self.insert_draft(subject)?,
                SubjectOperation::Update => self.update_draft(subject)?,
                _ => RowDraft::default(),
            });
        }

        let mut dependencies = DependencyGraph::new(drafts.len());
        for (index, draft) in drafts.iter().enumerate() {
            for link in &draft.links {
                dependencies.add_edge(
                    link.target.0,
                    index,
                    Some(link.relation.clone()),
                    link.nullable,
                );
            }
        }
        let (order, deferred) = self.order(&mut dependencies)?;

        let mut deferred_steps = Vec::new();
        for (index, relation) in deferred {
            if let Some(step) = self.defer_relation(&mut drafts[index], index, &relation)? {
                deferred_steps.push(step);
            }
        }

        let subjects = self.subjects;
        let mut steps = Vec::new();
        for index in order {
            let subject = &subjects.list[index];
            let effects = self.tree_effects(subject)?;
            let mut rows = std::mem::take(&mut drafts[index].steps);
            merge_tree_values(&mut rows, effects.values);
            steps.extend(effects.before.into_iter().map(|op| tree_step(subject.id, op)));
            steps.extend(rows);
            steps.extend(effects.after.into_iter().map(|op| tree_step(subject.id, op)));
        }

        let mut trailing = Trailing::default();
        let claimed = self.claimed_identifiers();
        for subject in &self.subjects.list {
            if subject.restrict_to.is_some() {
                continue;
            }
            self.junction_steps(subject, &mut trailing)?;
            self.orphan_steps(subject, &claimed, &mut trailing)?;
        }

        let mut all = trailing.junction_deletes;
        all.extend(steps);
        all.extend(deferred_steps);
        all.extend(trailing.orphans);
        all.extend(trailing.junction_inserts);
        Ok(all)
    }

    fn insert_draft(&self, subject: &Subject) -> Result<RowDraft, PersistError> {
        let entity = self.schema.entity(subject.entity);
        let instance = instance_of(self.graph, subject.instance)?;
        let mut draft = RowDraft::default();

        let mut relation_values: HashMap<String, StepValue> = HashMap::new();
        for relation in entity.relations.iter().filter(|r| r.has_join_columns()) {
            let Some(related) =
                self.related_one(subject.instance, instance, &relation.property_path)
            else {
                continue;
            };
            let values = self.join_values(entity, relation, related)?;
            if let Some(link) = self.link_to(subject, relation, related, &values) {
                draft.links.push(link);
            }
            relation_values.extend(values);
        }

        let slots = entity.tables.len().max(1);
        let mut values: Vec<Vec<ColumnValue<StepValue>>> = vec![Vec::new(); slots];
        let mut returning: Vec<Vec<ColumnValue<()>>> = vec![Vec::new(); slots];
        for column in &entity.columns {
            let slot = table_slot(entity, column.table_owner);
            let value = match relation_values.remove(&column.property_path) {
                Some(value) => Some(value),
                None => insert_value(entity, instance, column),
            };
            match value {
                Some(value) => values[slot].push(ColumnValue::new(
                    column.database_name.clone(),
                    column.property_path.clone(),
                    value,
                )),
                None if column.is_generated() => returning[slot].push(ColumnValue::new(
                    column.database_name.clone(),
                    column.property_path.clone(),
                    (),
                )),
                None => {}
            }
        }

        // Rows of child tables share the root row's primary key.
        let primary: Vec<ColumnValue<StepValue>> = entity
            .primary_columns()
            .map(|column| {
                let value = values[0]
                    .iter()
                    .find(|c| c.property == column.property_path)
                    .map(|c| c.value.clone())
                    .unwrap_or_else(|| StepValue::Generated {
                        subject: subject.id,
                        property: column.property_path.clone(),
                    });
                ColumnValue::new(column.database_name.clone(), column.property_path.clone(), value)
            })
            .collect();

        for (slot, (mut row, returning)) in values.into_iter().zip(returning).enumerate() {
            if slot > 0 {
                let mut keyed = primary.clone();
                keyed.append(&mut row);
                row = keyed;
            }
            let table = entity
                .tables
                .get(slot)
                .map(|t| self.schema.entity(*t).table.clone())
                .unwrap_or_else(|| entity.table.clone());
            draft.steps.push(Step {
                subject: Some(subject.id),
                purpose: StepPurpose::Row,
                action: StepAction::Insert {
                    table,
                    values: row,
                    returning,
                },
            });
        }
        Ok(draft)
    }

    fn update_draft(&self, subject: &Subject) -> Result<RowDraft, PersistError> {
        let entity = self.schema.entity(subject.entity);
        let instance = instance_of(self.graph, subject.instance)?;
        let mut draft = RowDraft::default();

        let mut relation_values: HashMap<String, StepValue> = HashMap::new();
        for relation in entity.relations.iter().filter(|r| r.has_join_columns()) {
            if let Some(only) = &subject.restrict_to {
                if only != &relation.property_path {
                    continue;
                }
            }
            let Some(related) =
                self.related_one(subject.instance, instance, &relation.property_path)
            else {
                continue;
            };
            let values = self.join_values(entity, relation, related)?;
            if let Some(link) = self.link_to(subject, relation, related, &values) {
                draft.links.push(link);
            }
            relation_values.extend(values);
        }

        let mut changes: Vec<(&Column, StepValue)> = Vec::new();
        for column in entity.columns.iter().filter(|c| !c.primary) {
            let value = match relation_values.remove(&column.property_path) {
                Some(value) => value,
                None if subject.restrict_to.is_some() => continue,
                None => match column.role {
                    ColumnRole::Regular | ColumnRole::DeleteDate => {
                        match instance.value(&column.property_path) {
                            Some(value) => StepValue::Value(value.clone()),
                            None => continue,
                        }
                    }
                    _ => continue,
                },
            };
            let unchanged = match &value {
                StepValue::Value(current) => match instance.loaded_value(&column.property_path) {
                    Some(loaded) => loaded == current,
                    None => current.is_null(),
                },
                _ => false,
            };
            if !unchanged {
                changes.push((column, value));
            }
        }

        if changes.is_empty() && self.options.skip_unchanged_updates {
            debug!(entity = %entity.name, "unchanged update skipped");
            draft.links.clear();
            return Ok(draft);
        }
        if subject.restrict_to.is_none() {
            if let Some(column) = entity.column_with_role(ColumnRole::UpdateDate) {
                changes.push((column, StepValue::Value(Value::CurrentTimestamp)));
            }
            if let Some(column) = entity.column_with_role(ColumnRole::Version) {
                if let Some(version) = instance
                    .loaded_value(&column.property_path)
                    .and_then(Value::as_i64)
                {
                    changes.push((column, StepValue::Value(Value::Int(version + 1))));
                }
            }
        }
        if changes.is_empty() {
            return Ok(draft);
        }

        let key = self.identifier_key(entity, subject.identifier.as_ref(), "update")?;
        for (slot, owner) in entity.tables.iter().enumerate() {
            let values: Vec<ColumnValue<StepValue>> = changes
                .iter()
                .filter(|(column, _)| table_slot(entity, column.table_owner) == slot)
                .map(|(column, value)| {
                    ColumnValue::new(
                        column.database_name.clone(),
                        column.property_path.clone(),
                        value.clone(),
                    )
                })
                .collect();
            if values.is_empty() {
                continue;
            }
            draft.steps.push(Step {
                subject: Some(subject.id),
                purpose: StepPurpose::Row,
                action: StepAction::Update {
                    table: self.schema.entity(*owner).table.clone(),
                    values,
                    key: key.clone(),
                },
            });
        }
        Ok(draft)
    }

    /// Replace the join columns of `relation` with null in the row insert, or
    /// drop them from the row update, and set them in a follow-up update.
    fn defer_relation(
        &self,
        draft: &mut RowDraft,
        index: usize,
        relation: &str,
    ) -> Result<Option<Step>, PersistError> {
        let subject = &self.subjects.list[index];
        let entity = self.schema.entity(subject.entity);
        let relation = relation_of(entity, relation)?;
        let columns: Vec<&Column> = relation
            .join_columns
            .iter()
            .filter_map(|path| entity.column(path))
            .collect();
        let is_join = |name: &str| columns.iter().any(|c| c.database_name == name);

        let mut moved = Vec::new();
        for step in &mut draft.steps {
            match &mut step.action {
                StepAction::Insert { values, .. } => {
                    for value in values.iter_mut().filter(|v| is_join(&v.column)) {
                        moved.push(value.clone());
                        value.value = StepValue::Value(Value::Null);
                    }
                }
                StepAction::Update { values, .. } => values.retain(|value| {
                    if is_join(&value.column) {
                        moved.push(value.clone());
                        false
                    } else {
                        true
                    }
                }),
                _ => {}
            }
        }
        draft.steps.retain(|step| !step.is_update() || !step.values().is_empty());

        let Some(owner) = columns.first().map(|c| c.table_owner) else {
            return Ok(None);
        };
        if moved.is_empty() {
            return Ok(None);
        }
        debug!(entity = %entity.name, relation = %relation.property_path, "relation deferred");
        Ok(Some(Step {
            subject: Some(subject.id),
            purpose: StepPurpose::DeferredRelation,
            action: StepAction::Update {
                table: self.schema.entity(owner).table.clone(),
                values: moved,
                key: self.subject_key(subject)?,
            },
        }))
    }

    fn junction_steps(
        &self,
        subject: &Subject,
        trailing: &mut Trailing,
    ) -> Result<(), PersistError> {
        let entity = self.schema.entity(subject.entity);
        let instance = instance_of(self.graph, subject.instance)?;
        for (path, value) in &instance.relations {
            let relation = relation_of(entity, path)?;
            let (Some(junction), RelationValue::Many(related)) = (&relation.junction, value) else {
                continue;
            };
            let junction_entity = self.schema.entity(junction.entity);
            let loaded: &[Identifier] = instance
                .loaded
                .as_ref()
                .and_then(|l| l.related.get(path))
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let mut current = Vec::new();
            for related_id in related {
                let related_instance = instance_of(self.graph, *related_id)?;
                let related_entity = entity_of(self.schema, related_instance)?;
                if !related_instance.is_new() {
                    if let Some(identifier) = related_instance.identifier(related_entity) {
                        let known = loaded.contains(&identifier);
                        current.push(identifier);
                        if known {
                            continue;
                        }
                    }
                }

                let key: BTreeMap<String, InstanceId> = junction
                    .owner_columns
                    .iter()
                    .map(|(column, _)| (column.clone(), subject.instance))
                    .chain(
                        junction
                            .target_columns
                            .iter()
                            .map(|(column, _)| (column.clone(), *related_id)),
                    )
                    .collect();
                if !trailing.seen_inserts.insert((junction.entity, key)) {
                    continue;
                }

                let mut values = Vec::new();
                for (column, referenced) in &junction.owner_columns {
                    values.push(ColumnValue::new(
                        junction_column_name(junction_entity, column),
                        column.clone(),
                        self.reference_value(subject.instance, referenced)?,
                    ));
                }
                for (column, referenced) in &junction.target_columns {
                    values.push(ColumnValue::new(
                        junction_column_name(junction_entity, column),
                        column.clone(),
                        self.reference_value(*related_id, referenced)?,
                    ));
                }
                trailing.junction_inserts.push(Step {
                    subject: Some(subject.id),
                    purpose: StepPurpose::Junction,
                    action: StepAction::Insert {
                        table: junction_entity.table.clone(),
                        values,
                        returning: Vec::new(),
                    },
                });
            }

            let target = self.schema.entity(relation.target);
            for identifier in loaded.iter().filter(|id| !current.contains(id)) {
                let mut key = Vec::new();
                for (column, referenced) in &junction.owner_columns {
                    let value = instance
                        .value(referenced)
                        .filter(|v| !v.is_null())
                        .cloned()
                        .ok_or_else(|| PersistError::MissingIdentifier {
                            entity: entity.name.clone(),
                            operation: "junction remove".into(),
                        })?;
                    key.push(ColumnValue::new(
                        junction_column_name(junction_entity, column),
                        column.clone(),
                        value,
                    ));
                }
                for (column, referenced) in &junction.target_columns {
                    let value = identifier.get(referenced).cloned().ok_or_else(|| {
                        PersistError::MissingIdentifier {
                            entity: target.name.clone(),
                            operation: "junction remove".into(),
                        }
                    })?;
                    key.push(ColumnValue::new(
                        junction_column_name(junction_entity, column),
                        column.clone(),
                        value,
                    ));
                }
                let seen: BTreeMap<String, Value> = key
                    .iter()
                    .map(|c| (c.column.clone(), c.value.clone()))
                    .collect();
                if !trailing.seen_deletes.insert((junction.entity, seen)) {
                    continue;
                }
                trailing.junction_deletes.push(Step {
                    subject: Some(subject.id),
                    purpose: StepPurpose::Junction,
                    action: StepAction::Delete {
                        table: junction_entity.table.clone(),
                        key: key
                            .into_iter()
                            .map(|c| {
                                ColumnValue::new(c.column, c.property, StepValue::Value(c.value))
                            })
                            .collect(),
                    },
                });
            }
        }
        Ok(())
    }

    /// Rows dropped from a one-to-many collection, handled per the inverse
    /// relation's orphaned row action.
    fn orphan_steps(
        &self,
        subject: &Subject,
        claimed: &HashSet<(EntityId, Identifier)>,
        trailing: &mut Trailing,
    ) -> Result<(), PersistError> {
        if subject.operation != SubjectOperation::Update {
            return Ok(());
        }
        let entity = self.schema.entity(subject.entity);
        let instance = instance_of(self.graph, subject.instance)?;
        let Some(loaded) = &instance.loaded else {
            return Ok(());
        };
        for (path, value) in &instance.relations {
            let relation = relation_of(entity, path)?;
            let (RelationKind::OneToMany, RelationValue::Many(children)) = (relation.kind, value)
            else {
                continue;
            };
            let Some(previous) = loaded.related.get(path) else {
                continue;
            };
            let target = self.schema.entity(relation.target);
            let root = self.schema.root_of(target.id);
            let mut current = Vec::new();
            for child in children {
                let child = instance_of(self.graph, *child)?;
                if let Some(identifier) = child.identifier(entity_of(self.schema, child)?) {
                    current.push(identifier);
                }
            }

            let inverse = self.schema.inverse_relation(relation);
            let action = inverse
                .map(|r| r.orphaned_row_action)
                .unwrap_or(OrphanedRowAction::Nullify);
            for identifier in previous {
                if current.contains(identifier) || claimed.contains(&(root, identifier.clone())) {
                    continue;
                }
                let key = self.identifier_key(target, Some(identifier), "orphan")?;
                match action {
                    OrphanedRowAction::Disable => {}
                    OrphanedRowAction::Nullify => {
                        let Some(inverse) = inverse else {
                            warn!(
                                entity = %entity.name,
                                relation = %path,
                                "orphan without inverse relation left untouched"
                            );
                            continue;
                        };
                        let columns: Vec<&Column> = inverse
                            .join_columns
                            .iter()
                            .filter_map(|p| target.column(p))
                            .collect();
                        let Some(owner) = columns.first().map(|c| c.table_owner) else {
                            continue;
                        };
                        trailing.orphans.push(Step {
                            subject: Some(subject.id),
                            purpose: StepPurpose::Orphan,
                            action: StepAction::Update {
                                table: self.schema.entity(owner).table.clone(),
                                values: columns
                                    .iter()
                                    .map(|c| {
                                        ColumnValue::new(
                                            c.database_name.clone(),
                                            c.property_path.clone(),
                                            StepValue::Value(Value::Null),
                                        )
                                    })
                                    .collect(),
                                key,
                            },
                        });
                    }
                    OrphanedRowAction::Delete => {
                        for table in target.tables.iter().rev() {
                            trailing.orphans.push(Step {
                                subject: Some(subject.id),
                                purpose: StepPurpose::Orphan,
                                action: StepAction::Delete {
                                    table: self.schema.entity(*table).table.clone(),
                                    key: key.clone(),
                                },
                            });
                        }
                    }
                    OrphanedRowAction::SoftDelete => {
                        let mut step = self.delete_date_step(target, key, Value::CurrentTimestamp)?;
                        step.subject = Some(subject.id);
                        step.purpose = StepPurpose::Orphan;
                        trailing.orphans.push(step);
                    }
                }
            }
        }
        Ok(())
    }

    fn claimed_identifiers(&self) -> HashSet<(EntityId, Identifier)> {
        self.subjects
            .list
            .iter()
            .filter_map(|s| {
                s.identifier
                    .clone()
                    .map(|id| (self.schema.root_of(s.entity), id))
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Remove, soft remove, recover
    // ---------------------------------------------------------------

    fn plan_remove(&mut self) -> Result<Vec<Step>, PersistError> {
        let mut dependencies = DependencyGraph::new(self.subjects.list.len());
        for (index, subject) in self.subjects.list.iter().enumerate() {
            let entity = self.schema.entity(subject.entity);
            let instance = instance_of(self.graph, subject.instance)?;
            for relation in entity.relations.iter().filter(|r| r.has_join_columns()) {
                let Some(RelationValue::One(Some(related))) =
                    instance.relations.get(&relation.property_path)
                else {
                    continue;
                };
                if let Some(target) = self.subjects.of_instance(*related) {
                    if target.id.0 != index {
                        dependencies.add_edge(
                            target.id.0,
                            index,
                            Some(relation.property_path.clone()),
                            relation.nullable,
                        );
                    }
                }
            }
        }
        let (mut order, deferred) = self.order(&mut dependencies)?;
        order.reverse();

        let mut steps = Vec::new();
        for (index, relation) in deferred {
            let subject = &self.subjects.list[index];
            let entity = self.schema.entity(subject.entity);
            let relation = relation_of(entity, &relation)?;
            let columns: Vec<&Column> = relation
                .join_columns
                .iter()
                .filter_map(|p| entity.column(p))
                .collect();
            let Some(owner) = columns.first().map(|c| c.table_owner) else {
                continue;
            };
            steps.push(Step {
                subject: Some(subject.id),
                purpose: StepPurpose::DeferredRelation,
                action: StepAction::Update {
                    table: self.schema.entity(owner).table.clone(),
                    values: columns
                        .iter()
                        .map(|c| {
                            ColumnValue::new(
                                c.database_name.clone(),
                                c.property_path.clone(),
                                StepValue::Value(Value::Null),
                            )
                        })
                        .collect(),
                    key: self.identifier_key(entity, subject.identifier.as_ref(), "remove")?,
                },
            });
        }

        let (schema, subjects) = (self.schema, self.subjects);
        for index in order {
            let subject = &subjects.list[index];
            let entity = schema.entity(subject.entity);
            let key = self.identifier_key(entity, subject.identifier.as_ref(), "remove")?;
            let effects = self.tree_effects(subject)?;
            steps.extend(effects.before.into_iter().map(|op| tree_step(subject.id, op)));
            for table in entity.tables.iter().rev() {
                steps.push(Step {
                    subject: Some(subject.id),
                    purpose: StepPurpose::Row,
                    action: StepAction::Delete {
                        table: schema.entity(*table).table.clone(),
                        key: key.clone(),
                    },
                });
            }
            steps.extend(effects.after.into_iter().map(|op| tree_step(subject.id, op)));
        }
        Ok(steps)
    }

    fn plan_soft(&mut self) -> Result<Vec<Step>, PersistError> {
        let mut steps = Vec::new();
        for subject in &self.subjects.list {
            let entity = self.schema.entity(subject.entity);
            let operation = subject.operation.name();
            let key = self.identifier_key(entity, subject.identifier.as_ref(), operation)?;
            let value = match subject.operation {
                SubjectOperation::SoftRemove => Value::CurrentTimestamp,
                _ => Value::Null,
            };
            let mut step = self.delete_date_step(entity, key, value)?;
            step.subject = Some(subject.id);
            steps.push(step);
        }
        Ok(steps)
    }

    fn delete_date_step(
        &self,
        entity: &EntitySchema,
        key: Vec<ColumnValue<StepValue>>,
        value: Value,
    ) -> Result<Step, PersistError> {
        let column = entity.column_with_role(ColumnRole::DeleteDate).ok_or_else(|| {
            PersistError::MissingDeleteDateColumn {
                entity: entity.name.clone(),
            }
        })?;
        Ok(Step {
            subject: None,
            purpose: StepPurpose::Row,
            action: StepAction::Update {
                table: self.schema.entity(column.table_owner).table.clone(),
                values: vec![ColumnValue::new(
                    column.database_name.clone(),
                    column.property_path.clone(),
                    StepValue::Value(value),
                )],
                key,
            },
        })
    }

    // ---------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------

    /// Sort subjects, deferring one nullable relation per cycle until the
    /// graph is acyclic. Returns the order and the deferred (subject, relation) pairs.
    fn order(
        &self,
        dependencies: &mut DependencyGraph,
    ) -> Result<(Vec<usize>, Vec<(usize, String)>), PersistError> {
        let mut deferred = Vec::new();
        loop {
            let cycle = match dependencies.sort() {
                Ok(order) => return Ok((order, deferred)),
                Err(cycle) => cycle,
            };
            let breakable = cycle
                .iter()
                .map(|index| dependencies.edge(*index))
                .find(|edge| edge.nullable)
                .and_then(|edge| edge.relation.clone().map(|relation| (edge.to, relation)));
            match breakable {
                Some((to, relation)) => {
                    dependencies.disable(to, &relation);
                    deferred.push((to, relation));
                }
                None => {
                    let mut entities: Vec<String> = Vec::new();
                    for index in &cycle {
                        let subject = &self.subjects.list[dependencies.edge(*index).from];
                        let name = &self.schema.entity(subject.entity).name;
                        if !entities.contains(name) {
                            entities.push(name.clone());
                        }
                    }
                    return Err(PersistError::CyclicEntitiesDependencies { entities });
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Trees
    // ---------------------------------------------------------------

    fn tree_effects(&mut self, subject: &Subject) -> Result<TreeEffects, PersistError> {
        let schema = self.schema;
        let entity = schema.entity(subject.entity);
        let (Some(tree), Some(strategy)) = (entity.tree.as_ref(), strategy_for(schema, entity))
        else {
            return Ok(TreeEffects::default());
        };
        let instance = instance_of(self.graph, subject.instance)?;
        let node = self.tree_node(subject.instance)?;

        let effects = match subject.operation {
            SubjectOperation::Insert => {
                let parent = self.tree_parent(entity, tree, subject.instance, instance)?;
                strategy.on_insert(&node, parent.as_ref())?
            }
            SubjectOperation::Update => {
                let Some(new_parent) =
                    self.related_one(subject.instance, instance, &tree.parent_relation)
                else {
                    return Ok(TreeEffects::default());
                };
                let relation = relation_of(entity, &tree.parent_relation)?;
                let new_values = self.join_values(entity, relation, new_parent)?;
                let moved = new_values.iter().any(|(path, value)| match value {
                    StepValue::Value(value) => {
                        instance.loaded_value(path).unwrap_or(&Value::Null) != value
                    }
                    _ => true,
                });
                if !moved {
                    return Ok(TreeEffects::default());
                }
                if let Some(parent) = new_parent {
                    self.check_not_below(entity, tree, subject.instance, parent, &node)?;
                }
                let old_parent = self.key_node(entity, relation, |path| {
                    instance.loaded_value(path).cloned()
                });
                let new_parent = match new_parent {
                    Some(parent) => Some(self.tree_node(parent)?),
                    None => None,
                };
                strategy.on_move(&node, old_parent.as_ref(), new_parent.as_ref())?
            }
            SubjectOperation::Remove => strategy.on_remove(&node)?,
            _ => TreeEffects::default(),
        };
        self.track(
            subject.instance,
            &effects,
            subject.operation == SubjectOperation::Remove,
        );
        Ok(effects)
    }

    fn tree_node(&self, id: InstanceId) -> Result<TreeNode, PersistError> {
        let instance = instance_of(self.graph, id)?;
        let entity = entity_of(self.schema, instance)?;
        let subject = self.subjects.of_instance(id);
        let key: Vec<ColumnValue<StepValue>> = entity
            .primary_columns()
            .map(|column| {
                let value = match instance.value(&column.property_path).filter(|v| !v.is_null()) {
                    Some(value) => StepValue::Value(value.clone()),
                    None => match subject {
                        Some(s) if s.is_insert() => StepValue::Generated {
                            subject: s.id,
                            property: column.property_path.clone(),
                        },
                        _ => StepValue::Value(Value::Null),
                    },
                };
                ColumnValue::new(column.database_name.clone(), column.property_path.clone(), value)
            })
            .collect();
        let label = instance
            .identifier(entity)
            .map(|i| i.path_segment())
            .unwrap_or_else(|| "<new>".to_string());
        let path = self.paths.get(&id).cloned().or_else(|| {
            let column = entity.tree.as_ref()?.path_column.as_deref()?;
            instance
                .value(column)
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .map(StepValue::text)
        });
        let soft_deleted = entity
            .column_with_role(ColumnRole::DeleteDate)
            .and_then(|c| instance.value(&c.property_path))
            .is_some_and(|v| !v.is_null());
        Ok(TreeNode {
            entity: entity.name.clone(),
            label,
            table: entity.table.clone(),
            key,
            path,
            bounds: self.bounds.get(&id).copied(),
            soft_deleted,
            pending: subject.is_some_and(|s| s.is_insert()),
        })
    }

    fn tree_parent(
        &self,
        entity: &EntitySchema,
        tree: &TreeSchema,
        id: InstanceId,
        instance: &Instance,
    ) -> Result<Option<TreeNode>, PersistError> {
        match self.related_one(id, instance, &tree.parent_relation) {
            Some(Some(parent)) => Ok(Some(self.tree_node(parent)?)),
            Some(None) => Ok(None),
            None => {
                let relation = relation_of(entity, &tree.parent_relation)?;
                Ok(self.key_node(entity, relation, |path| instance.value(path).cloned()))
            }
        }
    }

    /// Parent node known only by the join column values of `relation`.
    fn key_node(
        &self,
        entity: &EntitySchema,
        relation: &Relation,
        value_of: impl Fn(&str) -> Option<Value>,
    ) -> Option<TreeNode> {
        let target = self.schema.entity(relation.target);
        let mut key = Vec::new();
        for path in &relation.join_columns {
            let value = value_of(path).filter(|v| !v.is_null())?;
            let referenced = entity.column(path)?.reference.as_ref()?;
            let primary = target.column(&referenced.referenced_column)?;
            key.push(ColumnValue::new(
                primary.database_name.clone(),
                primary.property_path.clone(),
                StepValue::Value(value),
            ));
        }
        if key.is_empty() {
            return None;
        }
        let label = key
            .iter()
            .map(|c| match &c.value {
                StepValue::Value(v) => v.to_string(),
                _ => String::new(),
            })
            .collect::<Vec<_>>()
            .join("-");
        Some(TreeNode {
            entity: target.name.clone(),
            label,
            table: target.table.clone(),
            key,
            path: None,
            bounds: None,
            soft_deleted: false,
            pending: false,
        })
    }

    /// Reject a move under the node itself or one of its descendants.
    fn check_not_below(
        &self,
        entity: &EntitySchema,
        tree: &TreeSchema,
        node: InstanceId,
        parent: InstanceId,
        tree_node: &TreeNode,
    ) -> Result<(), PersistError> {
        let mut current = Some(parent);
        let mut steps = 0;
        while let Some(id) = current {
            if id == node {
                return Err(TreeError::MoveIntoOwnSubtree {
                    entity: entity.name.clone(),
                    node: tree_node.label.clone(),
                }
                .into());
            }
            steps += 1;
            if steps > self.graph.len() {
                break;
            }
            let instance = instance_of(self.graph, id)?;
            current = self
                .related_one(id, instance, &tree.parent_relation)
                .flatten();
        }
        Ok(())
    }

    /// Bring planned paths and bounds up to date with a node's effects.
    fn track(&mut self, id: InstanceId, effects: &TreeEffects, removed: bool) {
        for operation in effects.before.iter().chain(&effects.after) {
            self.apply_tree_operation(operation);
        }
        if let Some(path) = &effects.path {
            self.paths.insert(id, path.clone());
        }
        if let Some(bounds) = effects.bounds {
            self.bounds.insert(id, bounds);
        }
        if removed {
            self.bounds.remove(&id);
            self.paths.remove(&id);
        }
    }

    fn apply_tree_operation(&mut self, operation: &TreeOperation<StepValue>) {
        match operation {
            TreeOperation::ShiftBounds {
                table, from, delta, ..
            } => {
                for (id, (left, right)) in self.bounds.iter_mut() {
                    if table_of(self.schema, self.graph, *id) == Some(table) {
                        *left = shifted_bound(*left, *from, *delta);
                        *right = shifted_bound(*right, *from, *delta);
                    }
                }
            }
            TreeOperation::MoveSubtree {
                table,
                left: l,
                right: r,
                target,
                ..
            } => {
                let target = target.unwrap_or_else(|| {
                    self.bounds
                        .iter()
                        .filter(|(id, _)| table_of(self.schema, self.graph, **id) == Some(table))
                        .map(|(_, (_, right))| *right)
                        .max()
                        .unwrap_or(*r)
                        + 1
                });
                for (id, (left, right)) in self.bounds.iter_mut() {
                    if table_of(self.schema, self.graph, *id) == Some(table) {
                        *left = moved_bound(*left, *l, *r, target);
                        *right = moved_bound(*right, *l, *r, target);
                    }
                }
            }
            TreeOperation::RewritePathPrefix {
                table,
                old_prefix,
                new_prefix,
                ..
            } => {
                for (id, instance) in self.graph.iter() {
                    if table_of(self.schema, self.graph, id) != Some(table) {
                        continue;
                    }
                    let known = match self.paths.get(&id) {
                        Some(StepValue::Value(value)) => value.as_str().map(str::to_string),
                        Some(_) => None,
                        None => self
                            .schema
                            .entity(instance.entity)
                            .tree
                            .as_ref()
                            .and_then(|t| t.path_column.as_deref())
                            .and_then(|c| instance.value(c))
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    };
                    if let Some(rest) = known
                        .as_deref()
                        .and_then(|p| p.strip_prefix(old_prefix.as_str()))
                    {
                        let rewritten =
                            StepValue::Concat(vec![new_prefix.clone(), StepValue::text(rest)]);
                        self.paths.insert(id, rewritten);
                    }
                }
            }
            _ => {}
        }
    }

    // ---------------------------------------------------------------
    // Values
    // ---------------------------------------------------------------

    /// Related instance of a to-one relation.
    ///
    /// `None` when the relation is left alone, `Some(None)` when it is unset.
    fn related_one(
        &self,
        id: InstanceId,
        instance: &Instance,
        relation: &str,
    ) -> Option<Option<InstanceId>> {
        match instance.relations.get(relation) {
            Some(RelationValue::One(related)) => Some(*related),
            Some(RelationValue::Many(_)) => None,
            None => self
                .implied
                .get(&(id, relation.to_string()))
                .map(|parent| Some(*parent)),
        }
    }

    /// Join column values of `relation` pointing at `related`.
    fn join_values(
        &self,
        entity: &EntitySchema,
        relation: &Relation,
        related: Option<InstanceId>,
    ) -> Result<Vec<(String, StepValue)>, PersistError> {
        let mut values = Vec::new();
        for path in &relation.join_columns {
            let value = match (related, entity.column(path).and_then(|c| c.reference.as_ref())) {
                (Some(related), Some(reference)) => {
                    self.reference_value(related, &reference.referenced_column)?
                }
                _ => StepValue::Value(Value::Null),
            };
            values.push((path.clone(), value));
        }
        Ok(values)
    }

    fn link_to(
        &self,
        subject: &Subject,
        relation: &Relation,
        related: Option<InstanceId>,
        values: &[(String, StepValue)],
    ) -> Option<Link> {
        let target = self.subjects.of_instance(related?)?;
        if !target.is_insert() {
            return None;
        }
        let pending = values.iter().any(|(_, v)| !v.dependencies().is_empty());
        if target.id == subject.id && !pending {
            return None;
        }
        let entity = self.schema.entity(subject.entity);
        let nullable = relation.nullable
            && relation
                .join_columns
                .iter()
                .filter_map(|p| entity.column(p))
                .all(|c| c.nullable);
        Some(Link {
            relation: relation.property_path.clone(),
            target: target.id,
            nullable,
        })
    }

    /// Value of `property` on `related`, pending when it is inserted in this unit.
    fn reference_value(
        &self,
        related: InstanceId,
        property: &str,
    ) -> Result<StepValue, PersistError> {
        let instance = instance_of(self.graph, related)?;
        if let Some(value) = instance.value(property).filter(|v| !v.is_null()) {
            return Ok(StepValue::Value(value.clone()));
        }
        match self.subjects.of_instance(related) {
            Some(subject) if subject.is_insert() => Ok(StepValue::Generated {
                subject: subject.id,
                property: property.to_string(),
            }),
            _ => Err(PersistError::MissingIdentifier {
                entity: entity_of(self.schema, instance)?.name.clone(),
                operation: "reference".into(),
            }),
        }
    }

    /// Primary key of a subject's row, pending for inserts.
    fn subject_key(&self, subject: &Subject) -> Result<Vec<ColumnValue<StepValue>>, PersistError> {
        let entity = self.schema.entity(subject.entity);
        entity
            .primary_columns()
            .map(|column| {
                let value = self.reference_value(subject.instance, &column.property_path)?;
                Ok(ColumnValue::new(
                    column.database_name.clone(),
                    column.property_path.clone(),
                    value,
                ))
            })
            .collect()
    }

    fn identifier_key(
        &self,
        entity: &EntitySchema,
        identifier: Option<&Identifier>,
        operation: &str,
    ) -> Result<Vec<ColumnValue<StepValue>>, PersistError> {
        let missing = || PersistError::MissingIdentifier {
            entity: entity.name.clone(),
            operation: operation.to_string(),
        };
        let identifier = identifier.ok_or_else(missing)?;
        entity
            .primary_columns()
            .map(|column| {
                let value = identifier.get(&column.property_path).ok_or_else(missing)?;
                Ok(ColumnValue::new(
                    column.database_name.clone(),
                    column.property_path.clone(),
                    StepValue::Value(value.clone()),
                ))
            })
            .collect()
    }
}

/// Value written on insert for a column not set through a relation.
fn insert_value(entity: &EntitySchema, instance: &Instance, column: &Column) -> Option<StepValue> {
    match column.role {
        ColumnRole::Discriminator => {
            let discriminator = entity.discriminator.as_ref()?;
            return Some(StepValue::text(discriminator.value.clone()));
        }
        ColumnRole::MaterializedPath | ColumnRole::NestedSetLeft | ColumnRole::NestedSetRight => {
            return None;
        }
        _ => {}
    }
    match instance.value(&column.property_path) {
        Some(value) if !(value.is_null() && column.is_generated()) => {
            return Some(StepValue::Value(value.clone()));
        }
        _ => {}
    }
    match column.role {
        ColumnRole::Version => Some(StepValue::Value(Value::Int(1))),
        _ => None,
    }
}

fn table_slot(entity: &EntitySchema, owner: EntityId) -> usize {
    entity.tables.iter().position(|t| *t == owner).unwrap_or(0)
}

fn table_of<'g>(
    schema: &'g SchemaGraph,
    graph: &EntityGraph,
    id: InstanceId,
) -> Option<&'g TableName> {
    let instance = graph.get(id)?;
    if instance.entity.0 >= schema.len() {
        return None;
    }
    Some(&schema.entity(instance.entity).table)
}

fn junction_column_name(junction: &EntitySchema, path: &str) -> String {
    junction
        .column(path)
        .map(|c| c.database_name.clone())
        .unwrap_or_else(|| path.to_string())
}

fn merge_tree_values(rows: &mut [Step], values: Vec<ColumnValue<StepValue>>) {
    let Some(StepAction::Insert { values: row, .. }) = rows.first_mut().map(|s| &mut s.action)
    else {
        return;
    };
    for value in values {
        match row.iter_mut().find(|c| c.column == value.column) {
            Some(existing) => existing.value = value.value,
            None => row.push(value),
        }
    }
}

fn tree_step(subject: SubjectId, operation: TreeOperation<StepValue>) -> Step {
    Step {
        subject: Some(subject),
        purpose: StepPurpose::Tree,
        action: StepAction::Tree(operation),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{MetadataOptions, PersistOptions};
    use crate::error::PersistError;
    use crate::metadata::{
        Cascade, CascadeSet, ColumnDef, ColumnRole, ColumnType, EntityDef, InheritanceDef,
        MetadataRegistry, RelationDef,
    };
    use crate::persist::{
        EntityGraph, Instance, LoadedState, PersistOperation, StepPurpose, StepValue, SubjectId,
        UnitOfWork,
    };
    use crate::schema::SchemaGraph;
    use crate::value::{Identifier, Value};
    use pretty_assertions::assert_eq;

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
                    .with_column(ColumnDef::special("version", ColumnRole::Version))
                    .with_column(ColumnDef::special("updatedAt", ColumnRole::UpdateDate))
                    .with_column(ColumnDef::special("deletedAt", ColumnRole::DeleteDate))
                    .with_relation(RelationDef::many_to_one("author", "User").with_inverse("posts"))
                    .with_relation(
                        RelationDef::many_to_many("categories", "Category")
                            .with_join_table()
                            .cascade(Cascade::Insert),
                    ),
            )
            .with_entity(
                EntityDef::new("Category")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("name", ColumnType::Varchar))
                    .with_relation(
                        RelationDef::many_to_many("posts", "Post").with_inverse("categories"),
                    ),
            )
            .with_entity(
                EntityDef::new("Node")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(
                        RelationDef::many_to_one("next", "Node").with_cascade(CascadeSet::all()),
                    ),
            )
            .with_entity(
                EntityDef::new("Pair")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(
                        RelationDef::many_to_one("other", "Pair")
                            .required()
                            .with_cascade(CascadeSet::all()),
                    ),
            )
            .with_entity(
                EntityDef::new("Person")
                    .with_inheritance(InheritanceDef::class_table())
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("name", ColumnType::Varchar)),
            )
            .with_entity(
                EntityDef::new("Employee")
                    .extends("Person")
                    .with_column(ColumnDef::new("salary", ColumnType::Integer)),
            )
            .build(&MetadataOptions::default())
            .unwrap()
    }

    fn generated(subject: usize) -> StepValue {
        StepValue::Generated {
            subject: SubjectId(subject),
            property: "id".into(),
        }
    }

    fn loaded_post(id: i64) -> LoadedState {
        LoadedState::new()
            .with_value("id", id)
            .with_value("title", "first")
            .with_value("version", 3)
    }

    #[test]
    fn test_nullable_cycle_is_deferred() {
        let schema = schema();
        let node = schema.entity_id("Node").unwrap();
        let mut graph = EntityGraph::new();
        let a = graph.add(Instance::new(node));
        let b = graph.add(Instance::new(node).with_one("next", Some(a)));
        graph.relate_one(a, "next", Some(b));

        let options = PersistOptions::default();
        let plan = UnitOfWork::new(&schema, &options).save(&mut graph, &[a]).unwrap();
        let steps = plan.steps();
        assert_eq!(steps.len(), 3);

        assert_eq!(steps[0].subject, Some(SubjectId(1)));
        assert_eq!(steps[0].value_of("nextId"), Some(&StepValue::Value(Value::Null)));
        assert_eq!(steps[1].subject, Some(SubjectId(0)));
        assert_eq!(steps[1].value_of("nextId"), Some(&generated(1)));

        assert_eq!(steps[2].purpose, StepPurpose::DeferredRelation);
        assert_eq!(steps[2].value_of("nextId"), Some(&generated(0)));
        assert!(steps[2].is_update());
    }

    #[test]
    fn test_required_cycle_is_rejected() {
        let schema = schema();
        let pair = schema.entity_id("Pair").unwrap();
        let mut graph = EntityGraph::new();
        let a = graph.add(Instance::new(pair));
        let b = graph.add(Instance::new(pair).with_one("other", Some(a)));
        graph.relate_one(a, "other", Some(b));

        let options = PersistOptions::default();
        let err = UnitOfWork::new(&schema, &options).save(&mut graph, &[a]).unwrap_err();
        assert_eq!(
            err,
            PersistError::CyclicEntitiesDependencies {
                entities: vec!["Pair".into()],
            }
        );
    }

    #[test]
    fn test_update_writes_changed_columns() {
        let schema = schema();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let p = graph.add(
            Instance::new(post)
                .with_value("title", "second")
                .with_loaded(loaded_post(1)),
        );

        let options = PersistOptions::default();
        let plan = UnitOfWork::new(&schema, &options).save(&mut graph, &[p]).unwrap();
        let [step] = plan.steps() else {
            panic!("expected one step, got {:?}", plan.steps());
        };
        assert!(step.is_update());
        assert_eq!(step.values().len(), 3);
        assert_eq!(step.value_of("title"), Some(&StepValue::text("second")));
        assert_eq!(
            step.value_of("updatedAt"),
            Some(&StepValue::Value(Value::CurrentTimestamp))
        );
        assert_eq!(step.value_of("version"), Some(&StepValue::Value(Value::Int(4))));
    }

    #[test]
    fn test_unchanged_update_is_skipped() {
        let schema = schema();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let p = graph.add(Instance::new(post).with_loaded(loaded_post(1)));

        let options = PersistOptions::default();
        let plan = UnitOfWork::new(&schema, &options).save(&mut graph, &[p]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.subjects().len(), 1);
    }

    #[test]
    fn test_remove_deletes_dependents_first() {
        let schema = schema();
        let user = schema.entity_id("User").unwrap();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let u = graph.add(Instance::new(user).with_loaded(LoadedState::new().with_value("id", 1)));
        let p = graph.add(
            Instance::new(post)
                .with_one("author", Some(u))
                .with_loaded(loaded_post(2).with_value("author.id", 1)),
        );

        let options = PersistOptions::default();
        let plan = UnitOfWork::new(&schema, &options).remove(&mut graph, &[u, p]).unwrap();
        let tables: Vec<_> = plan.steps().iter().map(|s| s.table().name.as_str()).collect();
        assert_eq!(tables, vec!["post", "user"]);
        assert!(plan.steps().iter().all(|s| s.is_delete()));
    }

    #[test]
    fn test_orphan_is_nullified() {
        let schema = schema();
        let user = schema.entity_id("User").unwrap();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let kept = graph.add(
            Instance::new(post).with_loaded(loaded_post(2).with_value("author.id", 1)),
        );
        let u = graph.add(
            Instance::new(user).with_many("posts", [kept]).with_loaded(
                LoadedState::new().with_value("id", 1).with_related(
                    "posts",
                    [Identifier::single("id", 2), Identifier::single("id", 3)],
                ),
            ),
        );

        let options = PersistOptions::default();
        let plan = UnitOfWork::new(&schema, &options).save(&mut graph, &[u]).unwrap();
        let [step] = plan.steps() else {
            panic!("expected one step, got {:?}", plan.steps());
        };
        assert_eq!(step.purpose, StepPurpose::Orphan);
        assert_eq!(step.value_of("authorId"), Some(&StepValue::Value(Value::Null)));
        match &step.action {
            crate::persist::StepAction::Update { key, .. } => {
                assert_eq!(key[0].value, StepValue::Value(Value::Int(3)));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_soft_remove() {
        let schema = schema();
        let user = schema.entity_id("User").unwrap();
        let post = schema.entity_id("Post").unwrap();
        let mut graph = EntityGraph::new();
        let p = graph.add(Instance::new(post).with_loaded(loaded_post(4)));
        let u = graph.add(Instance::new(user).with_loaded(LoadedState::new().with_value("id", 1)));
        let options = PersistOptions::default();
        let unit = UnitOfWork::new(&schema, &options);

        let plan = unit.plan(&mut graph, &[p], PersistOperation::SoftRemove).unwrap();
        assert_eq!(
            plan.steps()[0].value_of("deletedAt"),
            Some(&StepValue::Value(Value::CurrentTimestamp))
        );
        let plan = unit.plan(&mut graph, &[p], PersistOperation::Recover).unwrap();
        assert_eq!(
            plan.steps()[0].value_of("deletedAt"),
            Some(&StepValue::Value(Value::Null))
        );

        let err = unit
            .plan(&mut graph, &[u], PersistOperation::SoftRemove)
            .unwrap_err();
        assert_eq!(
            err,
            PersistError::MissingDeleteDateColumn {
                entity: "User".into(),
            }
        );
    }

    #[test]
    fn test_junction_rows_follow_collection_changes() {
        let schema = schema();
        let post = schema.entity_id("Post").unwrap();
        let category = schema.entity_id("Category").unwrap();
        let mut graph = EntityGraph::new();
        let kept = graph.add(
            Instance::new(category).with_loaded(LoadedState::new().with_value("id", 6)),
        );
        let added = graph.add(Instance::new(category).with_value("name", "rust"));
        let p = graph.add(
            Instance::new(post).with_many("categories", [kept, added]).with_loaded(
                loaded_post(1).with_related(
                    "categories",
                    [Identifier::single("id", 5), Identifier::single("id", 6)],
                ),
            ),
        );

        let options = PersistOptions::default();
        let plan = UnitOfWork::new(&schema, &options).save(&mut graph, &[p]).unwrap();
        let steps = plan.steps();
        let purposes: Vec<_> = steps.iter().map(|s| s.purpose).collect();
        assert_eq!(
            purposes,
            vec![StepPurpose::Junction, StepPurpose::Row, StepPurpose::Junction]
        );

        assert!(steps[0].is_delete());
        assert_eq!(steps[0].table().name, "post_categories_category");
        match &steps[0].action {
            crate::persist::StepAction::Delete { key, .. } => {
                let values: Vec<_> =
                    key.iter().map(|c| (c.column.as_str(), c.value.clone())).collect();
                assert_eq!(
                    values,
                    vec![
                        ("postId", StepValue::Value(Value::Int(1))),
                        ("categoryId", StepValue::Value(Value::Int(5))),
                    ]
                );
            }
            other => panic!("unexpected action {other:?}"),
        }

        assert_eq!(steps[1].table().name, "category");
        assert_eq!(steps[2].value_of("postId"), Some(&StepValue::Value(Value::Int(1))));
        assert_eq!(steps[2].value_of("categoryId"), Some(&generated(1)));
    }

    #[test]
    fn test_class_table_insert_writes_every_table() {
        let schema = schema();
        let employee = schema.entity_id("Employee").unwrap();
        let mut graph = EntityGraph::new();
        let e = graph.add(
            Instance::new(employee)
                .with_value("name", "grace")
                .with_value("salary", 10),
        );

        let options = PersistOptions::default();
        let plan = UnitOfWork::new(&schema, &options).save(&mut graph, &[e]).unwrap();
        let steps = plan.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].table().name, "person");
        assert_eq!(steps[0].value_of("name"), Some(&StepValue::text("grace")));
        assert_eq!(steps[1].table().name, "employee");
        assert_eq!(steps[1].value_of("id"), Some(&generated(0)));
        assert_eq!(steps[1].value_of("salary"), Some(&StepValue::Value(Value::Int(10))));
    }
}
