//! Unit of work.
//!
//! A unit of work turns an in-memory object graph into an ordered list of
//! row steps:
//!
//! 1. discovery walks cascades from the roots and classifies every reached
//!    instance as a subject (insert, update, remove, soft remove, recover)
//! 2. planning builds each subject's row steps and orders them so that rows
//!    are written after the rows they reference, deferring a nullable
//!    reference to a follow-up update when the references form a cycle
//! 3. running hands the steps out one at a time, filling in values the
//!    database generated for earlier steps
//!
//! Planning performs no I/O. A rejected unit of work issues no step.

mod instance;
mod planner;
mod run;
mod step;
mod subject;

pub use instance::{EntityGraph, Instance, InstanceId, LoadedState, RelationValue};
pub use run::{PersistOutcome, PlanRun, RowWriter};
pub(crate) use step::map_columns;
pub use step::{ColumnValue, ResolvedStep, Step, StepAction, StepPurpose, StepValue};
pub use subject::{PersistOperation, Subject, SubjectId, SubjectOperation};

use crate::config::PersistOptions;
use crate::error::PersistError;
use crate::schema::SchemaGraph;
use planner::Planner;
use tracing::{debug, instrument};

/// Plans units of work against a schema graph.
#[derive(Debug, Clone, Copy)]
pub struct UnitOfWork<'a> {
    schema: &'a SchemaGraph,
    options: &'a PersistOptions,
}

impl<'a> UnitOfWork<'a> {
    /// Create a unit of work planner.
    pub fn new(schema: &'a SchemaGraph, options: &'a PersistOptions) -> Self {
        Self { schema, options }
    }

    /// Plan `operation` on `roots` and everything their cascades reach.
    ///
    /// Client-generated UUID keys are written into `graph` during discovery.
    #[instrument(skip_all, fields(roots = roots.len(), operation = ?operation))]
    pub fn plan(
        &self,
        graph: &mut EntityGraph,
        roots: &[InstanceId],
        operation: PersistOperation,
    ) -> Result<PersistPlan, PersistError> {
        let subjects = subject::discover(self.schema, graph, roots, operation, self.options)?;
        let steps = Planner::new(self.schema, graph, self.options, &subjects)?.plan(operation)?;
        debug!(subjects = subjects.list.len(), steps = steps.len(), "unit of work planned");

        let entity_names = subjects
            .list
            .iter()
            .map(|s| self.schema.entity(s.entity).name.clone())
            .collect();
        Ok(PersistPlan {
            subjects: subjects.list,
            steps,
            entity_names,
        })
    }

    /// Plan saving `roots`.
    pub fn save(
        &self,
        graph: &mut EntityGraph,
        roots: &[InstanceId],
    ) -> Result<PersistPlan, PersistError> {
        self.plan(graph, roots, PersistOperation::Save)
    }

    /// Plan removing `roots`.
    pub fn remove(
        &self,
        graph: &mut EntityGraph,
        roots: &[InstanceId],
    ) -> Result<PersistPlan, PersistError> {
        self.plan(graph, roots, PersistOperation::Remove)
    }
}

/// Ordered steps of a planned unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistPlan {
    subjects: Vec<Subject>,
    steps: Vec<Step>,
    entity_names: Vec<String>,
}

impl PersistPlan {
    /// Subjects in discovery order.
    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check if the plan has nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Subject of an instance, if the instance takes part.
    pub fn subject_of(&self, instance: InstanceId) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.instance == instance)
    }

    /// Start executing the plan.
    pub fn run(&self) -> PlanRun<'_> {
        PlanRun::new(self)
    }

    pub(crate) fn entity_name(&self, subject: SubjectId) -> &str {
        self.entity_names
            .get(subject.0)
            .map(String::as_str)
            .unwrap_or_default()
    }
}
