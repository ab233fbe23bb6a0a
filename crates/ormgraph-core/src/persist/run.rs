//! Step-by-step execution of a persist plan.

use super::instance::InstanceId;
use super::step::{ResolvedStep, StepAction};
use super::subject::SubjectId;
use super::PersistPlan;
use crate::error::PersistError;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Executes resolved steps against a database.
pub trait RowWriter {
    /// Execute one step and return the values of its `returning` columns,
    /// keyed by column name.
    fn execute(&mut self, step: &ResolvedStep) -> Result<Vec<(String, Value)>, PersistError>;
}

/// Result of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistOutcome {
    /// Values generated by the database, per instance and property path.
    pub generated: BTreeMap<InstanceId, BTreeMap<String, Value>>,
    /// Number of steps executed.
    pub executed: usize,
}

/// Cursor over a plan's steps.
///
/// Each step is resolved when handed out, from values reported by the steps
/// completed before it. A step must be completed before the next is taken.
#[derive(Debug)]
pub struct PlanRun<'p> {
    plan: &'p PersistPlan,
    next: usize,
    in_flight: Option<usize>,
    values: HashMap<SubjectId, BTreeMap<String, Value>>,
    generated: BTreeMap<InstanceId, BTreeMap<String, Value>>,
}

impl<'p> PlanRun<'p> {
    pub(crate) fn new(plan: &'p PersistPlan) -> Self {
        Self {
            plan,
            next: 0,
            in_flight: None,
            values: HashMap::new(),
            generated: BTreeMap::new(),
        }
    }

    /// Resolve and hand out the next step, or `None` once all steps ran.
    pub fn next_step(&mut self) -> Result<Option<ResolvedStep>, PersistError> {
        if self.in_flight.is_some() {
            return Err(PersistError::StepOutOfOrder);
        }
        let Some(step) = self.plan.steps.get(self.next) else {
            return Ok(None);
        };

        let values = &self.values;
        let plan = self.plan;
        let mut lookup = |subject: SubjectId, property: &str| -> Result<Value, PersistError> {
            values
                .get(&subject)
                .and_then(|v| v.get(property))
                .cloned()
                .ok_or_else(|| PersistError::UnresolvedValue {
                    entity: plan.entity_name(subject).to_string(),
                    column: property.to_string(),
                })
        };
        let resolved = step.try_map(|value| value.resolve(&mut lookup))?;

        if let (true, Some(subject)) = (resolved.is_insert(), resolved.subject) {
            let known = self.values.entry(subject).or_default();
            for column in resolved.values() {
                known.insert(column.property.clone(), column.value.clone());
            }
        }
        debug!(index = self.next, table = %resolved.table(), "step issued");
        self.in_flight = Some(self.next);
        self.next += 1;
        Ok(Some(resolved))
    }

    /// Report the step in flight as executed, with its returned values.
    pub fn complete(&mut self, returned: Vec<(String, Value)>) -> Result<(), PersistError> {
        let index = self.in_flight.take().ok_or(PersistError::StepOutOfOrder)?;
        let step = &self.plan.steps[index];
        let (StepAction::Insert { returning, .. }, Some(subject)) = (&step.action, step.subject)
        else {
            return Ok(());
        };
        let instance = self.plan.subjects[subject.0].instance;
        for (column, value) in returned {
            let Some(target) = returning.iter().find(|c| c.column == column) else {
                continue;
            };
            self.values
                .entry(subject)
                .or_default()
                .insert(target.property.clone(), value.clone());
            self.generated
                .entry(instance)
                .or_default()
                .insert(target.property.clone(), value);
        }
        Ok(())
    }

    /// Check if every step has been handed out and completed.
    pub fn is_finished(&self) -> bool {
        self.in_flight.is_none() && self.next >= self.plan.steps.len()
    }

    /// Finish the run.
    pub fn finish(self) -> PersistOutcome {
        PersistOutcome {
            generated: self.generated,
            executed: self.next,
        }
    }

    /// Run every remaining step through `writer`.
    pub fn run_with<W: RowWriter>(
        mut self,
        writer: &mut W,
    ) -> Result<PersistOutcome, PersistError> {
        while let Some(step) = self.next_step()? {
            let returned = writer.execute(&step)?;
            self.complete(returned)?;
        }
        Ok(self.finish())
    }
}
