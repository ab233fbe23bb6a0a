//! Synchronization entry point.

use super::database::DatabaseSchema;
use super::diff::SchemaDiffer;
use super::error::SyncError;
use super::introspect::SchemaIntrospector;
use super::plan::SyncPlan;
use super::render::{DdlCapabilities, DdlRenderer};
use crate::config::SyncOptions;
use crate::schema::SchemaGraph;
use tracing::{info, instrument, warn};

/// Computes the DDL bringing a database in line with a schema graph.
///
/// Planning never touches the database; the caller executes the plan,
/// inside one transaction where the backend supports transactional DDL.
#[derive(Debug, Clone)]
pub struct Synchronizer<'a> {
    schema: &'a SchemaGraph,
    options: &'a SyncOptions,
    capabilities: DdlCapabilities,
}

impl<'a> Synchronizer<'a> {
    /// Create a synchronizer assuming every column change can be made in place.
    pub fn new(schema: &'a SchemaGraph, options: &'a SyncOptions) -> Self {
        Self {
            schema,
            options,
            capabilities: DdlCapabilities::default(),
        }
    }

    /// Use the capabilities of a specific backend.
    pub fn with_capabilities(mut self, capabilities: DdlCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Schema the graph expects.
    pub fn desired(&self) -> DatabaseSchema {
        self.schema.to_database_schema()
    }

    /// Introspect the database and plan the difference.
    #[instrument(skip_all)]
    pub fn plan(&self, introspector: &dyn SchemaIntrospector) -> Result<SyncPlan, SyncError> {
        let actual = introspector.introspect()?;
        self.diff(&actual)
    }

    /// Plan the difference against an already introspected schema.
    #[instrument(
        skip_all,
        fields(tables = actual.tables.len(), allow_drops = self.options.allow_drops)
    )]
    pub fn diff(&self, actual: &DatabaseSchema) -> Result<SyncPlan, SyncError> {
        let desired = self.desired();
        let operations =
            SchemaDiffer::new(self.options, &self.capabilities).diff(&desired, actual)?;
        let plan = SyncPlan::ordered(operations)?;
        info!(operations = plan.len(), grade = %plan.grade(), "schema diff planned");
        Ok(plan)
    }

    /// Render a plan into statements, in plan order.
    pub fn render(
        &self,
        plan: &SyncPlan,
        renderer: &dyn DdlRenderer,
    ) -> Result<Vec<String>, SyncError> {
        if !renderer.capabilities().transactional && !plan.is_empty() {
            warn!("backend DDL is not transactional; a failed plan is not rolled back");
        }
        let mut statements = Vec::new();
        for planned in plan.operations() {
            statements.extend(renderer.render(&planned.operation)?);
        }
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetadataOptions;
    use crate::metadata::{ColumnDef, ColumnType, EntityDef, MetadataRegistry, RelationDef};
    use crate::sync::{AnsiRenderer, DdlOperation, SafetyGrade, SnapshotIntrospector};

    fn graph() -> SchemaGraph {
        MetadataRegistry::new()
            .with_entity(
                EntityDef::new("User")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("name", ColumnType::Varchar).with_length(50)),
            )
            .with_entity(
                EntityDef::new("Post")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(RelationDef::many_to_one("author", "User")),
            )
            .build(&MetadataOptions::default())
            .unwrap()
    }

    #[test]
    fn test_empty_database_gets_everything() {
        let graph = graph();
        let options = SyncOptions::default();
        let sync = Synchronizer::new(&graph, &options);
        let plan = sync.plan(&SnapshotIntrospector::default()).unwrap();

        let last = plan.operations().last().unwrap();
        assert!(matches!(last.operation, DdlOperation::AddForeignKey { .. }));
        assert_eq!(plan.grade(), SafetyGrade::B);
        assert!(plan
            .operations()
            .iter()
            .take(2)
            .all(|op| matches!(op.operation, DdlOperation::CreateTable(_))));
    }

    #[test]
    fn test_applied_plan_is_idempotent() {
        let graph = graph();
        let options = SyncOptions::default();
        let sync = Synchronizer::new(&graph, &options);

        let mut actual = DatabaseSchema::new();
        for planned in sync.diff(&actual).unwrap().operations() {
            actual.apply(&planned.operation);
        }
        assert!(sync.diff(&actual).unwrap().is_empty());
    }

    #[test]
    fn test_render_plan() {
        let graph = graph();
        let options = SyncOptions::default();
        let sync =
            Synchronizer::new(&graph, &options).with_capabilities(AnsiRenderer.capabilities());
        let plan = sync.diff(&DatabaseSchema::new()).unwrap();

        let statements = sync.render(&plan, &AnsiRenderer).unwrap();
        assert_eq!(statements.len(), plan.len());
        assert!(statements[0].starts_with("CREATE TABLE \"user\""));
    }
}
