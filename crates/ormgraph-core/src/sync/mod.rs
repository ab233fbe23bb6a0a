//! Schema synchronization.
//!
//! The schema graph is projected into a backend-neutral [`DatabaseSchema`],
//! compared with the schema an introspector reports, and the differences
//! become graded DDL operations in dependency order. Plans can be rendered
//! to SQL with a [`DdlRenderer`]; executing them is up to the caller.

mod database;
mod desired;
mod diff;
mod error;
mod introspect;
mod plan;
mod render;
mod synchronizer;

pub use database::{
    CheckInfo, ColumnInfo, DatabaseSchema, ExclusionInfo, ForeignKeyInfo, IndexInfo,
    PrimaryKeyInfo, TableInfo, UniqueInfo,
};
pub use error::{SafetyGrade, SyncError};
pub use introspect::{SchemaIntrospector, SnapshotIntrospector};
pub use plan::{DdlOperation, PlannedOperation, SyncPlan};
pub use render::{AnsiRenderer, DdlCapabilities, DdlRenderer};
pub use synchronizer::Synchronizer;
