//! ORMGraph Core - metadata-driven persistence engine.
//!
//! This crate turns declared entities into a resolved schema graph and
//! derives two kinds of ordered work from it:
//!
//! - row steps for a unit of work, ordered so foreign keys are never violated
//! - DDL operations that bring a database schema in line with the graph
//!
//! Nothing here performs I/O. Executors and introspectors plug in through
//! the [`RowWriter`], [`SchemaIntrospector`] and [`DdlRenderer`] traits.

pub mod config;
pub mod error;
pub mod metadata;
mod order;
pub mod persist;
pub mod schema;
pub mod sync;
pub mod tree;
pub mod value;

pub use config::{MetadataOptions, NamingConvention, OrmConfig, PersistOptions, SyncOptions};
pub use error::{Error, MetadataError, PersistError, SyncError, TreeError};
pub use metadata::{
    Cascade, ColumnDef, ColumnRole, ColumnType, EmbeddableDef, EmbeddedDef, EntityDef,
    InheritanceDef, MetadataRegistry, RelationDef, TreeKind,
};
pub use persist::{
    EntityGraph, Instance, InstanceId, PersistOperation, PersistOutcome, PersistPlan, PlanRun,
    RowWriter, Step, UnitOfWork,
};
pub use schema::{EntityId, EntitySchema, SchemaBuilder, SchemaGraph, TableName};
pub use sync::{
    DatabaseSchema, DdlOperation, DdlRenderer, SafetyGrade, SchemaIntrospector, SyncPlan,
    Synchronizer,
};
pub use tree::{TreeOperation, TreeStrategy};
pub use value::{Identifier, Value};
