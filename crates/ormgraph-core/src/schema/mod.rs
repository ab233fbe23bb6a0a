//! Resolved schema graph.
//!
//! The [`SchemaBuilder`] consumes raw declarations from a
//! [`MetadataRegistry`](crate::metadata::MetadataRegistry) and produces a
//! [`SchemaGraph`]: entity schemas with concrete columns, relations, foreign
//! keys and constraints, with inherited and embedded members flattened.

mod builder;
mod entity;
mod graph;
pub mod naming;

pub use builder::SchemaBuilder;
pub use entity::{
    Check, ClosureRef, Column, ColumnReference, Discriminator, EmbeddedSchema, EntityId,
    EntityKind, EntitySchema, Exclusion, ForeignKey, Index, JunctionRef, Relation, TableName,
    TreeSchema, Unique,
};
pub use graph::SchemaGraph;
pub use naming::{DefaultNamingStrategy, NamingStrategy, SnakeNamingStrategy};
