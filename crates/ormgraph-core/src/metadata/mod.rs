//! Raw entity declarations.
//!
//! These are the plain metadata records the schema graph builder consumes:
//! entities, columns, relations, embedded types, constraints and inheritance
//! links. They carry no resolved names and no cross references beyond names.

mod column;
mod constraint;
mod embedded;
mod entity;
mod registry;
mod relation;
mod types;

pub use column::ColumnDef;
pub use constraint::{CheckDef, ExclusionDef, IndexDef, UniqueDef};
pub use embedded::{EmbeddableDef, EmbeddedDef};
pub use entity::{DiscriminatorDef, EntityDef, InheritanceDef};
pub use registry::MetadataRegistry;
pub use relation::{JoinColumnDef, JoinTableDef, RelationDef};
pub use types::{
    Cascade, CascadeSet, ColumnRole, ColumnType, DefaultValue, EmbeddedPrefix, Generation,
    InheritanceStrategy, Loading, OrphanedRowAction, ReferentialAction, RelationKind, TreeKind,
};
