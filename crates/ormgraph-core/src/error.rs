//! Core error types.

use thiserror::Error;

pub use crate::sync::SyncError;

/// Top-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Metadata could not be resolved into a schema graph.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// A unit of work could not be planned or executed.
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    /// Schema synchronization failed.
    #[error("synchronization error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration or declaration document could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while building the schema graph.
///
/// All of these are reported before any I/O takes place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    /// Embedded types reference each other in a cycle.
    #[error("circular embedded types: {}", path.join(" -> "))]
    CircularEmbedded {
        /// The embed chain that closes the cycle.
        path: Vec<String>,
    },

    /// A referenced column does not exist or is ambiguous.
    #[error("column '{column}' not found on entity '{entity}'")]
    EntityColumnNotFound {
        /// Entity searched.
        entity: String,
        /// Column property path or name.
        column: String,
    },

    /// A column has no declared type and none can be inferred.
    #[error("column type for '{entity}.{property}' is not defined and cannot be inferred")]
    ColumnTypeUndefined {
        /// Entity name.
        entity: String,
        /// Property path.
        property: String,
    },

    /// A referenced entity is not registered.
    #[error("entity '{name}' is not registered")]
    UnknownEntity {
        /// Entity name.
        name: String,
    },

    /// A referenced embeddable is not registered.
    #[error("embeddable '{name}' is not registered")]
    UnknownEmbeddable {
        /// Embeddable name.
        name: String,
    },

    /// Two entities or embeddables share a name.
    #[error("'{name}' is declared more than once")]
    DuplicateDeclaration {
        /// Declared name.
        name: String,
    },

    /// An entity has no primary column.
    #[error("entity '{entity}' has no primary column")]
    MissingPrimaryKey {
        /// Entity name.
        entity: String,
    },

    /// Two members flatten to the same property path or column name.
    #[error("duplicate member '{path}' on entity '{entity}'")]
    DuplicatePropertyPath {
        /// Entity name.
        entity: String,
        /// Conflicting property path or database name.
        path: String,
    },

    /// A generated column also declares a static default.
    #[error("column '{entity}.{property}' is generated and cannot have a default")]
    GeneratedWithDefault {
        /// Entity name.
        entity: String,
        /// Property path.
        property: String,
    },

    /// Inheritance declarations are inconsistent.
    #[error("invalid inheritance for '{entity}': {reason}")]
    InvalidInheritance {
        /// Entity name.
        entity: String,
        /// Reason.
        reason: String,
    },

    /// Two entities of one hierarchy share a discriminator value.
    #[error("discriminator value '{value}' is used by both '{first}' and '{second}'")]
    DuplicateDiscriminator {
        /// The shared value.
        value: String,
        /// First entity.
        first: String,
        /// Second entity.
        second: String,
    },

    /// Two entities outside one single-table hierarchy map to the same table.
    #[error("table '{table}' is claimed by both '{first}' and '{second}'")]
    DuplicateTable {
        /// The shared table.
        table: String,
        /// First entity.
        first: String,
        /// Second entity.
        second: String,
    },

    /// A relation declaration is inconsistent.
    #[error("invalid relation '{entity}.{property}': {reason}")]
    InvalidRelation {
        /// Entity name.
        entity: String,
        /// Relation property path.
        property: String,
        /// Reason.
        reason: String,
    },

    /// Tree declarations are inconsistent.
    #[error("invalid tree entity '{entity}': {reason}")]
    InvalidTree {
        /// Entity name.
        entity: String,
        /// Reason.
        reason: String,
    },
}

/// Errors raised while planning or running a unit of work.
///
/// Planning errors abort the whole unit of work before any step is issued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistError {
    /// A dependency cycle without any nullable edge.
    #[error("cyclic dependency between entities: {}", entities.join(", "))]
    CyclicEntitiesDependencies {
        /// Entities that form the cycle.
        entities: Vec<String>,
    },

    /// A relation points at an unsaved entity that is not part of the unit of work.
    #[error("'{entity}.{relation}' references an unsaved '{target}' that is not cascaded")]
    UnsavedRelatedEntity {
        /// Referencing entity.
        entity: String,
        /// Relation property path.
        relation: String,
        /// Target entity.
        target: String,
    },

    /// An operation requires an identifier that the instance does not carry.
    #[error("'{entity}' instance has no identifier for {operation}")]
    MissingIdentifier {
        /// Entity name.
        entity: String,
        /// The operation.
        operation: String,
    },

    /// Cascades walked deeper than configured.
    #[error("maximum cascade depth exceeded: {depth}")]
    MaxCascadeDepthExceeded {
        /// Depth reached.
        depth: usize,
    },

    /// An instance names a relation its entity does not declare.
    #[error("entity '{entity}' has no relation '{relation}'")]
    UnknownRelation {
        /// Entity name.
        entity: String,
        /// Relation property path.
        relation: String,
    },

    /// Soft remove or recover on an entity without a delete date column.
    #[error("entity '{entity}' has no delete date column")]
    MissingDeleteDateColumn {
        /// Entity name.
        entity: String,
    },

    /// An instance belongs to an abstract or unknown entity.
    #[error("instance entity is not part of the schema graph")]
    UnknownInstanceEntity,

    /// `complete` was called without a step in flight, or out of order.
    #[error("step completed out of order")]
    StepOutOfOrder,

    /// A value needed by a step was never produced by its dependency.
    #[error("value for '{entity}.{column}' was not resolved before execution")]
    UnresolvedValue {
        /// Entity name.
        entity: String,
        /// Column property path.
        column: String,
    },

    /// A tree strategy rejected the operation.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The row writer failed.
    #[error("row writer failed: {0}")]
    Writer(String),
}

/// Errors raised by tree persistence strategies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    /// Attaching a node under a soft-deleted ancestor.
    #[error("cannot attach '{entity}' under soft-deleted ancestor {ancestor}")]
    SoftDeletedAncestor {
        /// Entity name.
        entity: String,
        /// Ancestor identifier.
        ancestor: String,
    },

    /// Moving a node below itself.
    #[error("cannot move '{entity}' {node} into its own subtree")]
    MoveIntoOwnSubtree {
        /// Entity name.
        entity: String,
        /// Node identifier.
        node: String,
    },

    /// Nested-set bounds of a persisted node are unknown.
    #[error("nested set bounds of '{entity}' {node} are not loaded")]
    MissingTreeBounds {
        /// Entity name.
        entity: String,
        /// Node identifier.
        node: String,
    },

    /// Materialized path of a persisted node is unknown.
    #[error("materialized path of '{entity}' {node} is not loaded")]
    MissingPath {
        /// Entity name.
        entity: String,
        /// Node identifier.
        node: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MetadataError::CircularEmbedded {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "circular embedded types: A -> B -> A");

        let err = PersistError::CyclicEntitiesDependencies {
            entities: vec!["Post".into(), "Author".into()],
        };
        assert!(err.to_string().contains("Post, Author"));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = MetadataError::UnknownEntity {
            name: "Ghost".into(),
        }
        .into();
        assert!(matches!(err, Error::Metadata(_)));
    }
}
