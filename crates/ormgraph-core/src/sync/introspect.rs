//! Reading the actual schema.

use super::database::DatabaseSchema;
use super::error::SyncError;
use std::path::Path;

/// Reads the current schema of a database.
pub trait SchemaIntrospector {
    /// Introspect every table the synchronizer may touch.
    fn introspect(&self) -> Result<DatabaseSchema, SyncError>;
}

/// Serves a saved schema snapshot instead of a live database.
#[derive(Debug, Clone, Default)]
pub struct SnapshotIntrospector {
    schema: DatabaseSchema,
}

impl SnapshotIntrospector {
    /// Serve `schema`.
    pub fn new(schema: DatabaseSchema) -> Self {
        Self { schema }
    }

    /// Serve a snapshot serialized with [`DatabaseSchema::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        DatabaseSchema::from_bytes(bytes).map(Self::new)
    }

    /// Serve a snapshot file written by [`DatabaseSchema::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        DatabaseSchema::load(path).map(Self::new)
    }
}

impl SchemaIntrospector for SnapshotIntrospector {
    fn introspect(&self) -> Result<DatabaseSchema, SyncError> {
        Ok(self.schema.clone())
    }
}
