//! Registry of declarations for one connection's setup.

use super::{EmbeddableDef, EntityDef};
use crate::config::MetadataOptions;
use crate::error::{Error, MetadataError};
use crate::schema::{SchemaBuilder, SchemaGraph};
use serde::{Deserialize, Serialize};

/// Declarations collected before a schema graph is built.
///
/// Registration order is preserved and drives the order of entities in the
/// built graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRegistry {
    /// Entity declarations.
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    /// Embeddable declarations.
    #[serde(default)]
    pub embeddables: Vec<EmbeddableDef>,
}

impl MetadataRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load declarations from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Register an entity.
    pub fn register_entity(&mut self, entity: EntityDef) -> &mut Self {
        self.entities.push(entity);
        self
    }

    /// Register an embeddable.
    pub fn register_embeddable(&mut self, embeddable: EmbeddableDef) -> &mut Self {
        self.embeddables.push(embeddable);
        self
    }

    /// Add an entity (builder style).
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Add an embeddable (builder style).
    pub fn with_embeddable(mut self, embeddable: EmbeddableDef) -> Self {
        self.embeddables.push(embeddable);
        self
    }

    /// Get an entity declaration by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Get an embeddable declaration by name.
    pub fn get_embeddable(&self, name: &str) -> Option<&EmbeddableDef> {
        self.embeddables.iter().find(|e| e.name == name)
    }

    /// Build the resolved schema graph.
    pub fn build(&self, options: &MetadataOptions) -> Result<SchemaGraph, MetadataError> {
        SchemaBuilder::new(self, options).build()
    }
}
