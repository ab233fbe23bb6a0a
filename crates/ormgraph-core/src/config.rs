//! Engine configuration.

use crate::error::Error;
use crate::schema::naming::{DefaultNamingStrategy, NamingStrategy, SnakeNamingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrmConfig {
    /// Schema graph building options.
    #[serde(default)]
    pub metadata: MetadataOptions,
    /// Unit of work options.
    #[serde(default)]
    pub persist: PersistOptions,
    /// Schema synchronization options.
    #[serde(default)]
    pub sync: SyncOptions,
}

impl OrmConfig {
    /// Load configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Set metadata options.
    pub fn with_metadata(mut self, metadata: MetadataOptions) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set persist options.
    pub fn with_persist(mut self, persist: PersistOptions) -> Self {
        self.persist = persist;
        self
    }

    /// Set sync options.
    pub fn with_sync(mut self, sync: SyncOptions) -> Self {
        self.sync = sync;
        self
    }
}

/// Built-in naming conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// camelCase columns, snake_case tables.
    #[default]
    Default,
    /// snake_case everywhere.
    Snake,
}

/// Options for building the schema graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataOptions {
    /// Naming convention.
    #[serde(default)]
    pub naming: NamingConvention,
    /// Discriminator column name when the root declares none.
    #[serde(default = "default_discriminator_column")]
    pub discriminator_column: String,
    /// Length given to varchar columns that declare none.
    #[serde(default)]
    pub default_varchar_length: Option<u32>,
}

fn default_discriminator_column() -> String {
    "type".to_string()
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            naming: NamingConvention::Default,
            discriminator_column: default_discriminator_column(),
            default_varchar_length: None,
        }
    }
}

impl MetadataOptions {
    /// Set the naming convention.
    pub fn naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    /// Set the default discriminator column name.
    pub fn discriminator_column(mut self, name: impl Into<String>) -> Self {
        self.discriminator_column = name.into();
        self
    }

    /// Set the default varchar length.
    pub fn default_varchar_length(mut self, length: u32) -> Self {
        self.default_varchar_length = Some(length);
        self
    }

    /// Instantiate the configured naming strategy.
    pub fn naming_strategy(&self) -> Box<dyn NamingStrategy> {
        match self.naming {
            NamingConvention::Default => Box::new(DefaultNamingStrategy),
            NamingConvention::Snake => Box::new(SnakeNamingStrategy),
        }
    }
}

/// Options for planning a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistOptions {
    /// Generate UUID primary keys at discovery time instead of on the database.
    #[serde(default = "default_true")]
    pub generate_uuids: bool,
    /// Maximum depth of cascade discovery.
    #[serde(default = "default_max_cascade_depth")]
    pub max_cascade_depth: usize,
    /// Emit no step for updates without changed columns.
    #[serde(default = "default_true")]
    pub skip_unchanged_updates: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_cascade_depth() -> usize {
    100
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            generate_uuids: cfg!(feature = "uuid"),
            max_cascade_depth: default_max_cascade_depth(),
            skip_unchanged_updates: true,
        }
    }
}

impl PersistOptions {
    /// Set client-side UUID generation.
    pub fn generate_uuids(mut self, generate: bool) -> Self {
        self.generate_uuids = generate;
        self
    }

    /// Set the maximum cascade depth.
    pub fn max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }

    /// Set whether unchanged updates are skipped.
    pub fn skip_unchanged_updates(mut self, skip: bool) -> Self {
        self.skip_unchanged_updates = skip;
        self
    }
}

/// Options for schema synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Drop tables and columns absent from the schema graph.
    /// When false, synchronization only adds and alters.
    #[serde(default = "default_true")]
    pub allow_drops: bool,
    /// Type names the introspector reports mapped to the graph's names
    /// (`int4` -> `integer`).
    #[serde(default)]
    pub type_aliases: BTreeMap<String, String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            allow_drops: true,
            type_aliases: BTreeMap::new(),
        }
    }
}

impl SyncOptions {
    /// Synchronize without dropping tables or columns.
    pub fn without_drops() -> Self {
        Self {
            allow_drops: false,
            ..Self::default()
        }
    }

    /// Add a type alias.
    pub fn with_type_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.type_aliases.insert(from.into(), to.into());
        self
    }

    /// Normalize an introspected type name.
    pub fn normalize_type(&self, name: &str) -> String {
        let lower = name.to_ascii_lowercase();
        self.type_aliases.get(&lower).cloned().unwrap_or(lower)
    }
}
