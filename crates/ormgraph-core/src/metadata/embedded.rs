//! Embedded (value) types.

use super::column::ColumnDef;
use super::relation::RelationDef;
use super::types::EmbeddedPrefix;
use serde::{Deserialize, Serialize};

/// A reusable group of columns and relations flattened into its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddableDef {
    /// Type name.
    pub name: String,
    /// Columns.
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    /// Relations.
    #[serde(default)]
    pub relations: Vec<RelationDef>,
    /// Nested embeds.
    #[serde(default)]
    pub embeddeds: Vec<EmbeddedDef>,
}

impl EmbeddableDef {
    /// Create an empty embeddable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
            embeddeds: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a relation.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add a nested embed.
    pub fn with_embedded(mut self, embedded: EmbeddedDef) -> Self {
        self.embeddeds.push(embedded);
        self
    }
}

/// Use of an embeddable under a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedDef {
    /// Property name on the owner.
    pub property: String,
    /// Embeddable type name.
    pub embeddable: String,
    /// Column name prefix.
    #[serde(default)]
    pub prefix: EmbeddedPrefix,
}

impl EmbeddedDef {
    /// Embed `embeddable` under `property` with the default prefix.
    pub fn new(property: impl Into<String>, embeddable: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            embeddable: embeddable.into(),
            prefix: EmbeddedPrefix::Default,
        }
    }

    /// Use a custom prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = EmbeddedPrefix::Custom(prefix.into());
        self
    }

    /// Disable the prefix.
    pub fn without_prefix(mut self) -> Self {
        self.prefix = EmbeddedPrefix::Disabled;
        self
    }

    /// The prefix segment this embed contributes, if any.
    pub fn prefix_segment(&self) -> Option<&str> {
        match &self.prefix {
            EmbeddedPrefix::Default => Some(&self.property),
            EmbeddedPrefix::Custom(p) if p.is_empty() => None,
            EmbeddedPrefix::Custom(p) => Some(p),
            EmbeddedPrefix::Disabled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_segment() {
        assert_eq!(
            EmbeddedDef::new("counters", "Counters").prefix_segment(),
            Some("counters")
        );
        assert_eq!(
            EmbeddedDef::new("counters", "Counters")
                .with_prefix("cnt")
                .prefix_segment(),
            Some("cnt")
        );
        assert_eq!(
            EmbeddedDef::new("counters", "Counters")
                .without_prefix()
                .prefix_segment(),
            None
        );
    }
}
