//! Index and constraint declarations.

use serde::{Deserialize, Serialize};

/// An index declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexDef {
    /// Explicit index name.
    #[serde(default)]
    pub name: Option<String>,
    /// Property paths of the indexed columns.
    pub columns: Vec<String>,
    /// Unique index.
    #[serde(default)]
    pub unique: bool,
    /// Spatial index.
    #[serde(default)]
    pub spatial: bool,
    /// Full-text index.
    #[serde(default)]
    pub fulltext: bool,
    /// Partial index predicate.
    #[serde(default)]
    pub where_clause: Option<String>,
}

impl IndexDef {
    /// Index over the given property paths.
    pub fn on(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set a partial index predicate.
    pub fn with_where(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }
}

/// A unique constraint declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UniqueDef {
    /// Explicit constraint name.
    #[serde(default)]
    pub name: Option<String>,
    /// Property paths that must be unique together.
    pub columns: Vec<String>,
}

impl UniqueDef {
    /// Unique constraint over the given property paths.
    pub fn on(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// A check constraint declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckDef {
    /// Explicit constraint name.
    #[serde(default)]
    pub name: Option<String>,
    /// Boolean expression.
    pub expression: String,
}

impl CheckDef {
    /// Check constraint with the given expression.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            name: None,
            expression: expression.into(),
        }
    }
}

/// An exclusion constraint declaration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExclusionDef {
    /// Explicit constraint name.
    #[serde(default)]
    pub name: Option<String>,
    /// Exclusion expression (`USING gist (...)`).
    pub expression: String,
}

impl ExclusionDef {
    /// Exclusion constraint with the given expression.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            name: None,
            expression: expression.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_builder() {
        let index = IndexDef::on(["firstName", "lastName"])
            .named("IDX_name")
            .unique()
            .with_where("\"deletedAt\" IS NULL");

        assert_eq!(index.columns.len(), 2);
        assert!(index.unique);
        assert!(index.where_clause.is_some());
    }

    #[test]
    fn test_check_constraint() {
        let check = CheckDef::new("\"amount\" > 0");
        assert_eq!(check.expression, "\"amount\" > 0");
        assert!(check.name.is_none());
    }
}
