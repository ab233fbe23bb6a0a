//! Synchronization error types.

use thiserror::Error;

/// Safety grade of a schema operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SafetyGrade {
    /// Grade A: additive, never fails on existing rows.
    /// Examples: new tables, new nullable columns, new indices.
    A,
    /// Grade B: alters that may fail on existing rows.
    /// Examples: type changes, new required columns, new constraints.
    B,
    /// Grade C: column recreation or key changes, data is rewritten.
    C,
    /// Grade D: destructive drops.
    D,
}

impl std::fmt::Display for SafetyGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyGrade::A => write!(f, "A (additive)"),
            SafetyGrade::B => write!(f, "B (may fail on existing rows)"),
            SafetyGrade::C => write!(f, "C (rewrites data)"),
            SafetyGrade::D => write!(f, "D (destructive)"),
        }
    }
}

/// Schema synchronization errors.
///
/// A failed synchronization yields no plan at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// A desired index matches more than one existing index structurally.
    #[error("index on {table}({}) matches more than one existing index", columns.join(", "))]
    AmbiguousIndexMatch {
        /// Table name.
        table: String,
        /// Indexed columns.
        columns: Vec<String>,
    },

    /// The backend cannot perform a required column change.
    #[error("cannot alter {table}.{column}: {reason}")]
    UnsupportedAlter {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Reason.
        reason: String,
    },

    /// The introspector failed.
    #[error("introspection failed: {0}")]
    Introspection(String),

    /// A schema snapshot could not be read or written.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}
