//! Relation declarations between entities.

use super::types::{
    Cascade, CascadeSet, Loading, OrphanedRowAction, ReferentialAction, RelationKind,
};
use serde::{Deserialize, Serialize};

/// One join column of an owning relation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinColumnDef {
    /// Database name of the join column.
    #[serde(default)]
    pub name: Option<String>,
    /// Property path of the referenced column on the target (primary key if absent).
    #[serde(default)]
    pub referenced_column: Option<String>,
    /// Keep an existing column with the same name as declared instead of
    /// overriding its attributes from the referenced column.
    #[serde(default)]
    pub preserve_shared_column: bool,
}

impl JoinColumnDef {
    /// Join column with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Reference a specific target column.
    pub fn referencing(mut self, property: impl Into<String>) -> Self {
        self.referenced_column = Some(property.into());
        self
    }

    /// Keep a shared column's declared attributes.
    pub fn preserve_shared(mut self) -> Self {
        self.preserve_shared_column = true;
        self
    }
}

/// Junction table declaration of an owning many-to-many relation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinTableDef {
    /// Junction table name.
    #[serde(default)]
    pub name: Option<String>,
    /// Columns referencing the owning side.
    #[serde(default)]
    pub join_columns: Vec<JoinColumnDef>,
    /// Columns referencing the inverse side.
    #[serde(default)]
    pub inverse_join_columns: Vec<JoinColumnDef>,
    /// Let both sides share a junction column of the same name instead of
    /// disambiguating it.
    #[serde(default)]
    pub preserve_shared_columns: bool,
}

impl JoinTableDef {
    /// Junction table with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add an owning-side junction column.
    pub fn with_join_column(mut self, column: JoinColumnDef) -> Self {
        self.join_columns.push(column);
        self
    }

    /// Add an inverse-side junction column.
    pub fn with_inverse_join_column(mut self, column: JoinColumnDef) -> Self {
        self.inverse_join_columns.push(column);
        self
    }

    /// Share same-named columns between both sides.
    pub fn preserve_shared_columns(mut self) -> Self {
        self.preserve_shared_columns = true;
        self
    }
}

/// A relation declared on an entity or embeddable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Property name on the declaring type.
    pub property: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Target entity name.
    pub target: String,
    /// Property on the target pointing back (if any).
    #[serde(default)]
    pub inverse: Option<String>,
    /// Cascaded operations.
    #[serde(default)]
    pub cascade: CascadeSet,
    /// Whether the join columns accept null.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Loading mode.
    #[serde(default)]
    pub loading: Loading,
    /// Foreign key on-delete action.
    #[serde(default)]
    pub on_delete: ReferentialAction,
    /// Foreign key on-update action.
    #[serde(default)]
    pub on_update: ReferentialAction,
    /// What happens to children dropped from a one-to-many collection.
    #[serde(default)]
    pub orphaned_row_action: OrphanedRowAction,
    /// Join columns; presence makes a one-to-one the owning side.
    #[serde(default)]
    pub join_columns: Option<Vec<JoinColumnDef>>,
    /// Junction table; presence makes a many-to-many the owning side.
    #[serde(default)]
    pub join_table: Option<JoinTableDef>,
    /// Whether a foreign key constraint is created.
    #[serde(default = "default_true")]
    pub create_foreign_key: bool,
    /// Marks the parent relation of a tree entity.
    #[serde(default)]
    pub tree_parent: bool,
    /// Marks the children relation of a tree entity.
    #[serde(default)]
    pub tree_children: bool,
}

fn default_true() -> bool {
    true
}

impl RelationDef {
    fn new(property: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            kind,
            target: target.into(),
            inverse: None,
            cascade: CascadeSet::none(),
            nullable: true,
            loading: Loading::Lazy,
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
            orphaned_row_action: OrphanedRowAction::Nullify,
            join_columns: None,
            join_table: None,
            create_foreign_key: true,
            tree_parent: false,
            tree_children: false,
        }
    }

    /// Create a many-to-one relation.
    pub fn many_to_one(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::ManyToOne, target)
    }

    /// Create a one-to-many relation (inverse of `inverse` on the target).
    pub fn one_to_many(
        property: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(property, RelationKind::OneToMany, target).with_inverse(inverse)
    }

    /// Create a one-to-one relation.
    pub fn one_to_one(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::OneToOne, target)
    }

    /// Create a many-to-many relation.
    pub fn many_to_many(property: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(property, RelationKind::ManyToMany, target)
    }

    /// Set the inverse property.
    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    /// Set the cascade set.
    pub fn with_cascade(mut self, cascade: CascadeSet) -> Self {
        self.cascade = cascade;
        self
    }

    /// Add one cascaded operation.
    pub fn cascade(mut self, op: Cascade) -> Self {
        self.cascade = self.cascade.with(op);
        self
    }

    /// Make the join columns non-nullable.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Load eagerly.
    pub fn eager(mut self) -> Self {
        self.loading = Loading::Eager;
        self
    }

    /// Set the on-delete action.
    pub fn with_on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the on-update action.
    pub fn with_on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Set the orphaned row action.
    pub fn with_orphaned_row_action(mut self, action: OrphanedRowAction) -> Self {
        self.orphaned_row_action = action;
        self
    }

    /// Declare the default join column (owning side of a one-to-one).
    pub fn with_join_column(mut self) -> Self {
        self.join_columns.get_or_insert_with(Vec::new);
        self
    }

    /// Declare explicit join columns.
    pub fn with_join_columns(mut self, columns: impl IntoIterator<Item = JoinColumnDef>) -> Self {
        self.join_columns = Some(columns.into_iter().collect());
        self
    }

    /// Declare the default junction table (owning side of a many-to-many).
    pub fn with_join_table(mut self) -> Self {
        self.join_table.get_or_insert_with(JoinTableDef::default);
        self
    }

    /// Declare an explicit junction table.
    pub fn with_join_table_def(mut self, join_table: JoinTableDef) -> Self {
        self.join_table = Some(join_table);
        self
    }

    /// Skip the foreign key constraint.
    pub fn without_foreign_key(mut self) -> Self {
        self.create_foreign_key = false;
        self
    }

    /// Mark as the tree parent relation.
    pub fn tree_parent(mut self) -> Self {
        self.tree_parent = true;
        self
    }

    /// Mark as the tree children relation.
    pub fn tree_children(mut self) -> Self {
        self.tree_children = true;
        self
    }

    /// Check if this declaration owns the relation.
    pub fn is_owning(&self) -> bool {
        match self.kind {
            RelationKind::ManyToOne => true,
            RelationKind::OneToMany => false,
            RelationKind::OneToOne => self.join_columns.is_some(),
            RelationKind::ManyToMany => self.join_table.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_many_to_one_is_owning() {
        let rel = RelationDef::many_to_one("author", "User").required();
        assert!(rel.is_owning());
        assert!(!rel.nullable);
    }

    #[test]
    fn test_one_to_one_owning_needs_join_column() {
        let inverse = RelationDef::one_to_one("profile", "Profile").with_inverse("user");
        assert!(!inverse.is_owning());

        let owning = RelationDef::one_to_one("user", "User").with_join_column();
        assert!(owning.is_owning());
    }

    #[test]
    fn test_many_to_many_cascade() {
        let rel = RelationDef::many_to_many("categories", "Category")
            .with_join_table()
            .cascade(Cascade::Insert);
        assert!(rel.is_owning());
        assert!(rel.cascade.contains(Cascade::Insert));
        assert!(!rel.cascade.contains(Cascade::Remove));
    }

    #[test]
    fn test_relation_from_json_defaults() {
        let rel: RelationDef =
            serde_json::from_str(r#"{"property":"author","kind":"many_to_one","target":"User"}"#)
                .unwrap();
        assert!(rel.nullable);
        assert!(rel.create_foreign_key);
        assert_eq!(rel.orphaned_row_action, OrphanedRowAction::Nullify);
    }
}
