//! Desired vs. actual schema comparison.
//!
//! Tables are matched by qualified name and columns by database name.
//! Indices, uniques, checks, exclusions and foreign keys are matched by
//! structure, so renaming a constraint alone never produces an operation.

use super::database::{
    CheckInfo, ColumnInfo, DatabaseSchema, ExclusionInfo, ForeignKeyInfo, IndexInfo, TableInfo,
};
use super::error::SyncError;
use super::plan::{DdlOperation, PlannedOperation};
use super::render::DdlCapabilities;
use crate::config::SyncOptions;
use crate::schema::TableName;
use std::collections::HashSet;
use tracing::debug;

/// Column changes that need an in-place alter or a recreation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ColumnChange {
    retype: bool,
    nullability: bool,
    default: bool,
    generation: bool,
}

impl ColumnChange {
    fn between(desired: &ColumnInfo, actual: &ColumnInfo) -> Self {
        Self {
            retype: desired.type_name != actual.type_name
                || specified_differs(desired.length, actual.length)
                || specified_differs(desired.precision, actual.precision)
                || specified_differs(desired.scale, actual.scale)
                || specified_differs(desired.collation.as_ref(), actual.collation.as_ref()),
            nullability: desired.nullable != actual.nullable,
            default: desired.default != actual.default,
            generation: desired.generated != actual.generated,
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// What the backend lacks to apply this change in place, if anything.
    fn unsupported(&self, capabilities: &DdlCapabilities) -> Option<&'static str> {
        if self.retype && !capabilities.alter_type {
            Some("type changes")
        } else if self.nullability && !capabilities.alter_nullability {
            Some("nullability changes")
        } else if self.default && !capabilities.alter_default {
            Some("default changes")
        } else if self.generation && !capabilities.alter_generation {
            Some("generation changes")
        } else {
            None
        }
    }
}

/// Attributes left unspecified on the desired side are not compared.
fn specified_differs<T: PartialEq>(desired: Option<T>, actual: Option<T>) -> bool {
    desired.is_some() && desired != actual
}

type ColumnKey = (TableName, String);

pub(crate) struct SchemaDiffer<'a> {
    options: &'a SyncOptions,
    capabilities: &'a DdlCapabilities,
    operations: Vec<PlannedOperation>,
    /// Columns whose stored shape changes; constraints on them are re-created.
    reshaped: HashSet<ColumnKey>,
    /// Columns dropped and re-added.
    recreated: HashSet<ColumnKey>,
}

impl<'a> SchemaDiffer<'a> {
    pub(crate) fn new(options: &'a SyncOptions, capabilities: &'a DdlCapabilities) -> Self {
        Self {
            options,
            capabilities,
            operations: Vec::new(),
            reshaped: HashSet::new(),
            recreated: HashSet::new(),
        }
    }

    /// Operations turning `actual` into `desired`, not yet ordered.
    pub(crate) fn diff(
        mut self,
        desired: &DatabaseSchema,
        actual: &DatabaseSchema,
    ) -> Result<Vec<PlannedOperation>, SyncError> {
        let desired = self.normalized(desired);
        let actual = self.normalized(actual);

        let mut matched = Vec::new();
        for table in &desired.tables {
            match actual.table(&table.name()) {
                Some(existing) => matched.push((table, existing)),
                None => self.create_table(table),
            }
        }

        for (desired, actual) in &matched {
            self.diff_columns(desired, actual)?;
        }
        for (desired, actual) in &matched {
            self.diff_primary_key(desired, actual);
            self.diff_indices(desired, actual)?;
            self.diff_uniques(desired, actual);
            self.diff_checks(desired, actual);
            self.diff_exclusions(desired, actual);
            self.diff_foreign_keys(desired, actual);
        }

        if self.options.allow_drops {
            self.drop_tables(&desired, &actual);
        }
        Ok(self.operations)
    }

    fn normalized(&self, schema: &DatabaseSchema) -> DatabaseSchema {
        let mut schema = schema.clone();
        for column in schema.tables.iter_mut().flat_map(|t| t.columns.iter_mut()) {
            column.type_name = self.options.normalize_type(&column.type_name);
        }
        schema
    }

    fn push(&mut self, operation: DdlOperation) {
        debug!(operation = %operation, "schema difference");
        self.operations.push(PlannedOperation::new(operation));
    }

    fn push_recreation(&mut self, operation: DdlOperation) {
        debug!(operation = %operation, "schema difference");
        self.operations.push(PlannedOperation::recreation(operation));
    }

    fn create_table(&mut self, table: &TableInfo) {
        let name = table.name();
        let shell = TableInfo {
            indices: Vec::new(),
            foreign_keys: Vec::new(),
            ..table.clone()
        };
        self.push(DdlOperation::CreateTable(shell));
        for index in &table.indices {
            self.push(DdlOperation::CreateIndex {
                table: name.clone(),
                index: index.clone(),
            });
        }
        for foreign_key in &table.foreign_keys {
            self.push(DdlOperation::AddForeignKey {
                table: name.clone(),
                foreign_key: foreign_key.clone(),
            });
        }
    }

    fn diff_columns(&mut self, desired: &TableInfo, actual: &TableInfo) -> Result<(), SyncError> {
        let table = desired.name();
        for column in &desired.columns {
            let Some(existing) = actual.column(&column.name) else {
                self.push(DdlOperation::AddColumn {
                    table: table.clone(),
                    column: column.clone(),
                });
                continue;
            };
            let change = ColumnChange::between(column, existing);
            if change.is_empty() {
                continue;
            }
            let key = (table.clone(), column.name.clone());

            let Some(missing) = change.unsupported(self.capabilities) else {
                if change.retype {
                    self.reshaped.insert(key);
                }
                self.push(DdlOperation::AlterColumn {
                    table: table.clone(),
                    from: existing.clone(),
                    to: column.clone(),
                });
                continue;
            };

            if desired.is_primary(&column.name) || actual.is_primary(&column.name) {
                return Err(unsupported(
                    &table,
                    &column.name,
                    format!(
                        "backend does not support {missing} and primary key columns \
                         cannot be recreated"
                    ),
                ));
            }
            if !self.options.allow_drops {
                return Err(unsupported(
                    &table,
                    &column.name,
                    format!("backend does not support {} and drops are disabled", missing),
                ));
            }
            self.recreated.insert(key.clone());
            self.reshaped.insert(key);
            self.push_recreation(DdlOperation::DropColumn {
                table: table.clone(),
                column: column.name.clone(),
            });
            self.push_recreation(DdlOperation::AddColumn {
                table: table.clone(),
                column: column.clone(),
            });
        }

        if self.options.allow_drops {
            for column in &actual.columns {
                if desired.column(&column.name).is_none() {
                    self.push(DdlOperation::DropColumn {
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn diff_primary_key(&mut self, desired: &TableInfo, actual: &TableInfo) {
        let wanted = desired.primary_key.as_ref().map(|pk| &pk.columns);
        let present = actual.primary_key.as_ref().map(|pk| &pk.columns);
        if wanted != present {
            self.push(DdlOperation::UpdatePrimaryKey {
                table: desired.name(),
                from: actual.primary_key.clone(),
                to: desired.primary_key.clone(),
            });
        }
    }

    fn is_recreated(&self, table: &TableName, columns: &[String]) -> bool {
        columns
            .iter()
            .any(|c| self.recreated.contains(&(table.clone(), c.clone())))
    }

    fn diff_indices(&mut self, desired: &TableInfo, actual: &TableInfo) -> Result<(), SyncError> {
        let table = desired.name();
        let mut taken = vec![false; actual.indices.len()];
        for index in &desired.indices {
            let candidates: Vec<usize> = actual
                .indices
                .iter()
                .enumerate()
                .filter(|(i, existing)| !taken[*i] && same_index(index, existing))
                .map(|(i, _)| i)
                .collect();
            match candidates.as_slice() {
                [] => self.push(DdlOperation::CreateIndex {
                    table: table.clone(),
                    index: index.clone(),
                }),
                [found] => {
                    taken[*found] = true;
                    if self.is_recreated(&table, &index.columns) {
                        self.push(DdlOperation::DropIndex {
                            table: table.clone(),
                            index: actual.indices[*found].clone(),
                        });
                        self.push(DdlOperation::CreateIndex {
                            table: table.clone(),
                            index: index.clone(),
                        });
                    }
                }
                _ => {
                    return Err(SyncError::AmbiguousIndexMatch {
                        table: table.to_string(),
                        columns: index.columns.clone(),
                    })
                }
            }
        }
        for (existing, _) in actual.indices.iter().zip(&taken).filter(|(_, t)| !**t) {
            self.push(DdlOperation::DropIndex {
                table: table.clone(),
                index: existing.clone(),
            });
        }
        Ok(())
    }

    fn diff_uniques(&mut self, desired: &TableInfo, actual: &TableInfo) {
        let table = desired.name();
        let mut taken = vec![false; actual.uniques.len()];
        for unique in &desired.uniques {
            let found = actual
                .uniques
                .iter()
                .enumerate()
                .position(|(i, existing)| {
                    !taken[i] && same_columns(&unique.columns, &existing.columns)
                });
            match found {
                None => self.push(DdlOperation::AddUnique {
                    table: table.clone(),
                    unique: unique.clone(),
                }),
                Some(i) => {
                    taken[i] = true;
                    if self.is_recreated(&table, &unique.columns) {
                        self.push(DdlOperation::DropUnique {
                            table: table.clone(),
                            unique: actual.uniques[i].clone(),
                        });
                        self.push(DdlOperation::AddUnique {
                            table: table.clone(),
                            unique: unique.clone(),
                        });
                    }
                }
            }
        }
        for (existing, _) in actual.uniques.iter().zip(&taken).filter(|(_, t)| !**t) {
            self.push(DdlOperation::DropUnique {
                table: table.clone(),
                unique: existing.clone(),
            });
        }
    }

    fn diff_checks(&mut self, desired: &TableInfo, actual: &TableInfo) {
        let table = desired.name();
        let (added, removed) = by_expression(&desired.checks, &actual.checks, |c: &CheckInfo| {
            c.expression.as_str()
        });
        for check in added {
            self.push(DdlOperation::AddCheck {
                table: table.clone(),
                check,
            });
        }
        for check in removed {
            self.push(DdlOperation::DropCheck {
                table: table.clone(),
                check,
            });
        }
    }

    fn diff_exclusions(&mut self, desired: &TableInfo, actual: &TableInfo) {
        let table = desired.name();
        let (added, removed) =
            by_expression(&desired.exclusions, &actual.exclusions, |x: &ExclusionInfo| {
                x.expression.as_str()
            });
        for exclusion in added {
            self.push(DdlOperation::AddExclusion {
                table: table.clone(),
                exclusion,
            });
        }
        for exclusion in removed {
            self.push(DdlOperation::DropExclusion {
                table: table.clone(),
                exclusion,
            });
        }
    }

    fn diff_foreign_keys(&mut self, desired: &TableInfo, actual: &TableInfo) {
        let table = desired.name();
        let mut taken = vec![false; actual.foreign_keys.len()];
        for foreign_key in &desired.foreign_keys {
            let found = actual
                .foreign_keys
                .iter()
                .enumerate()
                .position(|(i, existing)| !taken[i] && same_foreign_key(foreign_key, existing));
            match found {
                None => self.push(DdlOperation::AddForeignKey {
                    table: table.clone(),
                    foreign_key: foreign_key.clone(),
                }),
                Some(i) => {
                    taken[i] = true;
                    if self.touches_reshaped(&table, foreign_key) {
                        self.push(DdlOperation::DropForeignKey {
                            table: table.clone(),
                            foreign_key: actual.foreign_keys[i].clone(),
                        });
                        self.push(DdlOperation::AddForeignKey {
                            table: table.clone(),
                            foreign_key: foreign_key.clone(),
                        });
                    }
                }
            }
        }
        for (existing, _) in actual.foreign_keys.iter().zip(&taken).filter(|(_, t)| !**t) {
            self.push(DdlOperation::DropForeignKey {
                table: table.clone(),
                foreign_key: existing.clone(),
            });
        }
    }

    fn touches_reshaped(&self, table: &TableName, foreign_key: &ForeignKeyInfo) -> bool {
        let referenced = foreign_key.referenced();
        let local = foreign_key
            .columns
            .iter()
            .map(|c| (table.clone(), c.clone()));
        let remote = foreign_key
            .referenced_columns
            .iter()
            .map(|c| (referenced.clone(), c.clone()));
        local.chain(remote).any(|key| self.reshaped.contains(&key))
    }

    /// Drop tables missing from `desired`, releasing foreign keys between them first.
    fn drop_tables(&mut self, desired: &DatabaseSchema, actual: &DatabaseSchema) {
        let dropped: Vec<&TableInfo> = actual
            .tables
            .iter()
            .filter(|t| desired.table(&t.name()).is_none())
            .collect();
        let names: HashSet<TableName> = dropped.iter().map(|t| t.name()).collect();

        for table in &dropped {
            let name = table.name();
            for foreign_key in &table.foreign_keys {
                let referenced = foreign_key.referenced();
                if referenced != name && names.contains(&referenced) {
                    self.push(DdlOperation::DropForeignKey {
                        table: name.clone(),
                        foreign_key: foreign_key.clone(),
                    });
                }
            }
        }
        for table in dropped {
            self.push(DdlOperation::DropTable { table: table.name() });
        }
    }
}

fn unsupported(table: &TableName, column: &str, reason: String) -> SyncError {
    SyncError::UnsupportedAlter {
        table: table.to_string(),
        column: column.to_string(),
        reason,
    }
}

fn same_columns(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

fn same_index(a: &IndexInfo, b: &IndexInfo) -> bool {
    a.columns == b.columns
        && a.unique == b.unique
        && a.spatial == b.spatial
        && a.fulltext == b.fulltext
        && a.where_clause == b.where_clause
}

fn same_foreign_key(a: &ForeignKeyInfo, b: &ForeignKeyInfo) -> bool {
    a.columns == b.columns
        && a.referenced() == b.referenced()
        && a.referenced_columns == b.referenced_columns
        && a.on_delete.eq_ignore_ascii_case(&b.on_delete)
        && a.on_update.eq_ignore_ascii_case(&b.on_update)
}

/// Constraints to add and to drop, matched by expression.
fn by_expression<T: Clone>(
    desired: &[T],
    actual: &[T],
    expression: impl Fn(&T) -> &str,
) -> (Vec<T>, Vec<T>) {
    let mut taken = vec![false; actual.len()];
    let mut added = Vec::new();
    for item in desired {
        let found = actual
            .iter()
            .enumerate()
            .position(|(i, existing)| !taken[i] && expression(existing) == expression(item));
        match found {
            Some(i) => taken[i] = true,
            None => added.push(item.clone()),
        }
    }
    let removed = actual
        .iter()
        .zip(&taken)
        .filter(|(_, t)| !**t)
        .map(|(item, _)| item.clone())
        .collect();
    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name_length: u32) -> TableInfo {
        TableInfo::new(&TableName::new(None, "user"))
            .with_column(ColumnInfo::new("id", "integer").generated("increment"))
            .with_column(ColumnInfo::new("name", "varchar").with_length(name_length))
            .with_primary_key("PK_user", &["id"])
    }

    fn post() -> TableInfo {
        let mut post = TableInfo::new(&TableName::new(None, "post"))
            .with_column(ColumnInfo::new("id", "integer").generated("increment"))
            .with_column(ColumnInfo::new("authorId", "integer").nullable())
            .with_primary_key("PK_post", &["id"]);
        post.foreign_keys.push(ForeignKeyInfo {
            name: "FK_post_author".into(),
            columns: vec!["authorId".into()],
            referenced_schema: None,
            referenced_table: "user".into(),
            referenced_columns: vec!["id".into()],
            on_delete: "NO ACTION".into(),
            on_update: "NO ACTION".into(),
        });
        post.indices.push(IndexInfo {
            name: "IDX_post_author".into(),
            columns: vec!["authorId".into()],
            ..IndexInfo::default()
        });
        post
    }

    fn diff(
        desired: &DatabaseSchema,
        actual: &DatabaseSchema,
    ) -> Result<Vec<DdlOperation>, SyncError> {
        diff_with(desired, actual, &SyncOptions::default(), &DdlCapabilities::default())
    }

    fn diff_with(
        desired: &DatabaseSchema,
        actual: &DatabaseSchema,
        options: &SyncOptions,
        capabilities: &DdlCapabilities,
    ) -> Result<Vec<DdlOperation>, SyncError> {
        Ok(SchemaDiffer::new(options, capabilities)
            .diff(desired, actual)?
            .into_iter()
            .map(|op| op.operation)
            .collect())
    }

    #[test]
    fn test_identical_schemas() {
        let schema = DatabaseSchema::new().with_table(user(255)).with_table(post());
        assert!(diff(&schema, &schema).unwrap().is_empty());
    }

    #[test]
    fn test_new_table_splits_indices_and_foreign_keys() {
        let desired = DatabaseSchema::new().with_table(user(255)).with_table(post());
        let actual = DatabaseSchema::new().with_table(user(255));
        let ops = diff(&desired, &actual).unwrap();

        assert_eq!(ops.len(), 3);
        let DdlOperation::CreateTable(created) = &ops[0] else {
            panic!("expected create table, got {:?}", ops[0]);
        };
        assert!(created.indices.is_empty());
        assert!(created.foreign_keys.is_empty());
        assert!(matches!(ops[1], DdlOperation::CreateIndex { .. }));
        assert!(matches!(ops[2], DdlOperation::AddForeignKey { .. }));
    }

    #[test]
    fn test_length_change_is_one_alter() {
        let desired = DatabaseSchema::new().with_table(user(100));
        let actual = DatabaseSchema::new().with_table(user(50));
        let ops = diff(&desired, &actual).unwrap();

        assert_eq!(ops.len(), 1);
        let DdlOperation::AlterColumn { from, to, .. } = &ops[0] else {
            panic!("expected alter column, got {:?}", ops[0]);
        };
        assert_eq!(from.length, Some(50));
        assert_eq!(to.length, Some(100));
    }

    #[test]
    fn test_unspecified_length_is_not_compared() {
        let mut desired = user(255);
        desired.columns[1].length = None;
        let ops = diff(
            &DatabaseSchema::new().with_table(desired),
            &DatabaseSchema::new().with_table(user(255)),
        )
        .unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_type_aliases_are_normalized() {
        let mut actual = user(255);
        actual.columns[0].type_name = "INT4".into();
        let options = SyncOptions::default().with_type_alias("int4", "integer");
        let ops = diff_with(
            &DatabaseSchema::new().with_table(user(255)),
            &DatabaseSchema::new().with_table(actual),
            &options,
            &DdlCapabilities::default(),
        )
        .unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_renamed_index_is_not_recreated() {
        let mut actual = post();
        actual.indices[0].name = "post_author_idx".into();
        actual.foreign_keys[0].name = "post_author_fkey".into();
        let ops = diff(
            &DatabaseSchema::new().with_table(user(255)).with_table(post()),
            &DatabaseSchema::new().with_table(user(255)).with_table(actual),
        )
        .unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn test_ambiguous_index_match() {
        let mut actual = post();
        let mut duplicate = actual.indices[0].clone();
        duplicate.name = "IDX_post_author_2".into();
        actual.indices.push(duplicate);

        let err = diff(
            &DatabaseSchema::new().with_table(user(255)).with_table(post()),
            &DatabaseSchema::new().with_table(user(255)).with_table(actual),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SyncError::AmbiguousIndexMatch {
                table: "post".into(),
                columns: vec!["authorId".into()],
            }
        );
    }

    #[test]
    fn test_retyped_referenced_column_reattaches_foreign_key() {
        let mut desired_user = user(255);
        desired_user.columns[0].type_name = "bigint".into();
        let mut desired_post = post();
        desired_post.columns[1].type_name = "bigint".into();

        let ops = diff(
            &DatabaseSchema::new().with_table(desired_user).with_table(desired_post),
            &DatabaseSchema::new().with_table(user(255)).with_table(post()),
        )
        .unwrap();

        let drops = ops
            .iter()
            .filter(|op| matches!(op, DdlOperation::DropForeignKey { .. }))
            .count();
        let adds = ops
            .iter()
            .filter(|op| matches!(op, DdlOperation::AddForeignKey { .. }))
            .count();
        let alters = ops
            .iter()
            .filter(|op| matches!(op, DdlOperation::AlterColumn { .. }))
            .count();
        assert_eq!((drops, adds, alters), (1, 1, 2));
    }

    #[test]
    fn test_unsupported_alter_recreates_column() {
        let mut desired = post();
        desired.columns[1].nullable = false;
        let capabilities = DdlCapabilities {
            alter_nullability: false,
            ..DdlCapabilities::default()
        };
        let ops = diff_with(
            &DatabaseSchema::new().with_table(user(255)).with_table(desired),
            &DatabaseSchema::new().with_table(user(255)).with_table(post()),
            &SyncOptions::default(),
            &capabilities,
        )
        .unwrap();

        let names: Vec<String> = ops.iter().map(|op| op.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "drop column post.authorId",
                "add column post.authorId",
                "drop index IDX_post_author on post",
                "create index IDX_post_author on post",
                "drop foreign key FK_post_author on post",
                "add foreign key FK_post_author on post",
            ]
        );
    }

    #[test]
    fn test_unsupported_alter_without_drops() {
        let mut desired = user(255);
        desired.columns[1].type_name = "text".into();
        let capabilities = DdlCapabilities {
            alter_type: false,
            ..DdlCapabilities::default()
        };
        let err = diff_with(
            &DatabaseSchema::new().with_table(desired),
            &DatabaseSchema::new().with_table(user(255)),
            &SyncOptions::without_drops(),
            &capabilities,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedAlter { column, .. } if column == "name"));
    }

    #[test]
    fn test_without_drops_keeps_tables_and_columns() {
        let mut actual = user(255);
        actual.columns.push(ColumnInfo::new("legacy", "text").nullable());
        let actual = DatabaseSchema::new()
            .with_table(actual)
            .with_table(TableInfo::new(&TableName::new(None, "audit")));
        let desired = DatabaseSchema::new().with_table(user(255));

        let kept = diff_with(
            &desired,
            &actual,
            &SyncOptions::without_drops(),
            &DdlCapabilities::default(),
        )
        .unwrap();
        assert!(kept.is_empty());

        let dropped = diff(&desired, &actual).unwrap();
        let names: Vec<String> = dropped.iter().map(|op| op.to_string()).collect();
        assert_eq!(names, vec!["drop column user.legacy", "drop table audit"]);
    }

    #[test]
    fn test_primary_key_change() {
        let desired = TableInfo::new(&TableName::new(None, "tag"))
            .with_column(ColumnInfo::new("id", "integer"))
            .with_column(ColumnInfo::new("code", "varchar"))
            .with_primary_key("PK_tag", &["code"]);
        let actual = TableInfo::new(&TableName::new(None, "tag"))
            .with_column(ColumnInfo::new("id", "integer"))
            .with_column(ColumnInfo::new("code", "varchar"))
            .with_primary_key("PK_tag", &["id"]);
        let ops = diff(
            &DatabaseSchema::new().with_table(desired),
            &DatabaseSchema::new().with_table(actual),
        )
        .unwrap();
        assert!(matches!(&ops[..], [DdlOperation::UpdatePrimaryKey { .. }]));
    }
}
