//! DDL rendering.

use super::database::{ColumnInfo, TableInfo};
use super::error::SyncError;
use super::plan::DdlOperation;
use crate::schema::TableName;

/// What a backend can change in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdlCapabilities {
    /// Change type, length, precision, scale or collation of a column.
    pub alter_type: bool,
    /// Change nullability of a column.
    pub alter_nullability: bool,
    /// Change the default of a column.
    pub alter_default: bool,
    /// Change the generation strategy of a column.
    pub alter_generation: bool,
    /// DDL runs inside transactions and rolls back with them.
    pub transactional: bool,
}

impl Default for DdlCapabilities {
    fn default() -> Self {
        Self {
            alter_type: true,
            alter_nullability: true,
            alter_default: true,
            alter_generation: true,
            transactional: true,
        }
    }
}

/// Turns DDL operations into backend statements.
pub trait DdlRenderer {
    /// Column changes the backend supports in place.
    fn capabilities(&self) -> DdlCapabilities;

    /// Statements for one operation.
    fn render(&self, operation: &DdlOperation) -> Result<Vec<String>, SyncError>;
}

/// Renders standard SQL with double-quoted identifiers.
///
/// Generation strategy changes cannot be expressed and are reported as
/// unsupported, so columns changing strategy are recreated.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiRenderer;

impl AnsiRenderer {
    fn column_definition(&self, column: &ColumnInfo) -> String {
        let mut sql = format!("{} {}", quote(&column.name), column_type(column));
        if column.generated.as_deref() == Some("increment") {
            sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if let Some(collation) = &column.collation {
            sql.push_str(&format!(" COLLATE {}", quote(collation)));
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        sql
    }

    fn create_table(&self, table: &TableInfo) -> String {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        if let Some(pk) = &table.primary_key {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quote(&pk.name),
                column_list(&pk.columns)
            ));
        }
        for unique in &table.uniques {
            parts.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                quote(&unique.name),
                column_list(&unique.columns)
            ));
        }
        for check in &table.checks {
            parts.push(format!("CONSTRAINT {} CHECK ({})", quote(&check.name), check.expression));
        }
        for exclusion in &table.exclusions {
            parts.push(format!(
                "CONSTRAINT {} EXCLUDE {}",
                quote(&exclusion.name),
                exclusion.expression
            ));
        }
        format!("CREATE TABLE {} ({})", table_name(&table.name()), parts.join(", "))
    }
}

impl DdlRenderer for AnsiRenderer {
    fn capabilities(&self) -> DdlCapabilities {
        DdlCapabilities {
            alter_generation: false,
            ..DdlCapabilities::default()
        }
    }

    fn render(&self, operation: &DdlOperation) -> Result<Vec<String>, SyncError> {
        let alter = |table: &TableName| format!("ALTER TABLE {}", table_name(table));
        let statements = match operation {
            DdlOperation::CreateTable(table) => vec![self.create_table(table)],
            DdlOperation::DropTable { table } => vec![format!("DROP TABLE {}", table_name(table))],
            DdlOperation::AddColumn { table, column } => vec![format!(
                "{} ADD COLUMN {}",
                alter(table),
                self.column_definition(column)
            )],
            DdlOperation::AlterColumn { table, from, to } => {
                if from.generated != to.generated {
                    return Err(SyncError::UnsupportedAlter {
                        table: table.to_string(),
                        column: to.name.clone(),
                        reason: "generation strategy cannot be altered".to_string(),
                    });
                }
                let column = format!("{} ALTER COLUMN {}", alter(table), quote(&to.name));
                let mut statements = Vec::new();
                if column_type(from) != column_type(to) || from.collation != to.collation {
                    statements.push(format!("{} TYPE {}", column, column_type(to)));
                }
                if from.nullable != to.nullable {
                    let action = if to.nullable { "DROP" } else { "SET" };
                    statements.push(format!("{} {} NOT NULL", column, action));
                }
                if from.default != to.default {
                    match &to.default {
                        Some(default) => {
                            statements.push(format!("{} SET DEFAULT {}", column, default))
                        }
                        None => statements.push(format!("{} DROP DEFAULT", column)),
                    }
                }
                statements
            }
            DdlOperation::DropColumn { table, column } => {
                vec![format!("{} DROP COLUMN {}", alter(table), quote(column))]
            }
            DdlOperation::UpdatePrimaryKey { table, from, to } => {
                let mut statements = Vec::new();
                if let Some(pk) = from {
                    statements.push(format!(
                        "{} DROP CONSTRAINT {}",
                        alter(table),
                        quote(&pk.name)
                    ));
                }
                if let Some(pk) = to {
                    statements.push(format!(
                        "{} ADD CONSTRAINT {} PRIMARY KEY ({})",
                        alter(table),
                        quote(&pk.name),
                        column_list(&pk.columns)
                    ));
                }
                statements
            }
            DdlOperation::CreateIndex { table, index } => {
                if index.spatial || index.fulltext {
                    return Err(SyncError::UnsupportedAlter {
                        table: table.to_string(),
                        column: index.columns.join(", "),
                        reason: "spatial and fulltext indices have no standard form".to_string(),
                    });
                }
                let mut sql = format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    quote(&index.name),
                    table_name(table),
                    column_list(&index.columns)
                );
                if let Some(predicate) = &index.where_clause {
                    sql.push_str(&format!(" WHERE {}", predicate));
                }
                vec![sql]
            }
            DdlOperation::DropIndex { index, .. } => {
                vec![format!("DROP INDEX {}", quote(&index.name))]
            }
            DdlOperation::AddUnique { table, unique } => vec![format!(
                "{} ADD CONSTRAINT {} UNIQUE ({})",
                alter(table),
                quote(&unique.name),
                column_list(&unique.columns)
            )],
            DdlOperation::AddCheck { table, check } => vec![format!(
                "{} ADD CONSTRAINT {} CHECK ({})",
                alter(table),
                quote(&check.name),
                check.expression
            )],
            DdlOperation::AddExclusion { table, exclusion } => vec![format!(
                "{} ADD CONSTRAINT {} EXCLUDE {}",
                alter(table),
                quote(&exclusion.name),
                exclusion.expression
            )],
            DdlOperation::AddForeignKey { table, foreign_key } => vec![format!(
                "{} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) \
                 ON DELETE {} ON UPDATE {}",
                alter(table),
                quote(&foreign_key.name),
                column_list(&foreign_key.columns),
                table_name(&foreign_key.referenced()),
                column_list(&foreign_key.referenced_columns),
                foreign_key.on_delete,
                foreign_key.on_update
            )],
            DdlOperation::DropUnique { table, unique } => {
                vec![format!("{} DROP CONSTRAINT {}", alter(table), quote(&unique.name))]
            }
            DdlOperation::DropCheck { table, check } => {
                vec![format!("{} DROP CONSTRAINT {}", alter(table), quote(&check.name))]
            }
            DdlOperation::DropExclusion { table, exclusion } => {
                vec![format!("{} DROP CONSTRAINT {}", alter(table), quote(&exclusion.name))]
            }
            DdlOperation::DropForeignKey { table, foreign_key } => {
                vec![format!("{} DROP CONSTRAINT {}", alter(table), quote(&foreign_key.name))]
            }
        };
        Ok(statements)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn table_name(table: &TableName) -> String {
    match &table.schema {
        Some(schema) => format!("{}.{}", quote(schema), quote(&table.name)),
        None => quote(&table.name),
    }
}

fn column_list(columns: &[String]) -> String {
    columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

fn column_type(column: &ColumnInfo) -> String {
    match (column.length, column.precision, column.scale) {
        (Some(length), _, _) => format!("{}({})", column.type_name, length),
        (None, Some(precision), Some(scale)) => {
            format!("{}({}, {})", column.type_name, precision, scale)
        }
        (None, Some(precision), None) => format!("{}({})", column.type_name, precision),
        _ => column.type_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::database::{ForeignKeyInfo, IndexInfo};

    fn user() -> TableName {
        TableName::new(None, "user")
    }

    #[test]
    fn test_create_table() {
        let table = TableInfo::new(&TableName::new(Some("app".into()), "user"))
            .with_column(ColumnInfo::new("id", "integer").generated("increment"))
            .with_column(ColumnInfo::new("name", "varchar").with_length(100).nullable())
            .with_primary_key("PK_user", &["id"]);
        let sql = AnsiRenderer.render(&DdlOperation::CreateTable(table)).unwrap();
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"app\".\"user\" \
                 (\"id\" integer GENERATED BY DEFAULT AS IDENTITY NOT NULL, \
                 \"name\" varchar(100), CONSTRAINT \"PK_user\" PRIMARY KEY (\"id\"))"
            ]
        );
    }

    #[test]
    fn test_alter_column() {
        let sql = AnsiRenderer
            .render(&DdlOperation::AlterColumn {
                table: user(),
                from: ColumnInfo::new("name", "varchar").with_length(50).nullable(),
                to: ColumnInfo::new("name", "varchar").with_length(100).with_default("''"),
            })
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"user\" ALTER COLUMN \"name\" TYPE varchar(100)",
                "ALTER TABLE \"user\" ALTER COLUMN \"name\" SET NOT NULL",
                "ALTER TABLE \"user\" ALTER COLUMN \"name\" SET DEFAULT ''",
            ]
        );
    }

    #[test]
    fn test_generation_change_is_unsupported() {
        let err = AnsiRenderer
            .render(&DdlOperation::AlterColumn {
                table: user(),
                from: ColumnInfo::new("id", "integer"),
                to: ColumnInfo::new("id", "integer").generated("increment"),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedAlter { .. }));
        assert!(!AnsiRenderer.capabilities().alter_generation);
    }

    #[test]
    fn test_foreign_key_and_index() {
        let foreign_key = ForeignKeyInfo {
            name: "FK_post_author".into(),
            columns: vec!["authorId".into()],
            referenced_schema: None,
            referenced_table: "user".into(),
            referenced_columns: vec!["id".into()],
            on_delete: "CASCADE".into(),
            on_update: "NO ACTION".into(),
        };
        let post = TableName::new(None, "post");
        let sql = AnsiRenderer
            .render(&DdlOperation::AddForeignKey {
                table: post.clone(),
                foreign_key,
            })
            .unwrap();
        assert_eq!(
            sql[0],
            "ALTER TABLE \"post\" ADD CONSTRAINT \"FK_post_author\" FOREIGN KEY (\"authorId\") \
             REFERENCES \"user\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION"
        );

        let index = IndexInfo {
            name: "IDX_live".into(),
            columns: vec!["authorId".into()],
            unique: true,
            where_clause: Some("\"deletedAt\" IS NULL".into()),
            ..IndexInfo::default()
        };
        let sql = AnsiRenderer
            .render(&DdlOperation::CreateIndex { table: post, index })
            .unwrap();
        assert_eq!(
            sql[0],
            "CREATE UNIQUE INDEX \"IDX_live\" ON \"post\" (\"authorId\") \
             WHERE \"deletedAt\" IS NULL"
        );
    }
}
