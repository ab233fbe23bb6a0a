//! Projection of the schema graph into the backend-neutral shape.

use super::database::{
    CheckInfo, ColumnInfo, DatabaseSchema, ExclusionInfo, ForeignKeyInfo, IndexInfo,
    PrimaryKeyInfo, TableInfo, UniqueInfo,
};
use crate::metadata::{DefaultValue, InheritanceStrategy};
use crate::schema::{Column, EntitySchema, SchemaGraph, TableName};
use std::collections::HashMap;

impl SchemaGraph {
    /// Tables the schema graph expects to find in the database.
    ///
    /// Members of a single-table hierarchy share the root's table; columns
    /// declared below the root accept null there. Class-table children get a
    /// copy of the primary key columns in their own table.
    pub fn to_database_schema(&self) -> DatabaseSchema {
        let mut tables: Vec<TableInfo> = Vec::new();
        let mut slots: HashMap<TableName, usize> = HashMap::new();

        for entity in self.entities().filter(|e| self.owns_table(e)) {
            slots.insert(entity.table.clone(), tables.len());
            tables.push(self.table_shell(entity));
        }

        for entity in self.entities() {
            for column in &entity.columns {
                let table = &self.entity(column.table_owner).table;
                let Some(&slot) = slots.get(table) else {
                    continue;
                };
                let info = &mut tables[slot];
                if info.column(&column.database_name).is_some() {
                    continue;
                }
                let mut shape = column_info(column);
                if entity.inheritance == Some(InheritanceStrategy::SingleTable)
                    && column.declared_by != column.table_owner
                {
                    shape.nullable = true;
                }
                info.columns.push(shape);
            }

            for foreign_key in &entity.foreign_keys {
                let Some(&slot) = slots.get(&foreign_key.table) else {
                    continue;
                };
                let info = &mut tables[slot];
                if !info.foreign_keys.iter().any(|f| f.name == foreign_key.name) {
                    info.foreign_keys.push(ForeignKeyInfo {
                        name: foreign_key.name.clone(),
                        columns: foreign_key.columns.clone(),
                        referenced_schema: foreign_key.referenced_table.schema.clone(),
                        referenced_table: foreign_key.referenced_table.name.clone(),
                        referenced_columns: foreign_key.referenced_columns.clone(),
                        on_delete: foreign_key.on_delete.as_sql().to_string(),
                        on_update: foreign_key.on_update.as_sql().to_string(),
                    });
                }
            }
            for index in &entity.indices {
                let Some(&slot) = slots.get(&index.table) else {
                    continue;
                };
                let info = &mut tables[slot];
                if !info.indices.iter().any(|i| i.name == index.name) {
                    info.indices.push(IndexInfo {
                        name: index.name.clone(),
                        columns: index.columns.clone(),
                        unique: index.unique,
                        spatial: index.spatial,
                        fulltext: index.fulltext,
                        where_clause: index.where_clause.clone(),
                    });
                }
            }
            for unique in &entity.uniques {
                let Some(&slot) = slots.get(&unique.table) else {
                    continue;
                };
                let info = &mut tables[slot];
                if !info.uniques.iter().any(|u| u.name == unique.name) {
                    info.uniques.push(UniqueInfo {
                        name: unique.name.clone(),
                        columns: unique.columns.clone(),
                    });
                }
            }
            for check in &entity.checks {
                let Some(&slot) = slots.get(&check.table) else {
                    continue;
                };
                let info = &mut tables[slot];
                if !info.checks.iter().any(|c| c.name == check.name) {
                    info.checks.push(CheckInfo {
                        name: check.name.clone(),
                        expression: check.expression.clone(),
                    });
                }
            }
            for exclusion in &entity.exclusions {
                let Some(&slot) = slots.get(&exclusion.table) else {
                    continue;
                };
                let info = &mut tables[slot];
                if !info.exclusions.iter().any(|x| x.name == exclusion.name) {
                    info.exclusions.push(ExclusionInfo {
                        name: exclusion.name.clone(),
                        expression: exclusion.expression.clone(),
                    });
                }
            }
        }

        DatabaseSchema { tables }
    }

    /// Table with its primary key, and key copies for class-table children.
    fn table_shell(&self, entity: &EntitySchema) -> TableInfo {
        let mut info = TableInfo::new(&entity.table);
        let primary: Vec<String> = entity
            .primary_columns()
            .map(|c| c.database_name.clone())
            .collect();
        if !primary.is_empty() {
            info.primary_key = Some(PrimaryKeyInfo {
                name: entity.primary_key_name.clone(),
                columns: primary,
            });
        }
        if entity.is_multi_table() {
            for column in entity.primary_columns() {
                info.columns.push(ColumnInfo {
                    generated: None,
                    ..column_info(column)
                });
            }
        }
        info
    }
}

fn column_info(column: &Column) -> ColumnInfo {
    ColumnInfo {
        name: column.database_name.clone(),
        type_name: column.column_type.name().to_string(),
        length: column.length,
        precision: column.precision,
        scale: column.scale,
        nullable: column.nullable,
        default: column.default.as_ref().map(DefaultValue::to_sql),
        generated: column.generation.name().map(str::to_string),
        collation: column.collation.clone(),
    }
}
