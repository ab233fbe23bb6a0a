//! Naming strategies for tables, columns and constraints.

use heck::{ToLowerCamelCase, ToSnakeCase};

/// Length of the hash part of generated constraint names.
const HASH_NAME_LENGTH: usize = 27;

/// Derives database names from entity and property names.
pub trait NamingStrategy: Send + Sync {
    /// Table name of an entity.
    fn table_name(&self, entity_name: &str, explicit: Option<&str>) -> String;

    /// Column name of a property, prefixed by the enclosing embeds.
    fn column_name(&self, property: &str, explicit: Option<&str>, prefixes: &[String]) -> String;

    /// Join column name of an owning relation.
    fn join_column_name(&self, relation_property: &str, referenced_column: &str) -> String;

    /// Junction table name of an owning many-to-many relation.
    fn join_table_name(&self, first_table: &str, second_table: &str, first_property: &str)
        -> String;

    /// Junction column name referencing `column` of `table`.
    fn join_table_column_name(&self, table: &str, column: &str) -> String;

    /// Disambiguated junction column name when both sides produce the same one.
    fn join_table_column_duplication_suffix(&self, column: &str, index: usize) -> String {
        format!("{column}_{index}")
    }

    /// Closure table name of a closure-table tree entity.
    fn closure_junction_table_name(&self, table: &str) -> String {
        format!("{table}_closure")
    }

    /// Closure table column name for the ancestor or descendant side.
    fn closure_column_name(&self, column: &str, ancestor: bool) -> String {
        if ancestor {
            format!("{column}_ancestor")
        } else {
            format!("{column}_descendant")
        }
    }

    /// Discriminator value of an entity that declares none.
    fn discriminator_value(&self, entity_name: &str) -> String {
        entity_name.to_string()
    }

    /// Primary key constraint name.
    fn primary_key_name(&self, table: &str, columns: &[String]) -> String {
        hashed_name("PK_", table, columns)
    }

    /// Foreign key constraint name.
    fn foreign_key_name(
        &self,
        table: &str,
        columns: &[String],
        _referenced_table: &str,
        _referenced_columns: &[String],
    ) -> String {
        hashed_name("FK_", table, columns)
    }

    /// Index name.
    fn index_name(&self, table: &str, columns: &[String], where_clause: Option<&str>) -> String {
        let mut parts = columns.to_vec();
        if let Some(predicate) = where_clause {
            parts.push(predicate.to_string());
        }
        hashed_name("IDX_", table, &parts)
    }

    /// Unique constraint name.
    fn unique_constraint_name(&self, table: &str, columns: &[String]) -> String {
        hashed_name("UQ_", table, columns)
    }

    /// Unique constraint name of an owning one-to-one relation.
    fn relation_constraint_name(&self, table: &str, columns: &[String]) -> String {
        hashed_name("REL_", table, columns)
    }

    /// Check constraint name.
    fn check_constraint_name(&self, table: &str, expression: &str) -> String {
        hashed_name("CHK_", table, &[expression.to_string()])
    }

    /// Exclusion constraint name.
    fn exclusion_constraint_name(&self, table: &str, expression: &str) -> String {
        hashed_name("XCL_", table, &[expression.to_string()])
    }
}

/// Prefix plus the first hex characters of a hash over the table and sorted parts.
pub fn hashed_name(prefix: &str, table: &str, parts: &[String]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort();
    let key = format!("{}_{}", table, sorted.join("_"));
    let digest = hex::encode(blake3::hash(key.as_bytes()).as_bytes());
    format!("{prefix}{}", &digest[..HASH_NAME_LENGTH])
}

/// camelCase columns, snake_case tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamingStrategy;

impl NamingStrategy for DefaultNamingStrategy {
    fn table_name(&self, entity_name: &str, explicit: Option<&str>) -> String {
        match explicit {
            Some(name) => name.to_string(),
            None => entity_name.to_snake_case(),
        }
    }

    fn column_name(&self, property: &str, explicit: Option<&str>, prefixes: &[String]) -> String {
        let name = explicit.unwrap_or(property);
        if prefixes.is_empty() {
            return name.to_string();
        }
        let prefix = prefixes.join("_").to_lower_camel_case();
        format!("{prefix}{}", upper_first(name))
    }

    fn join_column_name(&self, relation_property: &str, referenced_column: &str) -> String {
        format!("{relation_property}_{referenced_column}").to_lower_camel_case()
    }

    fn join_table_name(
        &self,
        first_table: &str,
        second_table: &str,
        first_property: &str,
    ) -> String {
        format!(
            "{}_{}_{}",
            first_table,
            first_property.replace('.', "_"),
            second_table
        )
        .to_snake_case()
    }

    fn join_table_column_name(&self, table: &str, column: &str) -> String {
        format!("{table}_{column}").to_lower_camel_case()
    }
}

/// snake_case everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeNamingStrategy;

impl NamingStrategy for SnakeNamingStrategy {
    fn table_name(&self, entity_name: &str, explicit: Option<&str>) -> String {
        match explicit {
            Some(name) => name.to_string(),
            None => entity_name.to_snake_case(),
        }
    }

    fn column_name(&self, property: &str, explicit: Option<&str>, prefixes: &[String]) -> String {
        let name = match explicit {
            Some(name) => name.to_string(),
            None => property.to_snake_case(),
        };
        if prefixes.is_empty() {
            return name;
        }
        let prefix = prefixes
            .iter()
            .map(|p| p.to_snake_case())
            .collect::<Vec<_>>()
            .join("_");
        format!("{prefix}_{name}")
    }

    fn join_column_name(&self, relation_property: &str, referenced_column: &str) -> String {
        format!("{}_{}", relation_property.to_snake_case(), referenced_column)
    }

    fn join_table_name(
        &self,
        first_table: &str,
        second_table: &str,
        first_property: &str,
    ) -> String {
        format!(
            "{}_{}_{}",
            first_table,
            first_property.replace('.', "_").to_snake_case(),
            second_table
        )
    }

    fn join_table_column_name(&self, table: &str, column: &str) -> String {
        format!("{}_{}", table.to_snake_case(), column)
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let naming = DefaultNamingStrategy;
        assert_eq!(naming.table_name("PostCategory", None), "post_category");
        assert_eq!(naming.table_name("Post", Some("posts")), "posts");
        assert_eq!(naming.join_column_name("author", "id"), "authorId");
        assert_eq!(
            naming.join_table_name("post", "category", "categories"),
            "post_categories_category"
        );
        assert_eq!(naming.join_table_column_name("post", "id"), "postId");
        assert_eq!(
            naming.join_table_column_duplication_suffix("categoryId", 1),
            "categoryId_1"
        );
    }

    #[test]
    fn test_default_embedded_column_name() {
        let naming = DefaultNamingStrategy;
        assert_eq!(naming.column_name("likes", None, &[]), "likes");
        assert_eq!(
            naming.column_name("likes", None, &["counters".to_string()]),
            "countersLikes"
        );
        assert_eq!(
            naming.column_name(
                "likes",
                None,
                &["info".to_string(), "counters".to_string()]
            ),
            "infoCountersLikes"
        );
    }

    #[test]
    fn test_snake_names() {
        let naming = SnakeNamingStrategy;
        assert_eq!(naming.column_name("firstName", None, &[]), "first_name");
        assert_eq!(
            naming.column_name("likes", None, &["counters".to_string()]),
            "counters_likes"
        );
        assert_eq!(naming.join_column_name("author", "id"), "author_id");
        assert_eq!(naming.join_table_column_name("post", "id"), "post_id");
    }

    #[test]
    fn test_hashed_names_are_stable_and_order_insensitive() {
        let a = hashed_name("FK_", "post", &["authorId".into(), "tenantId".into()]);
        let b = hashed_name("FK_", "post", &["tenantId".into(), "authorId".into()]);
        assert_eq!(a, b);
        assert!(a.starts_with("FK_"));
        assert_eq!(a.len(), 3 + HASH_NAME_LENGTH);
        assert_ne!(a, hashed_name("FK_", "comment", &["authorId".into()]));
    }
}
