//! Schema graph builder.
//!
//! Turns a [`MetadataRegistry`] into a closed [`SchemaGraph`]. The build runs
//! in passes over an arena of entity schemas:
//!
//! 1. hierarchy: ids, tables, inheritance strategy and discriminators
//! 2. members: plain columns, flattened embeds and inherited members
//! 3. join columns and foreign keys of owning to-one relations
//! 4. junction entities of owning many-to-many relations
//! 5. inverse relations
//! 6. tree columns and closure entities
//! 7. indices, uniques, checks, exclusions and class-table parent keys
//!
//! No pass performs I/O, and every failure is reported before the graph is
//! handed out.

mod constraints;
mod hierarchy;
mod junction;
mod members;
mod relations;
mod tree;

use super::entity::{EntityId, EntitySchema, TableName};
use super::graph::SchemaGraph;
use super::naming::NamingStrategy;
use crate::config::MetadataOptions;
use crate::error::MetadataError;
use crate::metadata::{EntityDef, MetadataRegistry};
use members::Members;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Builds a [`SchemaGraph`] from declarations.
pub struct SchemaBuilder<'a> {
    registry: &'a MetadataRegistry,
    options: &'a MetadataOptions,
    naming: Box<dyn NamingStrategy>,
    defs: HashMap<&'a str, &'a EntityDef>,
    ids: HashMap<String, EntityId>,
    entities: Vec<EntitySchema>,
    /// Flattened members of each registered entity, indexed by id.
    members: Vec<Members<'a>>,
    /// Columns whose type is still unknown; join column resolution may fill them.
    untyped: HashSet<(EntityId, String)>,
}

impl<'a> SchemaBuilder<'a> {
    /// Create a builder over a registry.
    pub fn new(registry: &'a MetadataRegistry, options: &'a MetadataOptions) -> Self {
        Self {
            registry,
            options,
            naming: options.naming_strategy(),
            defs: HashMap::new(),
            ids: HashMap::new(),
            entities: Vec::new(),
            members: Vec::new(),
            untyped: HashSet::new(),
        }
    }

    /// Replace the naming strategy chosen by the options.
    pub fn with_naming_strategy(mut self, naming: Box<dyn NamingStrategy>) -> Self {
        self.naming = naming;
        self
    }

    /// Resolve every declaration into the schema graph.
    #[instrument(skip_all, fields(entities = self.registry.entities.len()))]
    pub fn build(mut self) -> Result<SchemaGraph, MetadataError> {
        self.index_declarations()?;
        self.resolve_hierarchy()?;
        self.resolve_members()?;
        self.resolve_join_columns()?;
        self.resolve_junctions()?;
        self.resolve_inverse_relations()?;
        self.resolve_trees()?;
        self.resolve_constraints()?;
        self.validate()?;

        info!(
            entities = self.entities.len(),
            "schema graph built"
        );
        Ok(SchemaGraph::from_entities(self.entities))
    }

    fn index_declarations(&mut self) -> Result<(), MetadataError> {
        for def in &self.registry.entities {
            if self.defs.insert(def.name.as_str(), def).is_some() {
                return Err(MetadataError::DuplicateDeclaration {
                    name: def.name.clone(),
                });
            }
        }
        let mut embeddables = HashSet::new();
        for embeddable in &self.registry.embeddables {
            if !embeddables.insert(embeddable.name.as_str()) {
                return Err(MetadataError::DuplicateDeclaration {
                    name: embeddable.name.clone(),
                });
            }
        }
        debug!(
            entities = self.defs.len(),
            embeddables = embeddables.len(),
            "declarations indexed"
        );
        Ok(())
    }

    fn def(&self, name: &str) -> Result<&'a EntityDef, MetadataError> {
        self.defs
            .get(name)
            .copied()
            .ok_or_else(|| MetadataError::UnknownEntity {
                name: name.to_string(),
            })
    }

    fn target_id(
        &self,
        entity: &str,
        property: &str,
        target: &str,
    ) -> Result<EntityId, MetadataError> {
        if let Some(id) = self.ids.get(target) {
            return Ok(*id);
        }
        match self.defs.get(target) {
            Some(def) if def.is_abstract => Err(MetadataError::InvalidRelation {
                entity: entity.to_string(),
                property: property.to_string(),
                reason: format!("target '{target}' is abstract"),
            }),
            _ => Err(MetadataError::UnknownEntity {
                name: target.to_string(),
            }),
        }
    }

    /// Push a generated entity (junction or closure) into the arena.
    fn push_entity(&mut self, mut schema: EntitySchema) -> EntityId {
        let id = EntityId(self.entities.len());
        schema.id = id;
        schema.tables = vec![id];
        for column in &mut schema.columns {
            column.table_owner = id;
            column.declared_by = id;
        }
        self.entities.push(schema);
        id
    }

    fn is_same_or_descendant(&self, id: EntityId, ancestor: EntityId) -> bool {
        let mut current = Some(id);
        while let Some(entity) = current {
            if entity == ancestor {
                return true;
            }
            current = self.entities[entity.0].parent;
        }
        false
    }

    fn validate(&self) -> Result<(), MetadataError> {
        if let Some((id, path)) = self.untyped.iter().min() {
            return Err(MetadataError::ColumnTypeUndefined {
                entity: self.entities[id.0].name.clone(),
                property: path.clone(),
            });
        }
        let mut owners: HashMap<&TableName, &str> = HashMap::new();
        for entity in &self.entities {
            if entity.primary_columns().next().is_none() {
                return Err(MetadataError::MissingPrimaryKey {
                    entity: entity.name.clone(),
                });
            }
            let shares_parent_table = entity
                .parent
                .is_some_and(|p| self.entities[p.0].table == entity.table);
            if shares_parent_table {
                continue;
            }
            if let Some(first) = owners.insert(&entity.table, &entity.name) {
                return Err(MetadataError::DuplicateTable {
                    table: entity.table.to_string(),
                    first: first.to_string(),
                    second: entity.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        Cascade, CheckDef, ColumnDef, ColumnRole, ColumnType, DefaultValue, EmbeddableDef,
        EmbeddedDef, IndexDef, InheritanceDef, InheritanceStrategy, JoinTableDef,
        ReferentialAction, RelationDef, TreeKind,
    };
    use crate::schema::entity::EntityKind;

    fn build(registry: &MetadataRegistry) -> Result<SchemaGraph, MetadataError> {
        registry.build(&MetadataOptions::default())
    }

    fn blog() -> MetadataRegistry {
        MetadataRegistry::new()
            .with_entity(
                EntityDef::new("Post")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("title", ColumnType::Varchar).with_length(50))
                    .with_relation(RelationDef::many_to_one("author", "User").with_inverse("posts"))
                    .with_relation(
                        RelationDef::many_to_many("categories", "Category")
                            .with_join_table()
                            .cascade(Cascade::Insert),
                    ),
            )
            .with_entity(
                EntityDef::new("Category")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("name", ColumnType::Varchar))
                    .with_relation(
                        RelationDef::many_to_many("posts", "Post").with_inverse("categories"),
                    ),
            )
            .with_entity(
                EntityDef::new("User")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(RelationDef::one_to_many("posts", "Post", "author")),
            )
    }

    #[test]
    fn test_many_to_one_join_column() {
        let graph = build(&blog()).unwrap();
        let post = graph.entity_by_name("Post").unwrap();
        let user = graph.entity_id("User").unwrap();

        let author_id = graph
            .find_column_by_database_name(post.id, "authorId")
            .unwrap();
        assert_eq!(author_id.property_path, "author.id");
        assert_eq!(author_id.column_type, ColumnType::Integer);
        assert!(author_id.nullable);
        assert_eq!(author_id.reference.as_ref().unwrap().target, user);

        assert_eq!(post.relation("author").unwrap().join_columns, vec!["author.id"]);
        assert_eq!(post.foreign_keys.len(), 1);
        assert_eq!(post.foreign_keys[0].columns, vec!["authorId"]);
        assert_eq!(post.foreign_keys[0].referenced_table.name, "user");
        assert!(post.foreign_keys[0].name.starts_with("FK_"));
    }

    #[test]
    fn test_many_to_many_junction() {
        let graph = build(&blog()).unwrap();
        let junction = graph.entity_by_name("post_categories_category").unwrap();
        assert_eq!(junction.kind, EntityKind::Junction);

        let names: Vec<_> = junction
            .columns
            .iter()
            .map(|c| c.database_name.as_str())
            .collect();
        assert_eq!(names, vec!["postId", "categoryId"]);
        assert!(junction.columns.iter().all(|c| c.primary && !c.nullable));
        assert_eq!(junction.foreign_keys.len(), 2);
        assert!(junction
            .foreign_keys
            .iter()
            .all(|fk| fk.on_delete == ReferentialAction::Cascade));

        let post = graph.entity_by_name("Post").unwrap();
        let owning = post.relation("categories").unwrap();
        let junction_ref = owning.junction.as_ref().unwrap();
        assert_eq!(junction_ref.entity, junction.id);
        assert_eq!(junction_ref.owner_columns, vec![("postId".to_string(), "id".to_string())]);

        let category = graph.entity_by_name("Category").unwrap();
        let inverse = category.relation("posts").unwrap();
        assert!(!inverse.owning);
        let inverse_ref = inverse.junction.as_ref().unwrap();
        assert_eq!(
            inverse_ref.owner_columns,
            vec![("categoryId".to_string(), "id".to_string())]
        );

        let user = graph.entity_by_name("User").unwrap();
        assert_eq!(user.relation("posts").unwrap().inverse.as_deref(), Some("author"));
    }

    #[test]
    fn test_self_referencing_junction_columns_are_renamed() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Category")
                .with_column(ColumnDef::primary_generated("id"))
                .with_relation(RelationDef::many_to_many("related", "Category").with_join_table()),
        );
        let graph = build(&registry).unwrap();
        let junction = graph.entity_by_name("category_related_category").unwrap();
        let names: Vec<_> = junction
            .columns
            .iter()
            .map(|c| c.database_name.as_str())
            .collect();
        assert_eq!(names, vec!["categoryId_1", "categoryId_2"]);
    }

    #[test]
    fn test_preserved_shared_junction_columns() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Category")
                .with_column(ColumnDef::primary_generated("id"))
                .with_relation(
                    RelationDef::many_to_many("related", "Category")
                        .with_join_table_def(JoinTableDef::default().preserve_shared_columns()),
                ),
        );
        let graph = build(&registry).unwrap();
        let junction = graph.entity_by_name("category_related_category").unwrap();
        assert_eq!(junction.columns.len(), 1);
        assert_eq!(junction.columns[0].database_name, "categoryId");
        assert_eq!(junction.foreign_keys.len(), 2);
    }

    #[test]
    fn test_shared_join_column_takes_referenced_type() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::new("User")
                    .with_column(ColumnDef::primary_uuid("id")),
            )
            .with_entity(
                EntityDef::new("Post")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::untyped("authorId"))
                    .with_relation(RelationDef::many_to_one("author", "User")),
            );
        let graph = build(&registry).unwrap();
        let post = graph.entity_by_name("Post").unwrap();

        let shared: Vec<_> = post
            .columns
            .iter()
            .filter(|c| c.database_name == "authorId")
            .collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].property_path, "authorId");
        assert_eq!(shared[0].column_type, ColumnType::Uuid);
        assert_eq!(post.relation("author").unwrap().join_columns, vec!["authorId"]);
    }

    #[test]
    fn test_embedded_relation_columns_are_prefixed() {
        let registry = MetadataRegistry::new()
            .with_embeddable(
                EmbeddableDef::new("Counters")
                    .with_column(ColumnDef::new("likes", ColumnType::Integer))
                    .with_relation(RelationDef::many_to_one("likedUser", "User")),
            )
            .with_entity(EntityDef::new("User").with_column(ColumnDef::primary_generated("id")))
            .with_entity(
                EntityDef::new("Post")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_embedded(EmbeddedDef::new("counters", "Counters"))
                    .with_embedded(EmbeddedDef::new("stats", "Counters")),
            );
        let graph = build(&registry).unwrap();
        let post = graph.entity_id("Post").unwrap();

        let likes = graph
            .find_column_with_property_path(post, "counters.likes")
            .unwrap();
        assert_eq!(likes.database_name, "countersLikes");
        assert_eq!(likes.embedded_path.as_deref(), Some("counters"));

        let counters_user = graph
            .find_column_by_database_name(post, "countersLikedUserId")
            .unwrap();
        assert_eq!(counters_user.property_path, "counters.likedUser.id");
        assert!(graph
            .find_column_by_database_name(post, "statsLikedUserId")
            .is_some());
        assert_eq!(graph.entity(post).foreign_keys.len(), 2);
    }

    #[test]
    fn test_nested_embeds_and_disabled_prefix() {
        let registry = MetadataRegistry::new()
            .with_embeddable(
                EmbeddableDef::new("Name")
                    .with_column(ColumnDef::new("first", ColumnType::Varchar))
                    .with_column(ColumnDef::new("last", ColumnType::Varchar)),
            )
            .with_embeddable(
                EmbeddableDef::new("Profile").with_embedded(EmbeddedDef::new("name", "Name")),
            )
            .with_entity(
                EntityDef::new("User")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_embedded(EmbeddedDef::new("profile", "Profile"))
                    .with_embedded(EmbeddedDef::new("alias", "Name").without_prefix()),
            );
        let graph = build(&registry).unwrap();
        let user = graph.entity_id("User").unwrap();

        let first = graph
            .find_column_with_property_path(user, "profile.name.first")
            .unwrap();
        assert_eq!(first.database_name, "profileNameFirst");
        let alias = graph
            .find_column_with_property_path(user, "alias.first")
            .unwrap();
        assert_eq!(alias.database_name, "first");
    }

    #[test]
    fn test_circular_embedded() {
        let registry = MetadataRegistry::new()
            .with_embeddable(EmbeddableDef::new("A").with_embedded(EmbeddedDef::new("b", "B")))
            .with_embeddable(EmbeddableDef::new("B").with_embedded(EmbeddedDef::new("a", "A")))
            .with_entity(
                EntityDef::new("Thing")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_embedded(EmbeddedDef::new("a", "A")),
            );
        assert_eq!(
            build(&registry).unwrap_err(),
            MetadataError::CircularEmbedded {
                path: vec!["A".into(), "B".into(), "A".into()],
            }
        );
    }

    #[test]
    fn test_column_type_undefined() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Thing")
                .with_column(ColumnDef::primary_generated("id"))
                .with_column(ColumnDef::untyped("label")),
        );
        assert_eq!(
            build(&registry).unwrap_err(),
            MetadataError::ColumnTypeUndefined {
                entity: "Thing".into(),
                property: "label".into(),
            }
        );
    }

    #[test]
    fn test_generated_with_default() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Thing").with_column(
                ColumnDef::primary_generated("id").with_default(DefaultValue::Int(1)),
            ),
        );
        assert!(matches!(
            build(&registry),
            Err(MetadataError::GeneratedWithDefault { .. })
        ));
    }

    #[test]
    fn test_index_on_unknown_column() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Thing")
                .with_column(ColumnDef::primary_generated("id"))
                .with_index(IndexDef::on(["missing"])),
        );
        assert_eq!(
            build(&registry).unwrap_err(),
            MetadataError::EntityColumnNotFound {
                entity: "Thing".into(),
                column: "missing".into(),
            }
        );
    }

    #[test]
    fn test_missing_primary_key() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::new("Thing").with_column(ColumnDef::new("a", ColumnType::Text)),
            );
        assert!(matches!(
            build(&registry),
            Err(MetadataError::MissingPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_abstract_base_columns_are_copied() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::abstract_base("BaseEntity")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::special("createdAt", ColumnRole::CreateDate)),
            )
            .with_entity(
                EntityDef::new("Post")
                    .extends("BaseEntity")
                    .with_column(ColumnDef::new("title", ColumnType::Text)),
            )
            .with_entity(EntityDef::new("Tag").extends("BaseEntity"));
        let graph = build(&registry).unwrap();
        assert!(graph.entity_by_name("BaseEntity").is_none());

        let post = graph.entity_by_name("Post").unwrap();
        let paths: Vec<_> = post.columns.iter().map(|c| c.property_path.as_str()).collect();
        assert_eq!(paths, vec!["id", "createdAt", "title"]);
        let created = post.column("createdAt").unwrap();
        assert_eq!(created.column_type, ColumnType::Timestamp);
        assert_eq!(created.default, Some(DefaultValue::CurrentTimestamp));
        assert!(post.parent.is_none());

        let tag = graph.entity_by_name("Tag").unwrap();
        assert_eq!(tag.table.name, "tag");
        assert_eq!(tag.columns.len(), 2);
    }

    fn content_hierarchy() -> MetadataRegistry {
        MetadataRegistry::new()
            .with_entity(
                EntityDef::new("Content")
                    .with_inheritance(InheritanceDef::single_table())
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("title", ColumnType::Varchar)),
            )
            .with_entity(
                EntityDef::new("Photo")
                    .extends("Content")
                    .with_column(ColumnDef::new("size", ColumnType::Integer)),
            )
            .with_entity(
                EntityDef::new("Question")
                    .extends("Content")
                    .with_discriminator_value("q")
                    .with_column(ColumnDef::new("answers", ColumnType::Integer)),
            )
            .with_entity(
                EntityDef::new("Animal")
                    .with_inheritance(InheritanceDef::single_table().with_discriminator("kind"))
                    .with_column(ColumnDef::primary_generated("id")),
            )
            .with_entity(
                EntityDef::new("Dog")
                    .extends("Animal")
                    .with_discriminator_value("Photo"),
            )
    }

    #[test]
    fn test_single_table_inheritance() {
        let graph = build(&content_hierarchy()).unwrap();
        let content = graph.entity_by_name("Content").unwrap();
        let photo = graph.entity_by_name("Photo").unwrap();
        let question = graph.entity_by_name("Question").unwrap();

        assert_eq!(photo.table, content.table);
        assert_eq!(question.table, content.table);
        assert_eq!(photo.parent, Some(content.id));
        assert_eq!(content.children, vec![photo.id, question.id]);
        assert_eq!(photo.inheritance, Some(InheritanceStrategy::SingleTable));

        let discriminator = photo.column("type").unwrap();
        assert_eq!(discriminator.role, ColumnRole::Discriminator);
        assert_eq!(discriminator.table_owner, content.id);
        assert_eq!(photo.discriminator.as_ref().unwrap().value, "Photo");
        assert!(photo.column("size").is_some());
        assert!(photo.column("answers").is_none());
        assert_eq!(photo.column("size").unwrap().table_owner, content.id);
    }

    #[test]
    fn test_discriminator_values_stay_in_their_hierarchy() {
        let graph = build(&content_hierarchy()).unwrap();
        let content = graph.entity_id("Content").unwrap();
        let photo = graph.entity_id("Photo").unwrap();
        let animal = graph.entity_id("Animal").unwrap();

        assert_eq!(graph.discriminator_values(content), vec!["Content", "Photo", "q"]);
        assert_eq!(graph.discriminator_values(photo), vec!["Photo"]);
        assert_eq!(graph.discriminator_values(animal), vec!["Animal", "Photo"]);

        let dog = graph.entity_by_name("Dog").unwrap();
        assert_eq!(dog.discriminator.as_ref().unwrap().column, "kind");
        assert_eq!(graph.root_of(dog.id), animal);
    }

    #[test]
    fn test_duplicate_discriminator() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::new("Content")
                    .with_inheritance(InheritanceDef::single_table())
                    .with_column(ColumnDef::primary_generated("id")),
            )
            .with_entity(EntityDef::new("Photo").extends("Content").with_discriminator_value("x"))
            .with_entity(EntityDef::new("Video").extends("Content").with_discriminator_value("x"));
        assert_eq!(
            build(&registry).unwrap_err(),
            MetadataError::DuplicateDiscriminator {
                value: "x".into(),
                first: "Photo".into(),
                second: "Video".into(),
            }
        );
    }

    #[test]
    fn test_hierarchies_cannot_share_a_table() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::new("Content")
                    .with_table_name("shared")
                    .with_inheritance(InheritanceDef::single_table())
                    .with_column(ColumnDef::primary_generated("id")),
            )
            .with_entity(EntityDef::new("Photo").extends("Content"))
            .with_entity(
                EntityDef::new("Animal")
                    .with_table_name("shared")
                    .with_inheritance(InheritanceDef::single_table())
                    .with_column(ColumnDef::primary_generated("id")),
            )
            .with_entity(EntityDef::new("Dog").extends("Animal").with_discriminator_value("Photo"));
        assert_eq!(
            build(&registry).unwrap_err(),
            MetadataError::DuplicateTable {
                table: "shared".into(),
                first: "Content".into(),
                second: "Animal".into(),
            }
        );
    }

    #[test]
    fn test_plain_entities_cannot_share_a_table() {
        let registry = MetadataRegistry::new()
            .with_entity(EntityDef::new("User").with_column(ColumnDef::primary_generated("id")))
            .with_entity(
                EntityDef::new("Account")
                    .with_table_name("user")
                    .with_column(ColumnDef::primary_generated("id")),
            );
        assert!(matches!(
            build(&registry),
            Err(MetadataError::DuplicateTable { table, .. }) if table == "user"
        ));
    }

    #[test]
    fn test_extended_entity_requires_strategy() {
        let registry = MetadataRegistry::new()
            .with_entity(EntityDef::new("Base").with_column(ColumnDef::primary_generated("id")))
            .with_entity(EntityDef::new("Child").extends("Base"));
        assert!(matches!(
            build(&registry),
            Err(MetadataError::InvalidInheritance { entity, .. }) if entity == "Base"
        ));
    }

    #[test]
    fn test_class_table_inheritance() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::new("Person")
                    .with_inheritance(InheritanceDef::class_table())
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_column(ColumnDef::new("name", ColumnType::Varchar)),
            )
            .with_entity(
                EntityDef::new("Employee")
                    .extends("Person")
                    .with_column(ColumnDef::new("salary", ColumnType::Integer)),
            );
        let graph = build(&registry).unwrap();
        let person = graph.entity_by_name("Person").unwrap();
        let employee = graph.entity_by_name("Employee").unwrap();

        assert_eq!(employee.table.name, "employee");
        assert_eq!(employee.tables, vec![person.id, employee.id]);
        assert_eq!(employee.column("name").unwrap().table_owner, person.id);
        assert_eq!(employee.column("salary").unwrap().table_owner, employee.id);

        let parent_key = &employee.foreign_keys[0];
        assert_eq!(parent_key.referenced_table, person.table);
        assert_eq!(parent_key.columns, vec!["id"]);
        assert_eq!(parent_key.on_delete, ReferentialAction::Cascade);
    }

    #[test]
    fn test_one_to_one_owner_gets_relation_unique() {
        let registry = MetadataRegistry::new()
            .with_entity(EntityDef::new("Profile").with_column(ColumnDef::primary_generated("id")))
            .with_entity(
                EntityDef::new("User")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(
                        RelationDef::one_to_one("profile", "Profile").with_join_column(),
                    ),
            );
        let graph = build(&registry).unwrap();
        let user = graph.entity_by_name("User").unwrap();
        assert_eq!(user.uniques.len(), 1);
        assert!(user.uniques[0].name.starts_with("REL_"));
        assert_eq!(user.uniques[0].columns, vec!["profileId"]);
    }

    #[test]
    fn test_one_to_many_without_owner_is_rejected() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::new("User")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(RelationDef::one_to_many("posts", "Post", "writer")),
            )
            .with_entity(EntityDef::new("Post").with_column(ColumnDef::primary_generated("id")));
        assert!(matches!(
            build(&registry),
            Err(MetadataError::InvalidRelation { property, .. }) if property == "posts"
        ));
    }

    #[test]
    fn test_owning_side_inverse_must_exist() {
        let registry = MetadataRegistry::new()
            .with_entity(EntityDef::new("User").with_column(ColumnDef::primary_generated("id")))
            .with_entity(
                EntityDef::new("Post")
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(
                        RelationDef::many_to_one("author", "User").with_inverse("posts"),
                    ),
            );
        assert!(matches!(
            build(&registry),
            Err(MetadataError::InvalidRelation { property, .. }) if property == "author"
        ));

        let graph = build(&blog()).unwrap();
        let post = graph.entity_by_name("Post").unwrap();
        assert_eq!(post.relation("author").unwrap().inverse.as_deref(), Some("posts"));
    }

    #[test]
    fn test_constraints_resolve_to_database_names() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Account")
                .with_column(ColumnDef::primary_generated("id"))
                .with_column(ColumnDef::new("email", ColumnType::Varchar).unique())
                .with_column(ColumnDef::new("balance", ColumnType::Integer))
                .with_index(IndexDef::on(["email", "balance"]))
                .with_check(CheckDef::new("\"balance\" >= 0")),
        );
        let graph = build(&registry).unwrap();
        let account = graph.entity_by_name("Account").unwrap();

        assert_eq!(account.indices[0].columns, vec!["email", "balance"]);
        assert!(account.indices[0].name.starts_with("IDX_"));
        assert_eq!(account.uniques[0].columns, vec!["email"]);
        assert!(account.checks[0].name.starts_with("CHK_"));
        assert!(account.primary_key_name.starts_with("PK_"));
    }

    #[test]
    fn test_closure_table_tree() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Category")
                .with_tree(TreeKind::ClosureTable)
                .with_column(ColumnDef::primary_generated("id"))
                .with_relation(RelationDef::many_to_one("parent", "Category").tree_parent())
                .with_relation(RelationDef::one_to_many("children", "Category", "parent")),
        );
        let graph = build(&registry).unwrap();
        let category = graph.entity_by_name("Category").unwrap();
        let tree = category.tree.as_ref().unwrap();
        assert_eq!(tree.parent_relation, "parent");
        assert_eq!(tree.children_relation.as_deref(), Some("children"));

        let closure = graph.entity_by_name("category_closure").unwrap();
        assert_eq!(closure.kind, EntityKind::Closure);
        let names: Vec<_> = closure
            .columns
            .iter()
            .map(|c| c.database_name.as_str())
            .collect();
        assert_eq!(names, vec!["id_ancestor", "id_descendant"]);
        assert_eq!(closure.foreign_keys.len(), 2);
        assert_eq!(tree.closure.as_ref().unwrap().entity, closure.id);
    }

    #[test]
    fn test_materialized_path_and_nested_set_columns() {
        let registry = MetadataRegistry::new()
            .with_entity(
                EntityDef::new("Folder")
                    .with_tree(TreeKind::MaterializedPath)
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(RelationDef::many_to_one("parent", "Folder")),
            )
            .with_entity(
                EntityDef::new("Node")
                    .with_tree(TreeKind::NestedSet)
                    .with_column(ColumnDef::primary_generated("id"))
                    .with_relation(RelationDef::many_to_one("parent", "Node")),
            );
        let graph = build(&registry).unwrap();

        let folder = graph.entity_by_name("Folder").unwrap();
        let mpath = folder.column("mpath").unwrap();
        assert_eq!(mpath.default, Some(DefaultValue::String(String::new())));
        assert_eq!(
            folder.tree.as_ref().unwrap().path_column.as_deref(),
            Some("mpath")
        );

        let node = graph.entity_by_name("Node").unwrap();
        assert_eq!(node.column("nsleft").unwrap().default, Some(DefaultValue::Int(1)));
        assert_eq!(node.column("nsright").unwrap().default, Some(DefaultValue::Int(2)));
    }

    #[test]
    fn test_tree_without_parent_relation() {
        let registry = MetadataRegistry::new().with_entity(
            EntityDef::new("Folder")
                .with_tree(TreeKind::MaterializedPath)
                .with_column(ColumnDef::primary_generated("id")),
        );
        assert!(matches!(
            build(&registry),
            Err(MetadataError::InvalidTree { .. })
        ));
    }
}
