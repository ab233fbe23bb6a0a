//! Schema synchronization against snapshot databases.

use ormgraph_core::metadata::{
    ColumnDef, ColumnType, EmbeddableDef, EmbeddedDef, EntityDef, IndexDef, InheritanceDef,
    MetadataRegistry, RelationDef,
};
use ormgraph_core::sync::{
    AnsiRenderer, DatabaseSchema, DdlOperation, SafetyGrade, SnapshotIntrospector, TableInfo,
};
use ormgraph_core::{MetadataOptions, SchemaGraph, SyncOptions, Synchronizer, TableName};
use pretty_assertions::assert_eq;

fn user_with_name(length: u32) -> EntityDef {
    EntityDef::new("User")
        .with_column(ColumnDef::primary_generated("id"))
        .with_column(ColumnDef::new("name", ColumnType::Varchar).with_length(length))
        .with_index(IndexDef::on(["name"]))
}

fn graph(user: EntityDef) -> SchemaGraph {
    MetadataRegistry::new()
        .with_entity(user)
        .with_entity(
            EntityDef::new("Post")
                .with_column(ColumnDef::primary_generated("id"))
                .with_column(ColumnDef::new("title", ColumnType::Varchar))
                .with_relation(RelationDef::many_to_one("author", "User")),
        )
        .with_entity(
            EntityDef::new("Content")
                .with_inheritance(InheritanceDef::single_table())
                .with_column(ColumnDef::primary_generated("id")),
        )
        .with_entity(
            EntityDef::new("Photo")
                .extends("Content")
                .with_column(ColumnDef::new("size", ColumnType::Integer)),
        )
        .build(&MetadataOptions::default())
        .unwrap()
}

fn applied(sync: &Synchronizer<'_>, mut actual: DatabaseSchema) -> DatabaseSchema {
    for planned in sync.diff(&actual).unwrap().operations() {
        actual.apply(&planned.operation);
    }
    actual
}

#[test]
fn test_widened_varchar_is_one_alter() {
    let old = graph(user_with_name(50));
    let new = graph(user_with_name(100));
    let options = SyncOptions::default();
    let sync = Synchronizer::new(&new, &options);

    let plan = sync.diff(&old.to_database_schema()).unwrap();
    assert_eq!(plan.len(), 1);
    let planned = &plan.operations()[0];
    match &planned.operation {
        DdlOperation::AlterColumn { table, from, to } => {
            assert_eq!(table.name, "user");
            assert_eq!((from.length, to.length), (Some(50), Some(100)));
        }
        other => panic!("expected an alter, got {other}"),
    }
    assert_eq!(plan.grade(), SafetyGrade::B);

    let statements = sync.render(&plan, &AnsiRenderer).unwrap();
    assert_eq!(
        statements,
        vec!["ALTER TABLE \"user\" ALTER COLUMN \"name\" TYPE varchar(100)"]
    );
}

#[test]
fn test_sync_then_diff_is_empty() {
    let graph = graph(user_with_name(50));
    let options = SyncOptions::default();
    let sync = Synchronizer::new(&graph, &options);

    let synced = applied(&sync, DatabaseSchema::new());
    assert_eq!(synced.tables.len(), sync.desired().tables.len());
    assert!(sync.diff(&synced).unwrap().is_empty());

    let changed = graph_with_extra_column();
    let sync = Synchronizer::new(&changed, &options);
    let resynced = applied(&sync, synced);
    assert!(sync.diff(&resynced).unwrap().is_empty());
}

fn graph_with_extra_column() -> SchemaGraph {
    graph(user_with_name(80).with_column(ColumnDef::new("email", ColumnType::Varchar).nullable()))
}

#[test]
fn test_snapshot_file_round_trip() {
    let graph = graph(user_with_name(50));
    let options = SyncOptions::default();
    let sync = Synchronizer::new(&graph, &options);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.snapshot");
    applied(&sync, DatabaseSchema::new()).save(&path).unwrap();

    let introspector = SnapshotIntrospector::load(&path).unwrap();
    assert!(sync.plan(&introspector).unwrap().is_empty());
}

#[test]
fn test_unknown_tables_survive_without_drops() {
    let graph = graph(user_with_name(50));
    let mut actual = graph.to_database_schema();
    actual.tables.push(TableInfo::new(&TableName::new(None, "legacy")));

    let keep = SyncOptions::without_drops();
    assert!(Synchronizer::new(&graph, &keep).diff(&actual).unwrap().is_empty());

    let drop = SyncOptions::default();
    let plan = Synchronizer::new(&graph, &drop).diff(&actual).unwrap();
    assert_eq!(plan.len(), 1);
    assert!(matches!(plan.operations()[0].operation, DdlOperation::DropTable { .. }));
    assert_eq!(plan.grade(), SafetyGrade::D);
}

#[test]
fn test_single_table_hierarchy_is_one_table() {
    let graph = graph(user_with_name(50));
    let desired = graph.to_database_schema();
    let names: Vec<_> = desired.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["user", "post", "content"]);

    let content = desired.tables.iter().find(|t| t.name == "content").unwrap();
    assert!(content.column("type").is_some());
    assert!(content.column("size").unwrap().nullable);
}

#[test]
fn test_embedded_relations_get_distinct_foreign_keys() {
    let graph = MetadataRegistry::new()
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
        )
        .build(&MetadataOptions::default())
        .unwrap();

    let desired = graph.to_database_schema();
    let post = desired.tables.iter().find(|t| t.name == "post").unwrap();
    let mut fk_columns: Vec<_> = post
        .foreign_keys
        .iter()
        .map(|fk| fk.columns.join(","))
        .collect();
    fk_columns.sort();
    assert_eq!(fk_columns, vec!["countersLikedUserId", "statsLikedUserId"]);
    assert_ne!(post.foreign_keys[0].name, post.foreign_keys[1].name);
    assert!(post.column("countersLikes").is_some());
    assert!(post.column("statsLikes").is_some());
}
