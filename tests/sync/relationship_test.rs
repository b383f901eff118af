use std::sync::Arc;

use schemalens::catalog::memory::MemoryCatalog;
use schemalens::catalog::LiveColumn;
use schemalens::config::{ConnectParams, Settings};
use schemalens::graph::RelationshipGraph;
use schemalens::service::MetadataService;
use schemalens::store::{MetadataStore, NewProfile, ProfileId, RelationshipKind, TableKind};
use schemalens::sync::{RelationshipChange, SkipKind};

fn setup() -> (MetadataService<MemoryCatalog>, MemoryCatalog, ProfileId) {
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    let catalog = MemoryCatalog::new();
    let service = MetadataService::new(store, catalog.clone(), Settings::default());
    let profile = service
        .create_profile(&NewProfile {
            owner: "alice".into(),
            name: "shop".into(),
            params: ConnectParams::postgres("db.internal", "shop", "reader", "pw"),
        })
        .into_data()
        .unwrap()
        .id;
    (service, catalog, profile)
}

fn orders(catalog: &MemoryCatalog) {
    catalog.add_table("public", "orders", TableKind::Table);
    catalog.add_column("public", "orders", LiveColumn::new("id", "integer").primary_key());
    catalog.add_column("public", "orders", LiveColumn::new("user_id", "integer"));
}

fn users(catalog: &MemoryCatalog) {
    catalog.add_table("public", "users", TableKind::Table);
    catalog.add_column("public", "users", LiveColumn::new("id", "integer").primary_key());
}

#[tokio::test]
async fn test_orphan_foreign_key_skipped_then_established() {
    let (service, catalog, profile) = setup();
    orders(&catalog);
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");

    let first = service.run_sync(profile).await;
    assert!(first.success, "{}", first.message);
    assert!(first.changelog.relationships.is_empty());
    let skipped: Vec<_> = first.changelog.skipped_of(SkipKind::ForeignKey).collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].target, "public.orders.user_id -> public.users.id");

    users(&catalog);
    let second = service.run_sync(profile).await;
    assert!(second.success);
    assert_eq!(
        second.changelog.relationships.added,
        vec![RelationshipChange::new(
            "public.orders.user_id",
            "public.users.id",
            RelationshipKind::ManyToOne
        )
        .unwrap()]
    );
    assert_eq!(second.changelog.skipped_of(SkipKind::ForeignKey).count(), 0);
}

#[tokio::test]
async fn test_dropped_foreign_key_removes_edge() {
    let (service, catalog, profile) = setup();
    users(&catalog);
    orders(&catalog);
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");
    assert!(service.run_sync(profile).await.success);
    assert_eq!(service.store().list_relationships(profile).unwrap().len(), 1);

    catalog.drop_foreign_key("public.orders.user_id");
    let report = service.run_sync(profile).await;

    assert!(report.success);
    assert_eq!(report.changelog.relationships.removed.len(), 1);
    assert_eq!(report.changelog.relationships.removed[0].from_table, "public.orders");
    assert!(service.store().list_relationships(profile).unwrap().is_empty());

    // The column survives; only its foreign key flag drifts.
    assert!(report.changelog.columns.removed.is_empty());
    let updated = &report.changelog.columns.updated;
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].name, "user_id");
    let flag = updated[0].changes.as_ref().unwrap().foreign_key.as_ref().unwrap();
    assert!(flag.from && !flag.to);
}

#[tokio::test]
async fn test_composite_and_self_references() {
    let (service, catalog, profile) = setup();
    catalog.add_table("hr", "employees", TableKind::Table);
    catalog.add_column("hr", "employees", LiveColumn::new("id", "integer").primary_key());
    catalog.add_column("hr", "employees", LiveColumn::new("manager_id", "integer"));
    catalog.add_foreign_key("hr.employees.manager_id", "hr.employees.id");
    users(&catalog);
    orders(&catalog);
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");

    let report = service.run_sync(profile).await;
    assert!(report.success);
    assert_eq!(report.changelog.relationships.added.len(), 2);

    let graph = RelationshipGraph::build(service.store(), profile).unwrap();
    assert_eq!(graph.table_count(), 3);
    assert_eq!(graph.relationship_count(), 2);

    let targets: Vec<_> = graph
        .references("public", "orders")
        .iter()
        .map(|t| t.table.qualified_name())
        .collect();
    assert_eq!(targets, ["public.users"]);

    let sources: Vec<_> = graph
        .referenced_by("hr", "employees")
        .iter()
        .map(|t| t.table.name.clone())
        .collect();
    assert_eq!(sources, ["employees"]);
}

#[tokio::test]
async fn test_relationship_view_names_both_sides() {
    let (service, catalog, profile) = setup();
    users(&catalog);
    orders(&catalog);
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");
    assert!(service.run_sync(profile).await.success);

    let outcome = service.list_relationships(profile);
    assert!(outcome.success);
    let json = serde_json::to_value(outcome.data.unwrap()).unwrap();
    let edge = &json[0];
    assert_eq!(edge["from_table"], "orders");
    assert_eq!(edge["from_column"], "user_id");
    assert_eq!(edge["to_table"], "users");
    assert_eq!(edge["to_column"], "id");
    assert_eq!(edge["relationship_type"], "many-to-one");
    assert!(edge.get("from_column_id").is_none());
}
