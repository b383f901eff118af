use std::sync::Arc;

use schemalens::catalog::memory::MemoryCatalog;
use schemalens::catalog::LiveColumn;
use schemalens::config::{ConnectParams, Settings};
use schemalens::graph::Position;
use schemalens::service::MetadataService;
use schemalens::store::{MetadataStore, NewProfile, ProfileId, TableKind};
use schemalens::sync::ErrorKind;

fn setup(settings: Settings) -> (MetadataService<MemoryCatalog>, MemoryCatalog, ProfileId) {
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    let catalog = MemoryCatalog::new();
    let service = MetadataService::new(store, catalog.clone(), settings);
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

fn add_tables(catalog: &MemoryCatalog, names: &[&str]) {
    for name in names {
        catalog.add_table("public", name, TableKind::Table);
        catalog.add_column("public", name, LiveColumn::new("id", "integer").primary_key());
    }
}

#[tokio::test]
async fn test_grid_layout_uses_square_rows() {
    let (service, catalog, profile) = setup(Settings::default());
    add_tables(&catalog, &["a", "b", "c", "d", "e"]);
    assert!(service.run_sync(profile).await.success);

    let diagram = service.get_or_build_diagram(profile, false).into_data().unwrap();
    let positions: Vec<_> = diagram.nodes.iter().map(|n| (n.id.as_str(), n.position)).collect();
    assert_eq!(
        positions,
        [
            ("public.a", Position { x: 0, y: 0 }),
            ("public.b", Position { x: 300, y: 0 }),
            ("public.c", Position { x: 600, y: 0 }),
            ("public.d", Position { x: 0, y: 300 }),
            ("public.e", Position { x: 300, y: 300 }),
        ]
    );
    assert_eq!(diagram.metadata.profile_id, profile);
}

#[tokio::test]
async fn test_nodes_and_edges_carry_layout_hints() {
    let mut settings = Settings::default();
    settings.diagram.grid_spacing = 100;
    let (service, catalog, profile) = setup(settings);
    add_tables(&catalog, &["users"]);
    catalog.add_column("public", "users", LiveColumn::new("email", "text"));
    add_tables(&catalog, &["orders"]);
    catalog.add_column("public", "orders", LiveColumn::new("user_id", "integer"));
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");
    assert!(service.run_sync(profile).await.success);

    let diagram = service.get_or_build_diagram(profile, false).into_data().unwrap();
    let users = diagram.nodes.iter().find(|n| n.id == "public.users").unwrap();
    assert_eq!(users.node_type, "tableNode");
    assert_eq!(users.width, 220);
    assert_eq!(users.height, 40 + 24 * 2);
    assert_eq!(users.position, Position { x: 100, y: 0 });
    assert_eq!(users.data.label, "users");
    assert_eq!(users.data.columns.len(), 2);

    assert_eq!(diagram.edges.len(), 1);
    let edge = &diagram.edges[0];
    assert_eq!(edge.source, "public.orders");
    assert_eq!(edge.target, "public.users");
    assert_eq!(edge.label, "user_id → id");

    let from = service.store().find_column(profile, "public", "orders", "user_id").unwrap().unwrap();
    let to = service.store().find_column(profile, "public", "users", "id").unwrap().unwrap();
    assert_eq!(edge.id, format!("e-{from}-{to}"));

    let json = serde_json::to_value(edge).unwrap();
    assert_eq!(json["data"]["relationship_type"], "many-to-one");
}

#[tokio::test]
async fn test_sync_refreshes_stored_diagram() {
    let (service, catalog, profile) = setup(Settings::default());
    add_tables(&catalog, &["users"]);
    assert!(service.run_sync(profile).await.success);
    assert_eq!(
        service.get_or_build_diagram(profile, false).into_data().unwrap().nodes.len(),
        1
    );

    add_tables(&catalog, &["orders"]);
    assert!(service.run_sync(profile).await.success);
    let diagram = service.get_or_build_diagram(profile, false).into_data().unwrap();
    assert_eq!(diagram.nodes.len(), 2);
}

#[tokio::test]
async fn test_rebuild_after_description_edit() {
    let (service, catalog, profile) = setup(Settings::default());
    add_tables(&catalog, &["users"]);
    assert!(service.run_sync(profile).await.success);

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    service.set_description(
        schemalens::service::DescriptionTarget::Table(users.id),
        "Customers",
    );

    let stored = service.get_or_build_diagram(profile, false).into_data().unwrap();
    assert_ne!(stored.nodes[0].data.description, "Customers");

    let rebuilt = service.get_or_build_diagram(profile, true).into_data().unwrap();
    assert_eq!(rebuilt.nodes[0].data.description, "Customers");
}

#[tokio::test]
async fn test_diagram_requires_schema() {
    let (service, _, profile) = setup(Settings::default());
    let outcome = service.get_or_build_diagram(profile, false);
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::NoSchema));

    let missing = service.get_or_build_diagram(ProfileId(77), false);
    assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));
}
