use std::sync::Arc;
use std::time::Duration;

use schemalens::catalog::memory::{CatalogOp, MemoryCatalog};
use schemalens::catalog::LiveColumn;
use schemalens::config::{ConnectParams, Settings};
use schemalens::service::{DescriptionTarget, MetadataService};
use schemalens::store::{ConnectionStatus, MetadataStore, NewProfile, ProfileId, TableKind};
use schemalens::sync::{ColumnChange, ErrorKind, SkipKind, SyncPhase, TableChange};

fn service() -> (MetadataService<MemoryCatalog>, MemoryCatalog) {
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    let catalog = MemoryCatalog::new();
    let service = MetadataService::new(store, catalog.clone(), Settings::default());
    (service, catalog)
}

fn register(service: &MetadataService<MemoryCatalog>, name: &str, engine: &str) -> ProfileId {
    let mut params = ConnectParams::postgres("db.internal", name, "reader", "pw");
    params.engine = engine.to_string();
    service
        .create_profile(&NewProfile {
            owner: "alice".into(),
            name: name.into(),
            params,
        })
        .into_data()
        .unwrap()
        .id
}

/// `public.users(id pk, name)` and `public.orders(id pk, user_id -> users.id)`.
fn users_and_orders(catalog: &MemoryCatalog) {
    catalog.add_table("public", "users", TableKind::Table);
    catalog.add_column("public", "users", LiveColumn::new("id", "integer").primary_key());
    catalog.add_column("public", "users", LiveColumn::new("name", "text"));
    catalog.add_table("public", "orders", TableKind::Table);
    catalog.add_column("public", "orders", LiveColumn::new("id", "integer").primary_key());
    catalog.add_column("public", "orders", LiveColumn::new("user_id", "integer").not_null());
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");
}

#[tokio::test]
async fn test_first_sync_then_idempotent() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    let profile = register(&service, "shop", "postgresql");

    let first = service.run_sync(profile).await;
    assert!(first.success, "{}", first.message);
    assert_eq!(first.changelog.tables.added.len(), 2);
    assert_eq!(first.changelog.columns.added.len(), 4);
    assert_eq!(first.changelog.relationships.added.len(), 1);
    assert!(first.changelog.skipped.is_empty());

    let second = service.run_sync(profile).await;
    assert!(second.success);
    assert!(second.changelog.is_empty(), "{:?}", second.changelog);
    assert_eq!(
        second.message,
        "Metadata sync completed: tables +0 ~0 -0, columns +0 ~0 -0, relationships +0 ~0 -0"
    );
}

#[tokio::test]
async fn test_first_sync_reports_each_entity() {
    let (service, catalog) = service();
    catalog.add_table("public", "users", TableKind::Table);
    catalog.add_column("public", "users", LiveColumn::new("id", "integer").primary_key());
    catalog.add_column("public", "users", LiveColumn::new("name", "text"));
    catalog.add_table("public", "orders", TableKind::Table);
    catalog.add_column("public", "orders", LiveColumn::new("user_id", "integer"));
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");
    let profile = register(&service, "shop", "postgresql");

    let report = service.run_sync(profile).await;
    assert_eq!(report.changelog.tables.added.len(), 2);
    assert_eq!(report.changelog.columns.added.len(), 3);
    assert_eq!(report.changelog.relationships.added.len(), 1);
}

#[tokio::test]
async fn test_dropped_column_cascades_relationship() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    let profile = register(&service, "shop", "postgresql");
    assert!(service.run_sync(profile).await.success);

    catalog.drop_column("public", "orders", "user_id");
    let report = service.run_sync(profile).await;

    assert!(report.success);
    assert_eq!(
        report.changelog.columns.removed,
        vec![ColumnChange::removed("public.orders", "user_id")]
    );
    assert!(report.changelog.columns.added.is_empty());
    assert!(service.store().list_relationships(profile).unwrap().is_empty());
}

#[tokio::test]
async fn test_dropped_table_cascades() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    let profile = register(&service, "shop", "postgresql");
    assert!(service.run_sync(profile).await.success);

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    catalog.drop_table("public", "users");
    let report = service.run_sync(profile).await;

    assert_eq!(
        report.changelog.tables.removed,
        vec![TableChange::removed("public", "users")]
    );
    assert!(service.store().find_table(profile, "public", "users").unwrap().is_none());
    assert!(service.store().list_columns(users.id).unwrap().is_empty());
    assert!(service.store().list_relationships(profile).unwrap().is_empty());
}

#[tokio::test]
async fn test_sample_failure_does_not_fail_sync() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.set_samples("public", "users", "name", &["ada", "grace"]);
    catalog.fail_on(CatalogOp::SampleValues, "connection reset by peer");
    let profile = register(&service, "shop", "postgresql");

    let report = service.run_sync(profile).await;
    assert!(report.success, "{}", report.message);
    assert_eq!(report.changelog.skipped_of(SkipKind::SampleValues).count(), 4);
    assert!(report.message.ends_with("4 skipped"));

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    let columns = service.store().list_columns(users.id).unwrap();
    assert_eq!(
        columns[1].description,
        "Column name of type text (nullable)."
    );
}

#[tokio::test]
async fn test_samples_feed_descriptions() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.set_samples("public", "users", "name", &["ada", "grace"]);
    let profile = register(&service, "shop", "postgresql");
    assert!(service.run_sync(profile).await.success);

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    assert_eq!(
        users.description,
        "Table public.users containing data related to users."
    );
    let columns = service.store().list_columns(users.id).unwrap();
    assert_eq!(
        columns[1].description,
        "Column name of type text (nullable). Sample values include: 'ada', 'grace'."
    );
}

#[tokio::test]
async fn test_live_comments_preferred_over_synthesis() {
    let (service, catalog) = service();
    catalog.add_table("public", "users", TableKind::Table);
    catalog.set_table_comment("public", "users", "Registered customers");
    catalog.add_column(
        "public",
        "users",
        LiveColumn::new("email", "text").with_comment("Login address"),
    );
    let profile = register(&service, "shop", "postgresql");
    assert!(service.run_sync(profile).await.success);

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    assert_eq!(users.description, "Registered customers");
    let columns = service.store().list_columns(users.id).unwrap();
    assert_eq!(columns[0].description, "Login address");
}

#[tokio::test]
async fn test_kind_change_preserves_description() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    let profile = register(&service, "shop", "postgresql");
    assert!(service.run_sync(profile).await.success);

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    assert!(service
        .set_description(DescriptionTarget::Table(users.id), "People who buy things")
        .success);

    catalog.set_table_kind("public", "users", TableKind::View);
    let report = service.run_sync(profile).await;

    assert_eq!(report.changelog.tables.updated.len(), 1);
    let change = &report.changelog.tables.updated[0];
    assert_eq!(change.name, "users");
    let drift = change.changes.as_ref().unwrap();
    assert_eq!(drift.kind.from, TableKind::Table);
    assert_eq!(drift.kind.to, TableKind::View);

    let users = service.store().get_table(users.id).unwrap();
    assert_eq!(users.kind, TableKind::View);
    assert_eq!(users.description, "People who buy things");
}

#[tokio::test]
async fn test_column_drift_reported_as_update() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    let profile = register(&service, "shop", "postgresql");
    assert!(service.run_sync(profile).await.success);

    catalog.alter_column("public", "users", "name", |c| {
        c.data_type = "character varying(120)".into();
        c.nullable = false;
    });
    let report = service.run_sync(profile).await;

    assert_eq!(report.changelog.columns.updated.len(), 1);
    let change = &report.changelog.columns.updated[0];
    assert_eq!(change.table, "public.users");
    let drift = change.changes.as_ref().unwrap();
    assert_eq!(drift.data_type.as_ref().unwrap().to, "character varying(120)");
    assert!(drift.nullable.is_some());
    assert!(drift.primary_key.is_none());

    // The synthesized description from the first sync stays.
    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    let columns = service.store().list_columns(users.id).unwrap();
    assert_eq!(columns[1].data_type, "character varying(120)");
    assert_eq!(columns[1].description, "Column name of type text (nullable).");
}

#[tokio::test]
async fn test_row_counts_for_base_tables_only() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.set_row_count("public", "users", 42);
    catalog.add_table("public", "active_users", TableKind::View);
    let profile = register(&service, "shop", "postgresql");
    assert!(service.run_sync(profile).await.success);

    let store = service.store();
    let users = store.find_table(profile, "public", "users").unwrap().unwrap();
    let view = store.find_table(profile, "public", "active_users").unwrap().unwrap();
    assert_eq!(users.row_count, Some(42));
    assert_eq!(view.row_count, None);
}

#[tokio::test]
async fn test_row_count_failure_is_skipped() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.fail_on(CatalogOp::RowCount, "statement timeout");
    let profile = register(&service, "shop", "postgresql");

    let report = service.run_sync(profile).await;
    assert!(report.success);
    let skipped: Vec<_> = report.changelog.skipped_of(SkipKind::RowCount).collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped[0].reason.contains("statement timeout"));
}

#[tokio::test]
async fn test_partial_sync_keeps_completed_phases() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.fail_on(CatalogOp::ListColumns, "permission denied for pg_attribute");
    let profile = register(&service, "shop", "postgresql");

    let report = service.run_sync(profile).await;
    assert!(!report.success);
    assert_eq!(report.error_kind, Some(ErrorKind::PartialSync));
    assert_eq!(report.failed_phase, Some(SyncPhase::ExtractingColumns));
    assert!(report.message.contains("permission denied"));
    assert_eq!(report.changelog.tables.added.len(), 2);
    assert_eq!(service.store().list_tables(profile).unwrap().len(), 2);
    assert!(service.get_profile(profile).into_data().unwrap().last_sync_at.is_none());

    catalog.clear_failures();
    let retry = service.run_sync(profile).await;
    assert!(retry.success);
    assert!(retry.changelog.tables.added.is_empty());
    assert_eq!(retry.changelog.columns.added.len(), 4);
    assert_eq!(retry.changelog.relationships.added.len(), 1);
    assert!(service.get_profile(profile).into_data().unwrap().last_sync_at.is_some());
}

#[tokio::test]
async fn test_table_phase_failure_is_not_partial() {
    let (service, catalog) = service();
    catalog.fail_on(CatalogOp::ListTables, "relation does not exist");
    let profile = register(&service, "shop", "postgresql");

    let report = service.run_sync(profile).await;
    assert_eq!(report.error_kind, Some(ErrorKind::CatalogQueryError));
    assert_eq!(report.failed_phase, Some(SyncPhase::ExtractingTables));
}

#[tokio::test]
async fn test_connection_error_sets_status() {
    let (service, catalog) = service();
    catalog.fail_connect("password authentication failed for user \"reader\"");
    let profile = register(&service, "shop", "postgresql");

    let report = service.run_sync(profile).await;
    assert!(!report.success);
    assert_eq!(report.error_kind, Some(ErrorKind::ConnectionError));
    assert!(report.changelog.is_empty());

    let stored = service.get_profile(profile).into_data().unwrap();
    assert_eq!(stored.status, ConnectionStatus::Error);
}

#[tokio::test]
async fn test_status_disconnected_after_sync() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    let profile = register(&service, "shop", "postgresql");

    assert!(service.run_sync(profile).await.success);
    assert_eq!(catalog.active_sessions(), 0);
    let stored = service.get_profile(profile).into_data().unwrap();
    assert_eq!(stored.status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_unsupported_engine_fails_before_connecting() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    let profile = register(&service, "legacy", "oracle");

    let report = service.run_sync(profile).await;
    assert!(!report.success);
    assert_eq!(report.error_kind, Some(ErrorKind::UnsupportedEngine));
    assert_eq!(catalog.connect_count(), 0);
}

#[tokio::test]
async fn test_missing_profile() {
    let (service, _) = service();
    let report = service.run_sync(ProfileId(404)).await;
    assert_eq!(report.error_kind, Some(ErrorKind::NotFound));
    assert_eq!(report.failed_phase, Some(SyncPhase::Idle));
}

#[tokio::test]
async fn test_same_profile_syncs_are_serialized() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.set_query_delay(Duration::from_millis(30));
    let profile = register(&service, "shop", "postgresql");

    let (a, b) = tokio::join!(service.run_sync(profile), service.run_sync(profile));
    assert!(a.success && b.success);
    assert_eq!(catalog.max_active_sessions(), 1);

    // Exactly one of the two runs did the initial load.
    let added = a.changelog.tables.added.len() + b.changelog.tables.added.len();
    assert_eq!(added, 2);
}

#[tokio::test]
async fn test_different_profiles_sync_in_parallel() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.set_query_delay(Duration::from_millis(30));
    let shop = register(&service, "shop", "postgresql");
    let crm = register(&service, "crm", "postgresql");

    let (a, b) = tokio::join!(service.run_sync(shop), service.run_sync(crm));
    assert!(a.success && b.success);
    assert_eq!(catalog.max_active_sessions(), 2);
    assert_eq!(a.changelog.tables.added.len(), 2);
    assert_eq!(b.changelog.tables.added.len(), 2);
}

#[tokio::test]
async fn test_connection_test_waits_for_running_sync() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.set_query_delay(Duration::from_millis(30));
    let profile = register(&service, "shop", "postgresql");

    let (report, ping) = tokio::join!(service.run_sync(profile), service.test_connection(profile));
    assert!(report.success, "{}", report.message);
    assert!(ping.success, "{}", ping.message);
    assert_eq!(catalog.max_active_sessions(), 1);
    assert_eq!(
        service.get_profile(profile).into_data().unwrap().status,
        ConnectionStatus::Disconnected
    );
}

#[tokio::test]
async fn test_delete_waits_for_running_sync() {
    let (service, catalog) = service();
    users_and_orders(&catalog);
    catalog.set_query_delay(Duration::from_millis(30));
    let profile = register(&service, "shop", "postgresql");

    let (report, deleted) = tokio::join!(service.run_sync(profile), service.delete_profile(profile));
    assert!(report.success, "{}", report.message);
    assert_eq!(report.changelog.tables.added.len(), 2);
    assert!(deleted.success, "{}", deleted.message);
    assert!(service.store().list_tables(profile).unwrap().is_empty());
}
