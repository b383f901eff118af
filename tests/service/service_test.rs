use std::sync::Arc;

use insta::assert_json_snapshot;
use schemalens::catalog::memory::MemoryCatalog;
use schemalens::catalog::LiveColumn;
use schemalens::config::{ConnectParams, Settings};
use schemalens::embedding::{embedding_for, EmbeddingDocument, EmbeddingKey, EMBEDDING_DIM};
use schemalens::search::SearchHit;
use schemalens::service::{DescriptionTarget, MetadataService};
use schemalens::store::{MetadataStore, NewProfile, ProfileId, TableKind};
use schemalens::sync::ErrorKind;

async fn synced() -> (MetadataService<MemoryCatalog>, MemoryCatalog, ProfileId) {
    let store = Arc::new(MetadataStore::open_in_memory().unwrap());
    let catalog = MemoryCatalog::new();
    catalog.add_table("public", "users", TableKind::Table);
    catalog.add_column("public", "users", LiveColumn::new("id", "integer").primary_key());
    catalog.add_column("public", "users", LiveColumn::new("name", "text"));
    catalog.add_table("public", "orders", TableKind::Table);
    catalog.add_column("public", "orders", LiveColumn::new("id", "integer").primary_key());
    catalog.add_column("public", "orders", LiveColumn::new("user_id", "integer").not_null());
    catalog.add_foreign_key("public.orders.user_id", "public.users.id");

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

    let report = service.run_sync(profile).await;
    assert!(report.success, "{}", report.message);
    (service, catalog, profile)
}

#[tokio::test]
async fn test_schema_summary_shape() {
    let (service, _, profile) = synced().await;
    let summary = service.get_schema_summary(profile).into_data().unwrap();

    assert_json_snapshot!(summary, @r#"
    [
      {
        "schema": "public",
        "table": "orders",
        "description": "Table public.orders containing data related to orders.",
        "columns": [
          {
            "name": "id",
            "type": "integer",
            "nullable": false,
            "pk": true,
            "fk": false,
            "description": "Column id of type integer (not nullable) and serves as the primary key."
          },
          {
            "name": "user_id",
            "type": "integer",
            "nullable": false,
            "pk": false,
            "fk": true,
            "description": "Column user_id of type integer (not nullable) and references another table."
          }
        ]
      },
      {
        "schema": "public",
        "table": "users",
        "description": "Table public.users containing data related to users.",
        "columns": [
          {
            "name": "id",
            "type": "integer",
            "nullable": false,
            "pk": true,
            "fk": false,
            "description": "Column id of type integer (not nullable) and serves as the primary key."
          },
          {
            "name": "name",
            "type": "text",
            "nullable": true,
            "pk": false,
            "fk": false,
            "description": "Column name of type text (nullable)."
          }
        ]
      }
    ]
    "#);
}

#[tokio::test]
async fn test_set_description_overwrites_and_survives_sync() {
    let (service, _, profile) = synced().await;
    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    let name = service.store().list_columns(users.id).unwrap().remove(1);

    let outcome = service.set_description(DescriptionTarget::Column(name.id), "Display name");
    assert!(outcome.success);

    let report = service.run_sync(profile).await;
    assert!(report.changelog.is_empty());
    assert_eq!(service.store().get_column(name.id).unwrap().description, "Display name");
}

#[tokio::test]
async fn test_set_description_on_missing_record() {
    let (service, _, _) = synced().await;
    let outcome = service.set_description(
        DescriptionTarget::Table(schemalens::store::TableId(9999)),
        "nothing here",
    );
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_search_scores_tables_and_columns() {
    let (service, _, profile) = synced().await;
    let hits = service.search(profile, "USER", 10).into_data().unwrap();

    let ranked: Vec<_> = hits.iter().map(|h| (h.name(), h.score())).collect();
    assert_eq!(ranked, [("users", 8), ("user_id", 6)]);
    assert!(matches!(&hits[1], SearchHit::Column { table_name, .. } if table_name == "orders"));

    let limited = service.search(profile, "user", 1).into_data().unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_embeddings_are_cached_and_evicted() {
    let (service, catalog, profile) = synced().await;

    let stats = service.update_embeddings(profile).into_data().unwrap();
    assert_eq!(stats.tables, 2);
    assert_eq!(stats.columns, 4);
    assert_eq!(service.embeddings().len(), 6);

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    let key = EmbeddingKey::Table(users.id);
    let doc = service.embeddings().get(key).unwrap();
    assert_eq!(doc.vector().len(), EMBEDDING_DIM);
    assert!(matches!(&doc, EmbeddingDocument::Table { name, .. } if name == "users"));

    // Editing a description drops both the cached and the persisted document.
    service.set_description(DescriptionTarget::Table(users.id), "Customers");
    assert!(service.embeddings().get(key).is_none());
    assert!(embedding_for(service.store(), service.embeddings(), key)
        .unwrap()
        .is_none());

    service.update_embeddings(profile);
    let refreshed = embedding_for(service.store(), service.embeddings(), key)
        .unwrap()
        .unwrap();
    assert!(matches!(&refreshed, EmbeddingDocument::Table { description, .. } if description == "Customers"));

    // Dropping the table externally evicts its entries.
    catalog.drop_table("public", "users");
    assert!(service.run_sync(profile).await.success);
    assert!(service.embeddings().get(key).is_none());
    assert_eq!(service.embeddings().len(), 2);
}

#[tokio::test]
async fn test_column_drift_invalidates_embedding() {
    let (service, catalog, profile) = synced().await;
    service.update_embeddings(profile);

    let users = service.store().find_table(profile, "public", "users").unwrap().unwrap();
    let name = service.store().list_columns(users.id).unwrap().remove(1);
    let key = EmbeddingKey::Column(name.id);
    assert!(service.embeddings().get(key).is_some());

    catalog.alter_column("public", "users", "name", |c| c.data_type = "varchar(50)".into());
    let report = service.run_sync(profile).await;
    assert_eq!(report.changelog.columns.updated.len(), 1);
    assert!(embedding_for(service.store(), service.embeddings(), key)
        .unwrap()
        .is_none());

    service.update_embeddings(profile);
    let doc = embedding_for(service.store(), service.embeddings(), key)
        .unwrap()
        .unwrap();
    assert!(matches!(&doc, EmbeddingDocument::Column { data_type, .. } if data_type == "varchar(50)"));
}

#[tokio::test]
async fn test_delete_profile_cascades() {
    let (service, _, profile) = synced().await;
    service.update_embeddings(profile);
    assert!(service.get_or_build_diagram(profile, false).success);

    let outcome = service.delete_profile(profile).await;
    assert!(outcome.success, "{}", outcome.message);
    assert!(service.embeddings().is_empty());
    assert!(service.store().list_tables(profile).unwrap().is_empty());
    assert!(service.store().load_diagram::<serde_json::Value>(profile).unwrap().is_none());

    let again = service.delete_profile(profile).await;
    assert_eq!(again.error_kind, Some(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_list_profiles_by_owner() {
    let (service, _, _) = synced().await;
    service.create_profile(&NewProfile {
        owner: "bob".into(),
        name: "crm".into(),
        params: ConnectParams::postgres("db.internal", "crm", "reader", "pw"),
    });

    assert_eq!(service.list_profiles(None).into_data().unwrap().len(), 2);
    let alice = service.list_profiles(Some("alice")).into_data().unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].name, "shop");

    let json = serde_json::to_value(&alice[0]).unwrap();
    assert!(json.get("params").is_none());
}
