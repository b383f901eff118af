//! Caller-facing operations.
//!
//! Every operation returns an [`Outcome`]: a success flag, a human-readable
//! message, a machine-readable [`ErrorKind`] on failure, and the payload on
//! success. Callers branch on `error_kind`, never on `message`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{CatalogError, CatalogReader};
use crate::config::Settings;
use crate::connection::{ConnectError, Connector};
use crate::embedding::{update_embeddings, EmbeddingCache, EmbeddingKey, EmbeddingStats};
use crate::graph::{DiagramSnapshot, RelationshipGraph};
use crate::search::{search_metadata, SearchHit};
use crate::store::{
    unix_now, ColumnId, ConnectionProfile, MetadataStore, NewProfile, ProfileId, RelationshipView,
    StoreError, TableId,
};
use crate::summary::{schema_summary, TableSummary};
use crate::sync::{ErrorKind, Reconciler, SyncError, SyncReport};

/// Errors surfaced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No schema metadata for profile {0}; run a sync first")]
    NoSchema(ProfileId),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Sync(e) => e.kind(),
            ServiceError::Connect(ConnectError::UnsupportedEngine(_)) => ErrorKind::UnsupportedEngine,
            ServiceError::Connect(ConnectError::Store(e)) | ServiceError::Store(e) => {
                if e.is_not_found() {
                    ErrorKind::NotFound
                } else {
                    ErrorKind::StoreError
                }
            }
            ServiceError::Connect(_) => ErrorKind::ConnectionError,
            ServiceError::Catalog(_) => ErrorKind::CatalogQueryError,
            ServiceError::NoSchema(_) => ErrorKind::NoSchema,
            ServiceError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result envelope for every service operation.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_kind: None,
            data: Some(data),
        }
    }

    pub fn err(error: &ServiceError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            error_kind: Some(error.kind()),
            data: None,
        }
    }

    fn from_result(result: ServiceResult<T>, message: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(data) => {
                let message = message(&data);
                Self::ok(data, message)
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "operation failed");
                Self::err(&e)
            }
        }
    }

    /// The payload, if the operation succeeded.
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// Record whose description is being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionTarget {
    Table(TableId),
    Column(ColumnId),
}

impl DescriptionTarget {
    fn embedding_key(&self) -> EmbeddingKey {
        match *self {
            DescriptionTarget::Table(id) => EmbeddingKey::Table(id),
            DescriptionTarget::Column(id) => EmbeddingKey::Column(id),
        }
    }
}

/// Entry point for profile management, syncing and metadata queries.
pub struct MetadataService<C: Connector> {
    store: Arc<MetadataStore>,
    embeddings: Arc<EmbeddingCache>,
    reconciler: Reconciler<C>,
    settings: Settings,
}

impl<C: Connector> MetadataService<C> {
    pub fn new(store: Arc<MetadataStore>, connector: C, settings: Settings) -> Self {
        let embeddings = Arc::new(EmbeddingCache::new());
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            connector,
            &settings,
            Arc::clone(&embeddings),
        );
        Self {
            store,
            embeddings,
            reconciler,
            settings,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn embeddings(&self) -> &EmbeddingCache {
        &self.embeddings
    }

    pub fn reconciler(&self) -> &Reconciler<C> {
        &self.reconciler
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    pub fn create_profile(&self, profile: &NewProfile) -> Outcome<ConnectionProfile> {
        let result = self
            .store
            .create_profile(profile)
            .and_then(|id| self.store.get_profile(id))
            .map_err(ServiceError::from);
        Outcome::from_result(result, |p| format!("Connection profile {} created", p.id))
    }

    pub fn get_profile(&self, id: ProfileId) -> Outcome<ConnectionProfile> {
        let result = self.store.get_profile(id).map_err(ServiceError::from);
        Outcome::from_result(result, |p| format!("Connection profile {}", p.name))
    }

    pub fn list_profiles(&self, owner: Option<&str>) -> Outcome<Vec<ConnectionProfile>> {
        let result = self.store.list_profiles(owner).map_err(ServiceError::from);
        Outcome::from_result(result, |p| format!("{} connection profiles", p.len()))
    }

    /// Delete a profile and everything derived from it.
    /// Delete a profile and everything synced for it. Waits for any sync in flight.
    pub async fn delete_profile(&self, id: ProfileId) -> Outcome<()> {
        let result = self.try_delete_profile(id).await;
        Outcome::from_result(result, |_| format!("Connection profile {id} deleted"))
    }

    async fn try_delete_profile(&self, id: ProfileId) -> ServiceResult<()> {
        self.store.get_profile(id)?;
        let guard = self.reconciler.locks().acquire(id).await;
        let evicted = self.embeddings.evict_profile(&self.store, id)?;
        self.store.delete_profile(id)?;
        self.reconciler.locks().forget(id);
        drop(guard);
        info!(profile = %id, evicted, "connection profile deleted");
        Ok(())
    }

    // ========================================================================
    // Connectivity and sync
    // ========================================================================

    /// Open a session, run a trivial query and release it. Waits for any sync
    /// in flight so the status it leaves behind does not race the sync's session.
    pub async fn test_connection(&self, id: ProfileId) -> Outcome<()> {
        let result = self.try_test_connection(id).await;
        Outcome::from_result(result, |_| "Connection successful".to_string())
    }

    async fn try_test_connection(&self, id: ProfileId) -> ServiceResult<()> {
        let profile = self.store.get_profile(id)?;
        let _guard = self.reconciler.locks().acquire(id).await;
        let session = self.reconciler.provider().open(&profile).await?;
        session.ping().await?;
        Ok(())
    }

    pub async fn run_sync(&self, id: ProfileId) -> SyncReport {
        self.reconciler.run(id).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Return the stored diagram, building and storing one if absent or if
    /// `rebuild` is set.
    pub fn get_or_build_diagram(&self, id: ProfileId, rebuild: bool) -> Outcome<DiagramSnapshot> {
        let result = self.try_diagram(id, rebuild);
        Outcome::from_result(result, |d| {
            format!("Diagram with {} tables and {} relationships", d.nodes.len(), d.edges.len())
        })
    }

    fn try_diagram(&self, id: ProfileId, rebuild: bool) -> ServiceResult<DiagramSnapshot> {
        self.store.get_profile(id)?;
        if !rebuild {
            if let Some(diagram) = self.store.load_diagram::<DiagramSnapshot>(id)? {
                return Ok(diagram);
            }
        }

        let graph = RelationshipGraph::build(&self.store, id)?;
        if graph.is_empty() {
            return Err(ServiceError::NoSchema(id));
        }
        let diagram = graph.to_diagram(id, &self.settings.diagram, unix_now());
        self.store.save_diagram(id, &diagram)?;
        Ok(diagram)
    }

    pub fn get_schema_summary(&self, id: ProfileId) -> Outcome<Vec<TableSummary>> {
        let result = self
            .store
            .get_profile(id)
            .and_then(|_| schema_summary(&self.store, id))
            .map_err(ServiceError::from);
        Outcome::from_result(result, |s| format!("Schema summary with {} tables", s.len()))
    }

    pub fn list_relationships(&self, id: ProfileId) -> Outcome<Vec<RelationshipView>> {
        let result = self
            .store
            .get_profile(id)
            .and_then(|_| self.store.list_relationships(id))
            .map_err(ServiceError::from);
        Outcome::from_result(result, |r| format!("{} relationships", r.len()))
    }

    pub fn search(&self, id: ProfileId, query: &str, limit: usize) -> Outcome<Vec<SearchHit>> {
        let result = self.try_search(id, query, limit);
        Outcome::from_result(result, |hits| format!("{} results for '{}'", hits.len(), query.trim()))
    }

    fn try_search(&self, id: ProfileId, query: &str, limit: usize) -> ServiceResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::InvalidRequest("search query is empty".into()));
        }
        self.store.get_profile(id)?;
        Ok(search_metadata(&self.store, id, query, limit)?)
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Overwrite a description. Unlike sync, this replaces non-empty text.
    pub fn set_description(&self, target: DescriptionTarget, text: &str) -> Outcome<()> {
        let result = match target {
            DescriptionTarget::Table(id) => self.store.set_table_description(id, text),
            DescriptionTarget::Column(id) => self.store.set_column_description(id, text),
        }
        .map(|()| {
            self.embeddings.evict(target.embedding_key());
        })
        .map_err(ServiceError::from);
        Outcome::from_result(result, |_| "Description updated".to_string())
    }

    pub fn update_embeddings(&self, id: ProfileId) -> Outcome<EmbeddingStats> {
        let result = self
            .store
            .get_profile(id)
            .and_then(|_| {
                update_embeddings(&self.store, &self.embeddings, self.reconciler.synthesizer(), id)
            })
            .map_err(ServiceError::from);
        Outcome::from_result(result, |s| {
            format!("Embeddings updated for {} tables and {} columns", s.tables, s.columns)
        })
    }
}
