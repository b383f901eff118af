//! Metadata reconciler.
//!
//! One sync run diffs a profile's live catalog against the local store and
//! applies the minimal writes to bring the store in line:
//!
//! ```text
//! ┌────────────────┐   ┌─────────────────┐   ┌───────────────────────┐   ┌────────────┐
//! │ tables         │──▶│ columns         │──▶│ relationships         │──▶│ finalizing │
//! │ add/kind/drop  │   │ add/drift/drop  │   │ upsert/drop stale FKs │   │ stamp,     │
//! │ describe bare  │   │ describe bare   │   │ skip orphans          │   │ diagram    │
//! └────────────────┘   └─────────────────┘   └───────────────────────┘   └────────────┘
//! ```
//!
//! # Invariants
//!
//! - Descriptions are only written when empty; a non-empty description
//!   (authored or synthesized earlier) survives every sync.
//! - Each phase opens its own catalog session and drops it before the next.
//! - Runs for the same profile are serialized; other profiles run in parallel.
//! - There is no transaction across phases. A failure keeps the writes of
//!   completed phases, and the next successful run reconciles the rest.

mod changelog;
mod error;
mod lock;
mod phase;

pub use changelog::{
    ChangeLog, ColumnChange, ColumnDrift, EntityChanges, FieldChange, RelationshipChange,
    SkipKind, SkippedItem, TableChange, TableDrift,
};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use lock::SyncLocks;
pub use phase::{InvalidTransition, PhaseTracker, SyncPhase};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogReader, LiveTable};
use crate::config::{DiagramSettings, Settings, SyncSettings};
use crate::connection::{ConnectionProvider, Connector};
use crate::describe::DescriptionSynthesizer;
use crate::embedding::{EmbeddingCache, EmbeddingKey};
use crate::graph::RelationshipGraph;
use crate::store::{
    unix_now, ColumnId, ColumnRecord, ConnectionProfile, MetadataStore, ProfileId,
    RelationshipKind, StoreError, TableKind, TableRecord,
};

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Phase that was running when the sync failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<SyncPhase>,
    pub changelog: ChangeLog,
}

/// Drives sync runs for connection profiles.
pub struct Reconciler<C: Connector> {
    store: Arc<MetadataStore>,
    provider: ConnectionProvider<C>,
    synthesizer: DescriptionSynthesizer,
    embeddings: Arc<EmbeddingCache>,
    locks: SyncLocks,
    sync: SyncSettings,
    diagram: DiagramSettings,
}

impl<C: Connector> Reconciler<C> {
    pub fn new(
        store: Arc<MetadataStore>,
        connector: C,
        settings: &Settings,
        embeddings: Arc<EmbeddingCache>,
    ) -> Self {
        Self {
            provider: ConnectionProvider::new(
                Arc::clone(&store),
                connector,
                settings.connection.connect_timeout(),
            ),
            store,
            synthesizer: DescriptionSynthesizer::new(&settings.sync),
            embeddings,
            locks: SyncLocks::new(),
            sync: settings.sync.clone(),
            diagram: settings.diagram.clone(),
        }
    }

    pub fn provider(&self) -> &ConnectionProvider<C> {
        &self.provider
    }

    pub fn synthesizer(&self) -> &DescriptionSynthesizer {
        &self.synthesizer
    }

    pub fn locks(&self) -> &SyncLocks {
        &self.locks
    }

    /// Run one sync for `profile_id`, waiting for any run already in flight
    /// for the same profile.
    pub async fn run(&self, profile_id: ProfileId) -> SyncReport {
        let _guard = self.locks.acquire(profile_id).await;

        let mut changelog = ChangeLog::default();
        let mut phases = PhaseTracker::new();
        info!(profile = %profile_id, "sync started");

        match self.sync(profile_id, &mut changelog, &mut phases).await {
            Ok(()) => {
                self.enter(&mut phases, SyncPhase::Succeeded);
                let message = format!("Metadata sync completed: {}", changelog.summary());
                info!(profile = %profile_id, summary = %changelog.summary(), "sync succeeded");
                SyncReport {
                    success: true,
                    message,
                    error_kind: None,
                    failed_phase: None,
                    changelog,
                }
            }
            Err(e) => {
                let phase = phases.fail();
                let error = if phase.follows_writes() {
                    SyncError::PartialSync {
                        phase,
                        source: Box::new(e),
                    }
                } else {
                    e
                };
                warn!(profile = %profile_id, %phase, error = %error, "sync failed");
                SyncReport {
                    success: false,
                    message: error.to_string(),
                    error_kind: Some(error.kind()),
                    failed_phase: Some(phase),
                    changelog,
                }
            }
        }
    }

    async fn sync(
        &self,
        profile_id: ProfileId,
        changelog: &mut ChangeLog,
        phases: &mut PhaseTracker,
    ) -> SyncResult<()> {
        let profile = match self.store.get_profile(profile_id) {
            Ok(profile) => profile,
            Err(e) if e.is_not_found() => return Err(SyncError::ProfileNotFound(profile_id)),
            Err(e) => return Err(e.into()),
        };

        self.enter(phases, SyncPhase::ExtractingTables);
        let tables = self.sync_tables(&profile, changelog).await?;

        self.enter(phases, SyncPhase::ExtractingColumns);
        self.sync_columns(&profile, &tables, changelog).await?;

        self.enter(phases, SyncPhase::ExtractingRelationships);
        self.sync_relationships(&profile, changelog).await?;

        self.enter(phases, SyncPhase::Finalizing);
        self.finalize(&profile)?;
        Ok(())
    }

    fn enter(&self, phases: &mut PhaseTracker, phase: SyncPhase) {
        if let Err(e) = phases.transition(phase) {
            warn!(error = %e, "unexpected sync phase order");
        }
        debug!(%phase, "entering sync phase");
    }

    // ========================================================================
    // Tables
    // ========================================================================

    /// Reconcile tables, returning the surviving records in catalog order.
    async fn sync_tables(
        &self,
        profile: &ConnectionProfile,
        changelog: &mut ChangeLog,
    ) -> SyncResult<Vec<TableRecord>> {
        let session = self.provider.open(profile).await?;
        let live = session.list_tables().await?;

        let mut stored: HashMap<(String, String), TableRecord> = self
            .store
            .list_tables(profile.id)?
            .into_iter()
            .map(|t| ((t.schema.clone(), t.name.clone()), t))
            .collect();

        let mut current = Vec::with_capacity(live.len());
        for lt in &live {
            let mut record = match stored.remove(&(lt.schema.clone(), lt.name.clone())) {
                Some(mut existing) => {
                    if existing.kind != lt.kind {
                        self.store.update_table_kind(existing.id, lt.kind)?;
                        changelog
                            .tables
                            .updated
                            .push(TableChange::kind_changed(&existing, lt.kind));
                        existing.kind = lt.kind;
                    }
                    existing
                }
                None => {
                    let record =
                        self.store
                            .insert_table(profile.id, &lt.schema, &lt.name, lt.kind)?;
                    changelog.tables.added.push(TableChange::added(&record));
                    record
                }
            };

            if record.description.is_empty() {
                let text = self.table_description(lt);
                self.store.set_table_description(record.id, &text)?;
                record.description = text;
            }

            if record.kind == TableKind::Table && self.sync.count_rows {
                self.refresh_row_count(&*session, &mut record, changelog)
                    .await?;
            }

            current.push(record);
        }

        let mut removed: Vec<TableRecord> = stored.into_values().collect();
        removed.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        for table in removed {
            self.evict_table(&table)?;
            self.store.delete_table(table.id)?;
            changelog
                .tables
                .removed
                .push(TableChange::removed(&table.schema, &table.name));
        }

        debug!(
            live = live.len(),
            added = changelog.tables.added.len(),
            updated = changelog.tables.updated.len(),
            removed = changelog.tables.removed.len(),
            "tables reconciled"
        );
        Ok(current)
    }

    /// Live comment first, then a synthesized sentence.
    fn table_description(&self, table: &LiveTable) -> String {
        match &table.comment {
            Some(comment) if !comment.trim().is_empty() => comment.clone(),
            _ => self.synthesizer.table_description(&table.schema, &table.name),
        }
    }

    async fn refresh_row_count<R: CatalogReader + ?Sized>(
        &self,
        reader: &R,
        record: &mut TableRecord,
        changelog: &mut ChangeLog,
    ) -> SyncResult<()> {
        match reader.row_count(&record.schema, &record.name).await {
            Ok(count) => {
                if record.row_count != Some(count) {
                    self.store.set_table_row_count(record.id, Some(count))?;
                    record.row_count = Some(count);
                }
            }
            Err(e) => {
                warn!(table = %record.qualified_name(), error = %e, "row count unavailable");
                changelog.skip(SkipKind::RowCount, record.qualified_name(), e);
            }
        }
        Ok(())
    }

    fn evict_table(&self, table: &TableRecord) -> Result<(), StoreError> {
        self.embeddings.evict(EmbeddingKey::Table(table.id));
        for column in self.store.list_columns(table.id)? {
            self.embeddings.evict(EmbeddingKey::Column(column.id));
        }
        Ok(())
    }

    // ========================================================================
    // Columns
    // ========================================================================

    async fn sync_columns(
        &self,
        profile: &ConnectionProfile,
        tables: &[TableRecord],
        changelog: &mut ChangeLog,
    ) -> SyncResult<()> {
        let session = self.provider.open(profile).await?;

        for table in tables {
            let live = session.list_columns(&table.schema, &table.name).await?;

            let mut stored: HashMap<String, ColumnRecord> = self
                .store
                .list_columns(table.id)?
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect();

            for lc in &live {
                let facts = lc.facts();
                let record = match stored.remove(&lc.name) {
                    Some(existing) => {
                        let before = existing.facts();
                        if before != facts {
                            self.store.update_column_facts(existing.id, &facts)?;
                            if let Some(drift) = ColumnDrift::between(&before, &facts) {
                                self.embeddings.evict(EmbeddingKey::Column(existing.id));
                                changelog.columns.updated.push(ColumnChange::updated(
                                    table,
                                    &lc.name,
                                    &lc.data_type,
                                    drift,
                                ));
                            }
                        }
                        existing
                    }
                    None => {
                        let record = self.store.insert_column(table.id, &facts)?;
                        changelog
                            .columns
                            .added
                            .push(ColumnChange::added(table, &record));
                        record
                    }
                };

                if record.description.is_empty() {
                    let text = match &lc.comment {
                        Some(comment) if !comment.trim().is_empty() => comment.clone(),
                        _ => {
                            let described = self
                                .synthesizer
                                .describe_column(&*session, &table.schema, &table.name, &facts)
                                .await;
                            if let Some(e) = described.sample_error {
                                changelog.skip(
                                    SkipKind::SampleValues,
                                    format!("{}.{}", table.qualified_name(), lc.name),
                                    e,
                                );
                            }
                            described.text
                        }
                    };
                    self.store.set_column_description(record.id, &text)?;
                }
            }

            let mut removed: Vec<ColumnRecord> = stored.into_values().collect();
            removed.sort_by_key(|c| c.ordinal);
            for column in removed {
                self.embeddings.evict(EmbeddingKey::Column(column.id));
                self.store.delete_column(column.id)?;
                changelog
                    .columns
                    .removed
                    .push(ColumnChange::removed(&table.qualified_name(), &column.name));
            }
        }

        debug!(
            added = changelog.columns.added.len(),
            updated = changelog.columns.updated.len(),
            removed = changelog.columns.removed.len(),
            "columns reconciled"
        );
        Ok(())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    async fn sync_relationships(
        &self,
        profile: &ConnectionProfile,
        changelog: &mut ChangeLog,
    ) -> SyncResult<()> {
        let live = {
            let session = self.provider.open(profile).await?;
            session.list_foreign_keys().await?
        };

        let mut stored: HashMap<(ColumnId, ColumnId), _> = self
            .store
            .list_relationships(profile.id)?
            .into_iter()
            .map(|r| ((r.from_column_id, r.to_column_id), r))
            .collect();

        let kind = RelationshipKind::ManyToOne;
        let mut seen = HashSet::new();

        for fk in &live {
            let from = self.store.find_column(
                profile.id,
                &fk.from_schema,
                &fk.from_table,
                &fk.from_column,
            )?;
            let to = self
                .store
                .find_column(profile.id, &fk.to_schema, &fk.to_table, &fk.to_column)?;

            let (Some(from), Some(to)) = (from, to) else {
                debug!(from = %fk.from_path(), to = %fk.to_path(), "foreign key endpoint not synced, skipping");
                changelog.skip(
                    SkipKind::ForeignKey,
                    format!("{} -> {}", fk.from_path(), fk.to_path()),
                    "endpoint not present in local metadata",
                );
                continue;
            };

            if !seen.insert((from, to)) {
                continue;
            }

            match stored.remove(&(from, to)) {
                Some(existing) => {
                    if existing.relationship_type != kind {
                        self.store.update_relationship_kind(existing.id, kind)?;
                        let mut change = RelationshipChange::from_foreign_key(fk, kind);
                        change.previous_kind = Some(existing.relationship_type);
                        changelog.relationships.updated.push(change);
                    }
                }
                None => {
                    self.store.insert_relationship(from, to, kind)?;
                    changelog
                        .relationships
                        .added
                        .push(RelationshipChange::from_foreign_key(fk, kind));
                }
            }
        }

        // Stored edges with no live foreign key: the constraint was dropped.
        let mut stale: Vec<_> = stored.into_values().collect();
        stale.sort_by_key(|r| r.id);
        for rel in stale {
            self.store.delete_relationship(rel.id)?;
            changelog
                .relationships
                .removed
                .push(RelationshipChange::from_view(&rel));
        }

        debug!(
            live = live.len(),
            added = changelog.relationships.added.len(),
            removed = changelog.relationships.removed.len(),
            "relationships reconciled"
        );
        Ok(())
    }

    // ========================================================================
    // Finalizing
    // ========================================================================

    fn finalize(&self, profile: &ConnectionProfile) -> SyncResult<()> {
        self.store.stamp_last_sync(profile.id)?;
        let graph = RelationshipGraph::build(&self.store, profile.id)?;
        let diagram = graph.to_diagram(profile.id, &self.diagram, unix_now());
        self.store.save_diagram(profile.id, &diagram)?;
        Ok(())
    }
}
