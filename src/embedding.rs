//! Placeholder embeddings.
//!
//! Each table and column gets an embedding document: its descriptive fields
//! plus a fixed-size vector derived from a SHA-256 of the document text. The
//! vector is a stand-in sized for a real embedding model; it carries no
//! semantic similarity.
//!
//! Documents are persisted on the owning record and cached in an
//! [`EmbeddingCache`] keyed by [`EmbeddingKey`]. Entries are evicted when the
//! record is deleted or its description is edited.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::describe::DescriptionSynthesizer;
use crate::store::{
    ColumnId, ColumnRecord, MetadataStore, ProfileId, StoreResult, TableId, TableRecord,
};

/// Length of placeholder vectors.
pub const EMBEDDING_DIM: usize = 16;

/// Identity of a cached embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingKey {
    Table(TableId),
    Column(ColumnId),
}

/// An embedding document as persisted on a table or column record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingDocument {
    Table {
        name: String,
        schema: String,
        description: String,
        vector: Vec<f32>,
    },
    Column {
        name: String,
        schema: String,
        table: String,
        data_type: String,
        is_primary_key: bool,
        is_foreign_key: bool,
        description: String,
        vector: Vec<f32>,
    },
}

impl EmbeddingDocument {
    pub fn for_table(table: &TableRecord, description: &str) -> Self {
        let text = format!("table {}.{}: {}", table.schema, table.name, description);
        Self::Table {
            name: table.name.clone(),
            schema: table.schema.clone(),
            description: description.to_string(),
            vector: placeholder_vector(&text),
        }
    }

    pub fn for_column(table: &TableRecord, column: &ColumnRecord, description: &str) -> Self {
        let text = format!(
            "column {}.{}.{} {}: {}",
            table.schema, table.name, column.name, column.data_type, description
        );
        Self::Column {
            name: column.name.clone(),
            schema: table.schema.clone(),
            table: table.name.clone(),
            data_type: column.data_type.clone(),
            is_primary_key: column.is_primary_key,
            is_foreign_key: column.is_foreign_key,
            description: description.to_string(),
            vector: placeholder_vector(&text),
        }
    }

    pub fn vector(&self) -> &[f32] {
        match self {
            Self::Table { vector, .. } | Self::Column { vector, .. } => vector,
        }
    }
}

/// Deterministic vector in `[-1, 1]` derived from the SHA-256 of `text`.
pub fn placeholder_vector(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    digest
        .iter()
        .take(EMBEDDING_DIM)
        .map(|b| f32::from(*b) / 127.5 - 1.0)
        .collect()
}

/// In-memory embedding cache.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: DashMap<EmbeddingKey, EmbeddingDocument>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: EmbeddingKey) -> Option<EmbeddingDocument> {
        self.entries.get(&key).map(|e| e.value().clone())
    }

    pub fn insert(&self, key: EmbeddingKey, document: EmbeddingDocument) {
        self.entries.insert(key, document);
    }

    /// Returns true if an entry was removed.
    pub fn evict(&self, key: EmbeddingKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Evict every entry belonging to a profile's current records.
    pub fn evict_profile(&self, store: &MetadataStore, profile: ProfileId) -> StoreResult<usize> {
        let mut evicted = 0;
        for table in store.list_tables(profile)? {
            evicted += usize::from(self.evict(EmbeddingKey::Table(table.id)));
        }
        for column in store.column_ids_for_profile(profile)? {
            evicted += usize::from(self.evict(EmbeddingKey::Column(column)));
        }
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counts from one embedding refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingStats {
    pub tables: usize,
    pub columns: usize,
}

/// Regenerate, persist and cache embeddings for every table and column of a
/// profile. Records with an empty description get a synthesized one first.
pub fn update_embeddings(
    store: &MetadataStore,
    cache: &EmbeddingCache,
    synthesizer: &DescriptionSynthesizer,
    profile: ProfileId,
) -> StoreResult<EmbeddingStats> {
    cache.evict_profile(store, profile)?;

    let mut stats = EmbeddingStats::default();
    for table in store.list_tables(profile)? {
        let description = if table.description.is_empty() {
            let text = synthesizer.table_description(&table.schema, &table.name);
            store.set_table_description(table.id, &text)?;
            text
        } else {
            table.description.clone()
        };

        let doc = EmbeddingDocument::for_table(&table, &description);
        store.set_table_embedding(table.id, &serde_json::to_value(&doc)?)?;
        cache.insert(EmbeddingKey::Table(table.id), doc);
        stats.tables += 1;

        for column in store.list_columns(table.id)? {
            let description = if column.description.is_empty() {
                let text = synthesizer.column_description(&column.facts(), &[]);
                store.set_column_description(column.id, &text)?;
                text
            } else {
                column.description.clone()
            };

            let doc = EmbeddingDocument::for_column(&table, &column, &description);
            store.set_column_embedding(column.id, &serde_json::to_value(&doc)?)?;
            cache.insert(EmbeddingKey::Column(column.id), doc);
            stats.columns += 1;
        }
    }

    debug!(profile = %profile, tables = stats.tables, columns = stats.columns, "embeddings updated");
    Ok(stats)
}

/// Look up an embedding, falling back to the persisted document on a cache miss.
pub fn embedding_for(
    store: &MetadataStore,
    cache: &EmbeddingCache,
    key: EmbeddingKey,
) -> StoreResult<Option<EmbeddingDocument>> {
    if let Some(doc) = cache.get(key) {
        return Ok(Some(doc));
    }

    let stored = match key {
        EmbeddingKey::Table(id) => store.get_table(id)?.embedding,
        EmbeddingKey::Column(id) => store.get_column(id)?.embedding,
    };
    let Some(value) = stored else {
        return Ok(None);
    };

    let doc: EmbeddingDocument = serde_json::from_value(value)?;
    cache.insert(key, doc.clone());
    Ok(Some(doc))
}
