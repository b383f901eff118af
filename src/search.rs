//! Keyword search over stored metadata.
//!
//! Scoring is case-insensitive substring matching:
//!
//! | match                   | score |
//! |-------------------------|-------|
//! | table name              | +5    |
//! | table description       | +3    |
//! | column name             | +4    |
//! | column description      | +2    |
//! | column data type        | +1    |
//!
//! Hits are sorted by score, highest first; equal scores keep catalog order
//! (tables before columns, then schema, table and ordinal).

use serde::Serialize;

use crate::store::{ColumnId, MetadataStore, ProfileId, StoreResult, TableId};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchHit {
    Table {
        id: TableId,
        name: String,
        schema: String,
        description: String,
        score: u32,
    },
    Column {
        id: ColumnId,
        name: String,
        table_name: String,
        schema: String,
        data_type: String,
        description: String,
        score: u32,
    },
}

impl SearchHit {
    pub fn score(&self) -> u32 {
        match self {
            SearchHit::Table { score, .. } | SearchHit::Column { score, .. } => *score,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SearchHit::Table { name, .. } | SearchHit::Column { name, .. } => name,
        }
    }
}

/// Search a profile's tables and columns for `query`.
pub fn search_metadata(
    store: &MetadataStore,
    profile: ProfileId,
    query: &str,
    limit: usize,
) -> StoreResult<Vec<SearchHit>> {
    let needle = query.to_lowercase();
    let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);

    let tables = store.list_tables(profile)?;
    let mut hits = Vec::new();

    for table in &tables {
        let score = 5 * u32::from(contains(&table.name))
            + 3 * u32::from(!table.description.is_empty() && contains(&table.description));
        if score > 0 {
            hits.push(SearchHit::Table {
                id: table.id,
                name: table.name.clone(),
                schema: table.schema.clone(),
                description: table.description.clone(),
                score,
            });
        }
    }

    for table in &tables {
        for column in store.list_columns(table.id)? {
            let score = 4 * u32::from(contains(&column.name))
                + 2 * u32::from(!column.description.is_empty() && contains(&column.description))
                + u32::from(contains(&column.data_type));
            if score > 0 {
                hits.push(SearchHit::Column {
                    id: column.id,
                    name: column.name,
                    table_name: table.name.clone(),
                    schema: table.schema.clone(),
                    data_type: column.data_type,
                    description: column.description,
                    score,
                });
            }
        }
    }

    // stable: ties keep catalog order
    hits.sort_by(|a, b| b.score().cmp(&a.score()));
    hits.truncate(limit);
    Ok(hits)
}
