//! Schema summary fed into LLM prompt construction.
//!
//! The field names and nesting here are a contract with prompt builders:
//!
//! ```json
//! [{"schema": "public", "table": "users", "description": "...",
//!   "columns": [{"name": "id", "type": "integer", "nullable": false,
//!                "pk": true, "fk": false, "description": "..."}]}]
//! ```

use serde::Serialize;

use crate::store::{ColumnRecord, MetadataStore, ProfileId, StoreResult, TableRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub schema: String,
    pub table: String,
    pub description: String,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub pk: bool,
    pub fk: bool,
    pub description: String,
}

impl TableSummary {
    fn new(table: TableRecord, columns: Vec<ColumnRecord>) -> Self {
        Self {
            schema: table.schema,
            table: table.name,
            description: table.description,
            columns: columns.into_iter().map(ColumnSummary::from).collect(),
        }
    }
}

impl From<ColumnRecord> for ColumnSummary {
    fn from(column: ColumnRecord) -> Self {
        Self {
            name: column.name,
            data_type: column.data_type,
            nullable: column.nullable,
            pk: column.is_primary_key,
            fk: column.is_foreign_key,
            description: column.description,
        }
    }
}

/// Tables ordered by (schema, name), columns by ordinal position.
pub fn schema_summary(store: &MetadataStore, profile: ProfileId) -> StoreResult<Vec<TableSummary>> {
    store
        .list_tables(profile)?
        .into_iter()
        .map(|table| {
            let columns = store.list_columns(table.id)?;
            Ok(TableSummary::new(table, columns))
        })
        .collect()
}
