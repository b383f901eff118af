//! In-memory catalog.
//!
//! A [`MemoryCatalog`] is both a [`Connector`] and, through its sessions, a
//! [`CatalogReader`]. Tests script the "external" database on it, mutate it
//! between syncs, and inject failures per operation.
//!
//! ```ignore
//! let catalog = MemoryCatalog::new();
//! catalog.add_table("public", "users", TableKind::Table);
//! catalog.add_column("public", "users", LiveColumn::new("id", "integer").primary_key());
//! catalog.fail_on(CatalogOp::SampleValues, "network blip");
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{CatalogError, CatalogReader, CatalogResult, LiveColumn, LiveForeignKey, LiveTable};
use crate::config::ConnectParams;
use crate::connection::{ConnectError, ConnectResult, Connector};
use crate::store::TableKind;

/// Catalog operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogOp {
    Ping,
    ListTables,
    ListColumns,
    ListForeignKeys,
    RowCount,
    SampleValues,
}

impl CatalogOp {
    fn name(&self) -> &'static str {
        match self {
            CatalogOp::Ping => "ping",
            CatalogOp::ListTables => "list_tables",
            CatalogOp::ListColumns => "list_columns",
            CatalogOp::ListForeignKeys => "list_foreign_keys",
            CatalogOp::RowCount => "row_count",
            CatalogOp::SampleValues => "sample_distinct_values",
        }
    }
}

#[derive(Debug, Clone)]
struct FixtureTable {
    table: LiveTable,
    columns: Vec<LiveColumn>,
    row_count: i64,
    samples: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
struct Fixture {
    tables: Vec<FixtureTable>,
    foreign_keys: Vec<LiveForeignKey>,
    connect_failure: Option<String>,
    failures: HashMap<CatalogOp, String>,
    connect_delay: Option<Duration>,
    query_delay: Option<Duration>,
    connects: usize,
    active: usize,
    max_active: usize,
}

impl Fixture {
    fn table(&self, schema: &str, name: &str) -> Option<&FixtureTable> {
        self.tables
            .iter()
            .find(|t| t.table.schema == schema && t.table.name == name)
    }

    fn table_mut(&mut self, schema: &str, name: &str) -> Option<&mut FixtureTable> {
        self.tables
            .iter_mut()
            .find(|t| t.table.schema == schema && t.table.name == name)
    }
}

/// Scriptable in-memory external database.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<Fixture>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Fixture> {
        // A panicking test thread must not hide the fixture from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Schema scripting
    // ========================================================================

    /// Create a table (or replace its kind if it already exists).
    pub fn add_table(&self, schema: &str, name: &str, kind: TableKind) {
        let mut state = self.lock();
        if let Some(existing) = state.table_mut(schema, name) {
            existing.table.kind = kind;
            return;
        }
        state.tables.push(FixtureTable {
            table: LiveTable::new(schema, name, kind),
            columns: Vec::new(),
            row_count: 0,
            samples: HashMap::new(),
        });
    }

    pub fn set_table_kind(&self, schema: &str, name: &str, kind: TableKind) {
        if let Some(t) = self.lock().table_mut(schema, name) {
            t.table.kind = kind;
        }
    }

    pub fn set_table_comment(&self, schema: &str, name: &str, comment: &str) {
        if let Some(t) = self.lock().table_mut(schema, name) {
            t.table.comment = Some(comment.to_string());
        }
    }

    pub fn set_row_count(&self, schema: &str, name: &str, rows: i64) {
        if let Some(t) = self.lock().table_mut(schema, name) {
            t.row_count = rows;
        }
    }

    /// Drop a table along with every foreign key from or to it.
    pub fn drop_table(&self, schema: &str, name: &str) {
        let mut state = self.lock();
        state
            .tables
            .retain(|t| !(t.table.schema == schema && t.table.name == name));
        state.foreign_keys.retain(|fk| {
            !(fk.from_schema == schema && fk.from_table == name)
                && !(fk.to_schema == schema && fk.to_table == name)
        });
    }

    /// Append a column; its ordinal is its position in the table.
    pub fn add_column(&self, schema: &str, table: &str, mut column: LiveColumn) {
        if let Some(t) = self.lock().table_mut(schema, table) {
            column.ordinal = t.columns.len() as i32 + 1;
            t.columns.push(column);
        }
    }

    /// Change a column in place.
    pub fn alter_column(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        alter: impl FnOnce(&mut LiveColumn),
    ) {
        if let Some(t) = self.lock().table_mut(schema, table) {
            if let Some(c) = t.columns.iter_mut().find(|c| c.name == column) {
                alter(c);
            }
        }
    }

    /// Drop a column along with every foreign key touching it.
    pub fn drop_column(&self, schema: &str, table: &str, column: &str) {
        let mut state = self.lock();
        if let Some(t) = state.table_mut(schema, table) {
            t.columns.retain(|c| c.name != column);
            t.samples.remove(column);
        }
        state.foreign_keys.retain(|fk| {
            !(fk.from_schema == schema && fk.from_table == table && fk.from_column == column)
                && !(fk.to_schema == schema && fk.to_table == table && fk.to_column == column)
        });
    }

    /// Declare a foreign key between two `schema.table.column` paths.
    ///
    /// Endpoints need not exist, which is how orphan keys are scripted.
    pub fn add_foreign_key(&self, from: &str, to: &str) {
        if let Some(fk) = LiveForeignKey::parse(from, to) {
            self.lock().foreign_keys.push(fk);
        }
    }

    /// Drop the foreign key constraint on a `schema.table.column` path.
    pub fn drop_foreign_key(&self, from: &str) {
        self.lock().foreign_keys.retain(|fk| fk.from_path() != from);
    }

    pub fn set_samples(&self, schema: &str, table: &str, column: &str, values: &[&str]) {
        if let Some(t) = self.lock().table_mut(schema, table) {
            t.samples.insert(
                column.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
    }

    // ========================================================================
    // Failure injection and observation
    // ========================================================================

    pub fn fail_connect(&self, message: &str) {
        self.lock().connect_failure = Some(message.to_string());
    }

    pub fn fail_on(&self, op: CatalogOp, message: &str) {
        self.lock().failures.insert(op, message.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.connect_failure = None;
        state.failures.clear();
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = Some(delay);
    }

    /// Delay every `list_tables` call, to widen race windows.
    pub fn set_query_delay(&self, delay: Duration) {
        self.lock().query_delay = Some(delay);
    }

    /// Number of sessions opened so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.lock().active
    }

    /// Highest number of sessions open at the same time.
    pub fn max_active_sessions(&self) -> usize {
        self.lock().max_active
    }
}

#[async_trait]
impl Connector for MemoryCatalog {
    type Session = MemorySession;

    async fn connect(&self, params: &ConnectParams) -> ConnectResult<MemorySession> {
        let delay = self.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(message) = &state.connect_failure {
            return Err(ConnectError::failed(params, message));
        }
        state.connects += 1;
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
        drop(state);

        Ok(MemorySession {
            catalog: self.clone(),
        })
    }
}

/// A session on a [`MemoryCatalog`].
#[derive(Debug)]
pub struct MemorySession {
    catalog: MemoryCatalog,
}

impl MemorySession {
    fn check(&self, op: CatalogOp) -> CatalogResult<MutexGuard<'_, Fixture>> {
        let state = self.catalog.lock();
        match state.failures.get(&op) {
            Some(message) => Err(CatalogError::query(op.name(), message)),
            None => Ok(state),
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let mut state = self.catalog.lock();
        state.active = state.active.saturating_sub(1);
    }
}

#[async_trait]
impl CatalogReader for MemorySession {
    async fn ping(&self) -> CatalogResult<()> {
        self.check(CatalogOp::Ping).map(|_| ())
    }

    async fn list_tables(&self) -> CatalogResult<Vec<LiveTable>> {
        let delay = self.catalog.lock().query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.check(CatalogOp::ListTables)?;
        let mut tables: Vec<LiveTable> = state.tables.iter().map(|t| t.table.clone()).collect();
        tables.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        Ok(tables)
    }

    async fn list_columns(&self, schema: &str, table: &str) -> CatalogResult<Vec<LiveColumn>> {
        let state = self.check(CatalogOp::ListColumns)?;
        let Some(t) = state.table(schema, table) else {
            return Ok(Vec::new());
        };

        // Key flags come from constraints, the way a real catalog reports them.
        let columns = t
            .columns
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.is_foreign_key = state.foreign_keys.iter().any(|fk| {
                    fk.from_schema == schema && fk.from_table == table && fk.from_column == c.name
                });
                c
            })
            .collect();
        Ok(columns)
    }

    async fn list_foreign_keys(&self) -> CatalogResult<Vec<LiveForeignKey>> {
        let state = self.check(CatalogOp::ListForeignKeys)?;
        Ok(state.foreign_keys.clone())
    }

    async fn row_count(&self, schema: &str, table: &str) -> CatalogResult<i64> {
        let state = self.check(CatalogOp::RowCount)?;
        state
            .table(schema, table)
            .map(|t| t.row_count)
            .ok_or_else(|| CatalogError::query("row_count", format!("relation {schema}.{table} does not exist")))
    }

    async fn sample_distinct_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        limit: u32,
    ) -> CatalogResult<Vec<String>> {
        let state = self.check(CatalogOp::SampleValues)?;
        let values = state
            .table(schema, table)
            .and_then(|t| t.samples.get(column))
            .map(|v| v.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default();
        Ok(values)
    }
}
