//! Catalog introspection.
//!
//! A [`CatalogReader`] is a live session against an external database. It
//! returns plain records (tables, columns, foreign keys, row counts, sample
//! values) and does no persistence or diffing; that is the reconciler's job.
//!
//! # Implementations
//!
//! - [`PgCatalog`]: PostgreSQL via `information_schema` and `pg_catalog`
//! - [`memory::MemoryCatalog`]: scriptable in-memory catalog with failure
//!   injection, used to exercise the reconciler without a server

pub mod memory;
mod postgres;
mod types;

pub use postgres::PgCatalog;
pub use types::*;

use async_trait::async_trait;

/// Error from a single introspection query.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog query '{operation}' failed: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },
}

impl CatalogError {
    pub fn query(operation: &'static str, message: impl ToString) -> Self {
        Self::Query {
            operation,
            message: message.to_string(),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// A live catalog session.
///
/// Sessions are short-lived: the reconciler opens one per phase and drops it
/// before the next phase starts.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Cheap round trip (`SELECT 1`).
    async fn ping(&self) -> CatalogResult<()>;

    /// All tables, views and materialized views outside system schemas,
    /// ordered by (schema, name).
    async fn list_tables(&self) -> CatalogResult<Vec<LiveTable>>;

    /// Columns of one table in physical ordinal order, with primary and
    /// foreign key flags resolved from constraints.
    async fn list_columns(&self, schema: &str, table: &str) -> CatalogResult<Vec<LiveColumn>>;

    /// Every foreign key column pair across the database, in one pass.
    async fn list_foreign_keys(&self) -> CatalogResult<Vec<LiveForeignKey>>;

    /// Exact row count of a table. Callers treat this as advisory.
    async fn row_count(&self, schema: &str, table: &str) -> CatalogResult<i64>;

    /// Up to `limit` distinct non-null values of a column, rendered as text.
    async fn sample_distinct_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        limit: u32,
    ) -> CatalogResult<Vec<String>>;
}

/// Quote an identifier for PostgreSQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
