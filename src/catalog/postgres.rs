//! PostgreSQL catalog reader.

use async_trait::async_trait;
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, Row};
use tracing::debug;

use super::{quote_ident, CatalogError, CatalogReader, CatalogResult, LiveColumn, LiveForeignKey, LiveTable};
use crate::store::TableKind;

// Comments are looked up by joining pg_class on name; a regclass cast would
// fail on schemas the reader lacks USAGE on.
const LIST_TABLES: &str = r#"
    SELECT t.table_schema::text, t.table_name::text, t.table_type::text,
           obj_description(c.oid, 'pg_class')
    FROM information_schema.tables t
    LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = t.table_schema
    LEFT JOIN pg_catalog.pg_class c ON c.relnamespace = n.oid AND c.relname = t.table_name
    WHERE t.table_schema NOT IN ('pg_catalog', 'information_schema')
    UNION ALL
    SELECT m.schemaname::text, m.matviewname::text, 'MATERIALIZED VIEW',
           obj_description(c.oid, 'pg_class')
    FROM pg_catalog.pg_matviews m
    LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = m.schemaname
    LEFT JOIN pg_catalog.pg_class c ON c.relnamespace = n.oid AND c.relname = m.matviewname
    WHERE m.schemaname NOT IN ('pg_catalog', 'information_schema')
    ORDER BY 1, 2
"#;

// pg_attribute rather than information_schema.columns so materialized views
// are covered too.
const LIST_COLUMNS: &str = r#"
    SELECT a.attname::text,
           a.attnum::int4,
           format_type(a.atttypid, a.atttypmod),
           NOT a.attnotnull,
           pg_get_expr(d.adbin, d.adrelid),
           col_description(c.oid, a.attnum),
           EXISTS (SELECT 1 FROM pg_catalog.pg_constraint k
                   WHERE k.conrelid = c.oid AND k.contype = 'p' AND a.attnum = ANY(k.conkey)),
           EXISTS (SELECT 1 FROM pg_catalog.pg_constraint k
                   WHERE k.conrelid = c.oid AND k.contype = 'f' AND a.attnum = ANY(k.conkey))
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

// conkey/confkey are unnested in lockstep so composite keys pair up correctly.
const LIST_FOREIGN_KEYS: &str = r#"
    SELECT n.nspname::text, t.relname::text, a.attname::text,
           rn.nspname::text, rt.relname::text, ra.attname::text
    FROM pg_catalog.pg_constraint c
    JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
    JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
    CROSS JOIN LATERAL unnest(c.conkey, c.confkey) AS k(attnum, ref_attnum)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.ref_attnum
    WHERE c.contype = 'f'
      AND n.nspname NOT IN ('pg_catalog', 'information_schema')
    ORDER BY 1, 2, c.conname, 3
"#;

/// A live PostgreSQL session.
pub struct PgCatalog {
    client: Client,
}

impl PgCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn query(
        &self,
        operation: &'static str,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> CatalogResult<Vec<Row>> {
        self.client
            .query(sql, params)
            .await
            .map_err(|e| CatalogError::query(operation, e))
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, operation: &'static str) -> CatalogResult<T> {
    row.try_get(idx).map_err(|e| CatalogError::query(operation, e))
}

#[async_trait]
impl CatalogReader for PgCatalog {
    async fn ping(&self) -> CatalogResult<()> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| CatalogError::query("ping", e))?;
        Ok(())
    }

    async fn list_tables(&self) -> CatalogResult<Vec<LiveTable>> {
        const OP: &str = "list_tables";
        let rows = self.query(OP, LIST_TABLES, &[]).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let table_type: String = get(row, 2, OP)?;
            tables.push(LiveTable {
                schema: get(row, 0, OP)?,
                name: get(row, 1, OP)?,
                kind: TableKind::from_catalog(&table_type),
                comment: get(row, 3, OP)?,
            });
        }

        debug!(count = tables.len(), "listed catalog tables");
        Ok(tables)
    }

    async fn list_columns(&self, schema: &str, table: &str) -> CatalogResult<Vec<LiveColumn>> {
        const OP: &str = "list_columns";
        let rows = self.query(OP, LIST_COLUMNS, &[&schema, &table]).await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            columns.push(LiveColumn {
                name: get(row, 0, OP)?,
                ordinal: get(row, 1, OP)?,
                data_type: get(row, 2, OP)?,
                nullable: get(row, 3, OP)?,
                default: get(row, 4, OP)?,
                comment: get(row, 5, OP)?,
                is_primary_key: get(row, 6, OP)?,
                is_foreign_key: get(row, 7, OP)?,
            });
        }

        debug!(schema, table, count = columns.len(), "listed catalog columns");
        Ok(columns)
    }

    async fn list_foreign_keys(&self) -> CatalogResult<Vec<LiveForeignKey>> {
        const OP: &str = "list_foreign_keys";
        let rows = self.query(OP, LIST_FOREIGN_KEYS, &[]).await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            keys.push(LiveForeignKey {
                from_schema: get(row, 0, OP)?,
                from_table: get(row, 1, OP)?,
                from_column: get(row, 2, OP)?,
                to_schema: get(row, 3, OP)?,
                to_table: get(row, 4, OP)?,
                to_column: get(row, 5, OP)?,
            });
        }

        debug!(count = keys.len(), "listed catalog foreign keys");
        Ok(keys)
    }

    async fn row_count(&self, schema: &str, table: &str) -> CatalogResult<i64> {
        const OP: &str = "row_count";
        let sql = format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_ident(schema),
            quote_ident(table)
        );
        let rows = self.query(OP, &sql, &[]).await?;
        match rows.first() {
            Some(row) => get(row, 0, OP),
            None => Err(CatalogError::query(OP, "count returned no rows")),
        }
    }

    async fn sample_distinct_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        limit: u32,
    ) -> CatalogResult<Vec<String>> {
        const OP: &str = "sample_distinct_values";
        let col = quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT ({col})::text FROM {}.{} WHERE {col} IS NOT NULL LIMIT {limit}",
            quote_ident(schema),
            quote_ident(table),
        );
        let rows = self.query(OP, &sql, &[]).await?;
        rows.iter().map(|row| get(row, 0, OP)).collect()
    }
}
