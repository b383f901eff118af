//! Table, column and relationship persistence.

use rusqlite::{params, OptionalExtension, Row};

use super::{
    ColumnFacts, ColumnId, ColumnRecord, MetadataStore, ProfileId, RelationshipId,
    RelationshipKind, RelationshipRecord, RelationshipView, StoreError, StoreResult, TableId,
    TableKind, TableRecord,
};

const TABLE_COLUMNS: &str =
    "id, profile_id, schema_name, table_name, kind, row_count, description, embedding";

const COLUMN_COLUMNS: &str = "id, table_id, column_name, ordinal, data_type, is_nullable, \
                              is_primary_key, is_foreign_key, description, embedding";

fn table_from_row(row: &Row<'_>) -> rusqlite::Result<TableRecord> {
    Ok(TableRecord {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        schema: row.get(2)?,
        name: row.get(3)?,
        kind: row.get(4)?,
        row_count: row.get(5)?,
        description: row.get(6)?,
        embedding: row.get(7)?,
    })
}

fn column_from_row(row: &Row<'_>) -> rusqlite::Result<ColumnRecord> {
    Ok(ColumnRecord {
        id: row.get(0)?,
        table_id: row.get(1)?,
        name: row.get(2)?,
        ordinal: row.get(3)?,
        data_type: row.get(4)?,
        nullable: row.get(5)?,
        is_primary_key: row.get(6)?,
        is_foreign_key: row.get(7)?,
        description: row.get(8)?,
        embedding: row.get(9)?,
    })
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<RelationshipRecord> {
    Ok(RelationshipRecord {
        id: row.get(0)?,
        from_column: row.get(1)?,
        to_column: row.get(2)?,
        kind: row.get(3)?,
    })
}

fn expect_one(rows: usize, entity: &'static str, id: i64) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::not_found(entity, id))
    } else {
        Ok(())
    }
}

// ============================================================================
// Tables
// ============================================================================

impl MetadataStore {
    /// All tables stored for a profile, ordered by (schema, name).
    pub fn list_tables(&self, profile: ProfileId) -> StoreResult<Vec<TableRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TABLE_COLUMNS} FROM tables WHERE profile_id = ?
             ORDER BY schema_name, table_name"
        ))?;
        let tables = stmt
            .query_map(params![profile], table_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    /// Look up a table by its identity triple.
    pub fn find_table(
        &self,
        profile: ProfileId,
        schema: &str,
        name: &str,
    ) -> StoreResult<Option<TableRecord>> {
        let table = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT {TABLE_COLUMNS} FROM tables
                     WHERE profile_id = ? AND schema_name = ? AND table_name = ?"
                ),
                params![profile, schema, name],
                table_from_row,
            )
            .optional()?;
        Ok(table)
    }

    pub fn get_table(&self, id: TableId) -> StoreResult<TableRecord> {
        self.conn()?
            .query_row(
                &format!("SELECT {TABLE_COLUMNS} FROM tables WHERE id = ?"),
                params![id],
                table_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("table", id.0))
    }

    /// Insert a new table record with an empty description.
    pub fn insert_table(
        &self,
        profile: ProfileId,
        schema: &str,
        name: &str,
        kind: TableKind,
    ) -> StoreResult<TableRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tables (profile_id, schema_name, table_name, kind) VALUES (?, ?, ?, ?)",
            params![profile, schema, name, kind],
        )?;
        Ok(TableRecord {
            id: TableId(conn.last_insert_rowid()),
            profile_id: profile,
            schema: schema.to_string(),
            name: name.to_string(),
            kind,
            row_count: None,
            description: String::new(),
            embedding: None,
        })
    }

    pub fn update_table_kind(&self, id: TableId, kind: TableKind) -> StoreResult<()> {
        let rows = self
            .conn()?
            .execute("UPDATE tables SET kind = ? WHERE id = ?", params![kind, id])?;
        expect_one(rows, "table", id.0)
    }

    pub fn set_table_row_count(&self, id: TableId, row_count: Option<i64>) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE tables SET row_count = ? WHERE id = ?",
            params![row_count, id],
        )?;
        expect_one(rows, "table", id.0)
    }

    /// Overwrite a table description unconditionally. Clears the persisted embedding.
    pub fn set_table_description(&self, id: TableId, description: &str) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE tables SET description = ?, embedding = NULL WHERE id = ?",
            params![description, id],
        )?;
        expect_one(rows, "table", id.0)
    }

    pub fn set_table_embedding(&self, id: TableId, embedding: &serde_json::Value) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE tables SET embedding = ? WHERE id = ?",
            params![embedding, id],
        )?;
        expect_one(rows, "table", id.0)
    }

    /// Delete a table; its columns and their relationships cascade.
    pub fn delete_table(&self, id: TableId) -> StoreResult<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM tables WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }
}

// ============================================================================
// Columns
// ============================================================================

impl MetadataStore {
    /// Columns of a table in physical ordinal order.
    pub fn list_columns(&self, table: TableId) -> StoreResult<Vec<ColumnRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMN_COLUMNS} FROM columns WHERE table_id = ? ORDER BY ordinal, id"
        ))?;
        let columns = stmt
            .query_map(params![table], column_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Every column id belonging to a profile.
    pub fn column_ids_for_profile(&self, profile: ProfileId) -> StoreResult<Vec<ColumnId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id FROM columns c JOIN tables t ON t.id = c.table_id
             WHERE t.profile_id = ? ORDER BY c.id",
        )?;
        let ids = stmt
            .query_map(params![profile], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn get_column(&self, id: ColumnId) -> StoreResult<ColumnRecord> {
        self.conn()?
            .query_row(
                &format!("SELECT {COLUMN_COLUMNS} FROM columns WHERE id = ?"),
                params![id],
                column_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("column", id.0))
    }

    /// Resolve a column by its fully qualified external name.
    pub fn find_column(
        &self,
        profile: ProfileId,
        schema: &str,
        table: &str,
        column: &str,
    ) -> StoreResult<Option<ColumnId>> {
        let id = self
            .conn()?
            .query_row(
                "SELECT c.id FROM columns c JOIN tables t ON t.id = c.table_id
                 WHERE t.profile_id = ? AND t.schema_name = ? AND t.table_name = ?
                   AND c.column_name = ?",
                params![profile, schema, table, column],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Insert a new column record with an empty description.
    pub fn insert_column(&self, table: TableId, facts: &ColumnFacts) -> StoreResult<ColumnRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO columns (table_id, column_name, ordinal, data_type, is_nullable, is_primary_key, is_foreign_key)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                table,
                facts.name,
                facts.ordinal,
                facts.data_type,
                facts.nullable,
                facts.is_primary_key,
                facts.is_foreign_key,
            ],
        )?;
        Ok(ColumnRecord {
            id: ColumnId(conn.last_insert_rowid()),
            table_id: table,
            name: facts.name.clone(),
            ordinal: facts.ordinal,
            data_type: facts.data_type.clone(),
            nullable: facts.nullable,
            is_primary_key: facts.is_primary_key,
            is_foreign_key: facts.is_foreign_key,
            description: String::new(),
            embedding: None,
        })
    }

    /// Replace the structural facts of a column, leaving its description alone.
    /// The persisted embedding is cleared since it embeds the old facts.
    pub fn update_column_facts(&self, id: ColumnId, facts: &ColumnFacts) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE columns SET ordinal = ?, data_type = ?, is_nullable = ?, is_primary_key = ?, is_foreign_key = ?,
                embedding = NULL
             WHERE id = ?",
            params![
                facts.ordinal,
                facts.data_type,
                facts.nullable,
                facts.is_primary_key,
                facts.is_foreign_key,
                id,
            ],
        )?;
        expect_one(rows, "column", id.0)
    }

    /// Overwrite a column description unconditionally. Clears the persisted embedding.
    pub fn set_column_description(&self, id: ColumnId, description: &str) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE columns SET description = ?, embedding = NULL WHERE id = ?",
            params![description, id],
        )?;
        expect_one(rows, "column", id.0)
    }

    pub fn set_column_embedding(
        &self,
        id: ColumnId,
        embedding: &serde_json::Value,
    ) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE columns SET embedding = ? WHERE id = ?",
            params![embedding, id],
        )?;
        expect_one(rows, "column", id.0)
    }

    /// Delete a column; relationships touching it cascade.
    pub fn delete_column(&self, id: ColumnId) -> StoreResult<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM columns WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }
}

// ============================================================================
// Relationships
// ============================================================================

impl MetadataStore {
    /// Every relationship whose source column belongs to the profile, with
    /// endpoint names resolved.
    pub fn list_relationships(&self, profile: ProfileId) -> StoreResult<Vec<RelationshipView>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.from_column_id, r.to_column_id,
                    ft.schema_name, ft.table_name, fc.column_name,
                    tt.schema_name, tt.table_name, tc.column_name,
                    r.kind
             FROM relationships r
             JOIN columns fc ON fc.id = r.from_column_id
             JOIN tables ft ON ft.id = fc.table_id
             JOIN columns tc ON tc.id = r.to_column_id
             JOIN tables tt ON tt.id = tc.table_id
             WHERE ft.profile_id = ?
             ORDER BY ft.schema_name, ft.table_name, fc.ordinal, r.id",
        )?;

        let views = stmt
            .query_map(params![profile], |row| {
                Ok(RelationshipView {
                    id: row.get(0)?,
                    from_column_id: row.get(1)?,
                    to_column_id: row.get(2)?,
                    from_schema: row.get(3)?,
                    from_table: row.get(4)?,
                    from_column: row.get(5)?,
                    to_schema: row.get(6)?,
                    to_table: row.get(7)?,
                    to_column: row.get(8)?,
                    relationship_type: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(views)
    }

    pub fn find_relationship(
        &self,
        from: ColumnId,
        to: ColumnId,
    ) -> StoreResult<Option<RelationshipRecord>> {
        let rel = self
            .conn()?
            .query_row(
                "SELECT id, from_column_id, to_column_id, kind FROM relationships
                 WHERE from_column_id = ? AND to_column_id = ?",
                params![from, to],
                relationship_from_row,
            )
            .optional()?;
        Ok(rel)
    }

    pub fn insert_relationship(
        &self,
        from: ColumnId,
        to: ColumnId,
        kind: RelationshipKind,
    ) -> StoreResult<RelationshipRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO relationships (from_column_id, to_column_id, kind) VALUES (?, ?, ?)",
            params![from, to, kind],
        )?;
        Ok(RelationshipRecord {
            id: RelationshipId(conn.last_insert_rowid()),
            from_column: from,
            to_column: to,
            kind,
        })
    }

    pub fn update_relationship_kind(
        &self,
        id: RelationshipId,
        kind: RelationshipKind,
    ) -> StoreResult<()> {
        let rows = self.conn()?.execute(
            "UPDATE relationships SET kind = ? WHERE id = ?",
            params![kind, id],
        )?;
        expect_one(rows, "relationship", id.0)
    }

    pub fn delete_relationship(&self, id: RelationshipId) -> StoreResult<bool> {
        let rows = self
            .conn()?
            .execute("DELETE FROM relationships WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }
}
