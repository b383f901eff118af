//! Plain records returned by catalog introspection.

use serde::{Deserialize, Serialize};

use crate::store::{ColumnFacts, TableKind};

/// A table, view or materialized view as seen in the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTable {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    /// Catalog comment (`COMMENT ON TABLE`), if any.
    pub comment: Option<String>,
}

impl LiveTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            kind,
            comment: None,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// A column as seen in the live catalog, annotated with key roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    pub name: String,
    /// 1-based physical position.
    pub ordinal: i32,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
}

impl LiveColumn {
    /// A nullable, non-key column. Ordinal is assigned by the catalog.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal: 0,
            data_type: data_type.into(),
            nullable: true,
            default: None,
            comment: None,
            is_primary_key: false,
            is_foreign_key: false,
        }
    }

    /// Mark as primary key (implies not null).
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The structural facts the local store tracks for drift.
    pub fn facts(&self) -> ColumnFacts {
        ColumnFacts {
            name: self.name.clone(),
            ordinal: self.ordinal,
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            is_primary_key: self.is_primary_key,
            is_foreign_key: self.is_foreign_key,
        }
    }
}

/// One column pair of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiveForeignKey {
    pub from_schema: String,
    pub from_table: String,
    pub from_column: String,
    pub to_schema: String,
    pub to_table: String,
    pub to_column: String,
}

impl LiveForeignKey {
    /// Build from two `schema.table.column` paths.
    ///
    /// Returns `None` unless both paths have exactly three parts.
    pub fn parse(from: &str, to: &str) -> Option<Self> {
        let split = |path: &str| -> Option<(String, String, String)> {
            let mut parts = path.split('.');
            let schema = parts.next()?.to_string();
            let table = parts.next()?.to_string();
            let column = parts.next()?.to_string();
            if parts.next().is_some() {
                return None;
            }
            Some((schema, table, column))
        };

        let (from_schema, from_table, from_column) = split(from)?;
        let (to_schema, to_table, to_column) = split(to)?;
        Some(Self {
            from_schema,
            from_table,
            from_column,
            to_schema,
            to_table,
            to_column,
        })
    }

    pub fn from_path(&self) -> String {
        format!("{}.{}.{}", self.from_schema, self.from_table, self.from_column)
    }

    pub fn to_path(&self) -> String {
        format!("{}.{}.{}", self.to_schema, self.to_table, self.to_column)
    }
}
