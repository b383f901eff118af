//! Record types persisted in the local metadata store.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::config::ConnectParams;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map($name)
            }
        }
    };
}

record_id!(
    /// Identity of a registered connection profile.
    ProfileId
);
record_id!(
    /// Identity of a stored table record.
    TableId
);
record_id!(
    /// Identity of a stored column record.
    ColumnId
);
record_id!(
    /// Identity of a stored relationship edge.
    RelationshipId
);

/// Implements `ToSql`/`FromSql` for a text-backed enum with `as_str`/`parse`.
macro_rules! text_enum_sql {
    ($name:ident) => {
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                $name::parse(text).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("invalid {} value: {}", stringify!($name), text).into(),
                    )
                })
            }
        }
    };
}

/// Observed connectivity of a profile, updated on every connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disconnected" => Some(ConnectionStatus::Disconnected),
            "connected" => Some(ConnectionStatus::Connected),
            "error" => Some(ConnectionStatus::Error),
            _ => None,
        }
    }
}

text_enum_sql!(ConnectionStatus);

/// Kind of relation a table record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
    MaterializedView,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::View => "view",
            TableKind::MaterializedView => "materialized_view",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "table" => Some(TableKind::Table),
            "view" => Some(TableKind::View),
            "materialized_view" => Some(TableKind::MaterializedView),
            _ => None,
        }
    }

    /// Map an `information_schema.tables.table_type` value.
    ///
    /// Unknown catalog kinds (foreign tables, local temporaries) are treated as tables.
    pub fn from_catalog(table_type: &str) -> Self {
        match table_type {
            "VIEW" => TableKind::View,
            "MATERIALIZED VIEW" => TableKind::MaterializedView,
            _ => TableKind::Table,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

text_enum_sql!(TableKind);

/// Cardinality label carried by a relationship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    #[serde(rename = "one-to-one")]
    OneToOne,
    #[serde(rename = "one-to-many")]
    OneToMany,
    #[serde(rename = "many-to-one")]
    ManyToOne,
    #[serde(rename = "many-to-many")]
    ManyToMany,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::OneToOne => "one-to-one",
            RelationshipKind::OneToMany => "one-to-many",
            RelationshipKind::ManyToOne => "many-to-one",
            RelationshipKind::ManyToMany => "many-to-many",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one-to-one" => Some(RelationshipKind::OneToOne),
            "one-to-many" => Some(RelationshipKind::OneToMany),
            "many-to-one" => Some(RelationshipKind::ManyToOne),
            "many-to-many" => Some(RelationshipKind::ManyToMany),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

text_enum_sql!(RelationshipKind);

/// A profile to register.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub owner: String,
    pub name: String,
    pub params: ConnectParams,
}

/// A registered external database connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProfile {
    pub id: ProfileId,
    pub owner: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub params: ConnectParams,
    pub status: ConnectionStatus,
    /// Unix seconds of the last successful sync.
    pub last_sync_at: Option<i64>,
    pub created_at: i64,
}

/// Locally stored metadata for one external table, view or materialized view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRecord {
    pub id: TableId,
    pub profile_id: ProfileId,
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    pub row_count: Option<i64>,
    /// Empty when neither authored nor synthesized yet.
    pub description: String,
    pub embedding: Option<serde_json::Value>,
}

impl TableRecord {
    /// `schema.name`, the identity used in changelogs and diagrams.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Structural facts about a column, as observed in the live catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFacts {
    pub name: String,
    pub ordinal: i32,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
}

/// Locally stored metadata for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnRecord {
    pub id: ColumnId,
    pub table_id: TableId,
    pub name: String,
    pub ordinal: i32,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub description: String,
    pub embedding: Option<serde_json::Value>,
}

impl ColumnRecord {
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

/// A directed column-to-column edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub id: RelationshipId,
    pub from_column: ColumnId,
    pub to_column: ColumnId,
    pub kind: RelationshipKind,
}

/// A relationship joined with the names of both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipView {
    pub id: RelationshipId,
    #[serde(skip)]
    pub from_column_id: ColumnId,
    #[serde(skip)]
    pub to_column_id: ColumnId,
    pub from_schema: String,
    pub from_table: String,
    pub from_column: String,
    pub to_schema: String,
    pub to_table: String,
    pub to_column: String,
    pub relationship_type: RelationshipKind,
}
