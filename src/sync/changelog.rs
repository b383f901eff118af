//! Structured report of what one sync run changed.

use serde::Serialize;

use crate::catalog::LiveForeignKey;
use crate::store::{ColumnFacts, ColumnRecord, RelationshipKind, RelationshipView, TableKind, TableRecord};

/// Added, updated and removed entries for one entity kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityChanges<T> {
    pub added: Vec<T>,
    pub updated: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for EntityChanges<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> EntityChanges<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    fn summary(&self, label: &str) -> String {
        format!(
            "{label} +{} ~{} -{}",
            self.added.len(),
            self.updated.len(),
            self.removed.len()
        )
    }
}

/// An old → new value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange<T> {
    pub from: T,
    pub to: T,
}

impl<T: PartialEq> FieldChange<T> {
    fn between(from: T, to: T) -> Option<Self> {
        (from != to).then_some(Self { from, to })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDrift {
    pub kind: FieldChange<TableKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableChange {
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<TableKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<TableDrift>,
}

impl TableChange {
    pub fn added(table: &TableRecord) -> Self {
        Self {
            schema: table.schema.clone(),
            name: table.name.clone(),
            kind: Some(table.kind),
            changes: None,
        }
    }

    pub fn kind_changed(table: &TableRecord, to: TableKind) -> Self {
        Self {
            schema: table.schema.clone(),
            name: table.name.clone(),
            kind: Some(to),
            changes: Some(TableDrift {
                kind: FieldChange {
                    from: table.kind,
                    to,
                },
            }),
        }
    }

    pub fn removed(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            kind: None,
            changes: None,
        }
    }
}

/// Drift in the tracked structural facts of a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnDrift {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<FieldChange<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<FieldChange<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<FieldChange<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<FieldChange<bool>>,
}

impl ColumnDrift {
    /// `None` when type, nullability and key flags all match. Ordinal moves
    /// are not drift.
    pub fn between(old: &ColumnFacts, new: &ColumnFacts) -> Option<Self> {
        let drift = Self {
            data_type: FieldChange::between(old.data_type.clone(), new.data_type.clone()),
            nullable: FieldChange::between(old.nullable, new.nullable),
            primary_key: FieldChange::between(old.is_primary_key, new.is_primary_key),
            foreign_key: FieldChange::between(old.is_foreign_key, new.is_foreign_key),
        };
        (drift != Self::default()).then_some(drift)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnChange {
    /// `schema.table`
    pub table: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<ColumnDrift>,
}

impl ColumnChange {
    pub fn added(table: &TableRecord, column: &ColumnRecord) -> Self {
        Self {
            table: table.qualified_name(),
            name: column.name.clone(),
            data_type: Some(column.data_type.clone()),
            changes: None,
        }
    }

    pub fn updated(table: &TableRecord, name: &str, data_type: &str, drift: ColumnDrift) -> Self {
        Self {
            table: table.qualified_name(),
            name: name.to_string(),
            data_type: Some(data_type.to_string()),
            changes: Some(drift),
        }
    }

    pub fn removed(table: &str, name: &str) -> Self {
        Self {
            table: table.to_string(),
            name: name.to_string(),
            data_type: None,
            changes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipChange {
    /// `schema.table`
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub kind: RelationshipKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_kind: Option<RelationshipKind>,
}

impl RelationshipChange {
    pub fn new(from: &str, to: &str, kind: RelationshipKind) -> Option<Self> {
        let fk = LiveForeignKey::parse(from, to)?;
        Some(Self::from_foreign_key(&fk, kind))
    }

    pub fn from_foreign_key(fk: &LiveForeignKey, kind: RelationshipKind) -> Self {
        Self {
            from_table: format!("{}.{}", fk.from_schema, fk.from_table),
            from_column: fk.from_column.clone(),
            to_table: format!("{}.{}", fk.to_schema, fk.to_table),
            to_column: fk.to_column.clone(),
            kind,
            previous_kind: None,
        }
    }

    pub fn from_view(view: &RelationshipView) -> Self {
        Self {
            from_table: format!("{}.{}", view.from_schema, view.from_table),
            from_column: view.from_column.clone(),
            to_table: format!("{}.{}", view.to_schema, view.to_table),
            to_column: view.to_column.clone(),
            kind: view.relationship_type,
            previous_kind: None,
        }
    }
}

/// Best-effort work that was skipped without failing the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    RowCount,
    SampleValues,
    ForeignKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    pub kind: SkipKind,
    pub target: String,
    pub reason: String,
}

/// Everything one sync run changed, plus what it skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeLog {
    pub tables: EntityChanges<TableChange>,
    pub columns: EntityChanges<ColumnChange>,
    pub relationships: EntityChanges<RelationshipChange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedItem>,
}

impl ChangeLog {
    /// True when no entity was added, updated or removed. Skips don't count.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty() && self.relationships.is_empty()
    }

    pub fn skip(&mut self, kind: SkipKind, target: impl Into<String>, reason: impl ToString) {
        self.skipped.push(SkippedItem {
            kind,
            target: target.into(),
            reason: reason.to_string(),
        });
    }

    pub fn skipped_of(&self, kind: SkipKind) -> impl Iterator<Item = &SkippedItem> {
        self.skipped.iter().filter(move |s| s.kind == kind)
    }

    /// One-line summary, e.g. `tables +2 ~0 -0, columns +3 ~0 -0, relationships +1 ~0 -0`.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}, {}, {}",
            self.tables.summary("tables"),
            self.columns.summary("columns"),
            self.relationships.summary("relationships")
        );
        if !self.skipped.is_empty() {
            line.push_str(&format!(", {} skipped", self.skipped.len()));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(data_type: &str, nullable: bool) -> ColumnFacts {
        ColumnFacts {
            name: "c".into(),
            ordinal: 1,
            data_type: data_type.into(),
            nullable,
            is_primary_key: false,
            is_foreign_key: false,
        }
    }

    #[test]
    fn test_column_drift() {
        assert!(ColumnDrift::between(&facts("integer", true), &facts("integer", true)).is_none());

        let mut moved = facts("integer", true);
        moved.ordinal = 4;
        assert!(ColumnDrift::between(&facts("integer", true), &moved).is_none());

        let drift = ColumnDrift::between(&facts("integer", true), &facts("bigint", true)).unwrap();
        assert_eq!(
            serde_json::to_value(&drift).unwrap(),
            serde_json::json!({"type": {"from": "integer", "to": "bigint"}})
        );
    }

    #[test]
    fn test_removed_column_serializes_identity_only() {
        let change = ColumnChange::removed("public.orders", "user_id");
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            serde_json::json!({"table": "public.orders", "name": "user_id"})
        );
    }

    #[test]
    fn test_skips_do_not_make_changelog_dirty() {
        let mut log = ChangeLog::default();
        log.skip(SkipKind::RowCount, "public.users", "timeout");
        assert!(log.is_empty());
        assert_eq!(log.skipped_of(SkipKind::RowCount).count(), 1);
        assert_eq!(
            log.summary(),
            "tables +0 ~0 -0, columns +0 ~0 -0, relationships +0 ~0 -0, 1 skipped"
        );
    }
}
