//! ER diagram snapshots.
//!
//! A snapshot is a layout hint for a diagram renderer: tables are placed on a
//! square grid in build order, `ceil(sqrt(n))` cells per row.

use serde::{Deserialize, Serialize};

use super::RelationshipGraph;
use crate::config::DiagramSettings;
use crate::store::{ProfileId, RelationshipKind};

const NODE_BASE_HEIGHT: u32 = 40;
const NODE_ROW_HEIGHT: u32 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramSnapshot {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
    pub metadata: DiagramMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramMetadata {
    pub profile_id: ProfileId,
    /// Unix seconds.
    pub generated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    /// `schema.table`
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub position: Position,
    pub data: DiagramNodeData,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNodeData {
    pub label: String,
    pub schema: String,
    pub description: String,
    pub columns: Vec<DiagramColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub data: DiagramEdgeData,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramEdgeData {
    pub from_column: String,
    pub to_column: String,
    pub relationship_type: RelationshipKind,
    pub label: String,
}

/// Grid cell `(column, row)` for node `index` of `count`.
pub fn grid_cell(index: usize, count: usize) -> (usize, usize) {
    let per_row = (count as f64).sqrt().ceil().max(1.0) as usize;
    (index % per_row, index / per_row)
}

impl RelationshipGraph {
    /// Lay the graph out as a diagram snapshot.
    pub fn to_diagram(
        &self,
        profile: ProfileId,
        settings: &DiagramSettings,
        generated_at: i64,
    ) -> DiagramSnapshot {
        let count = self.table_count();

        let nodes = self
            .tables()
            .enumerate()
            .map(|(i, node)| {
                let (col, row) = grid_cell(i, count);
                let columns: Vec<DiagramColumn> = node
                    .columns
                    .iter()
                    .map(|c| DiagramColumn {
                        name: c.name.clone(),
                        data_type: c.data_type.clone(),
                        is_nullable: c.nullable,
                        is_primary_key: c.is_primary_key,
                        is_foreign_key: c.is_foreign_key,
                        description: c.description.clone(),
                    })
                    .collect();

                DiagramNode {
                    id: node.table.qualified_name(),
                    node_type: "tableNode".to_string(),
                    position: Position {
                        x: col as i64 * settings.grid_spacing,
                        y: row as i64 * settings.grid_spacing,
                    },
                    width: settings.node_width,
                    height: NODE_BASE_HEIGHT + NODE_ROW_HEIGHT * columns.len() as u32,
                    data: DiagramNodeData {
                        label: node.table.name.clone(),
                        schema: node.table.schema.clone(),
                        description: node.table.description.clone(),
                        columns,
                    },
                }
            })
            .collect();

        let edges = self
            .relationships()
            .map(|(from, to, edge)| {
                let label = format!("{} → {}", edge.from_column, edge.to_column);
                DiagramEdge {
                    id: format!("e-{}-{}", edge.from_column_id, edge.to_column_id),
                    source: from.table.qualified_name(),
                    target: to.table.qualified_name(),
                    data: DiagramEdgeData {
                        from_column: edge.from_column.clone(),
                        to_column: edge.to_column.clone(),
                        relationship_type: edge.kind,
                        label: label.clone(),
                    },
                    label,
                }
            })
            .collect();

        DiagramSnapshot {
            nodes,
            edges,
            metadata: DiagramMetadata {
                profile_id: profile,
                generated_at,
            },
        }
    }
}
