//! Table relationship graph.
//!
//! Built from the reconciled store: one node per table (carrying its full
//! column list), one directed edge per column-level relationship, pointing
//! from the referencing table to the referenced one.

mod diagram;

pub use diagram::{
    DiagramColumn, DiagramEdge, DiagramEdgeData, DiagramMetadata, DiagramNode, DiagramNodeData,
    DiagramSnapshot, Position,
};

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::store::{
    ColumnId, ColumnRecord, MetadataStore, ProfileId, RelationshipId, RelationshipKind, RelationshipView,
    StoreResult, TableRecord,
};

/// A table and its columns.
#[derive(Debug, Clone)]
pub struct TableNode {
    pub table: TableRecord,
    pub columns: Vec<ColumnRecord>,
}

/// A column-level relationship between two tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipEdge {
    pub id: RelationshipId,
    pub from_column_id: ColumnId,
    pub to_column_id: ColumnId,
    pub from_column: String,
    pub to_column: String,
    pub kind: RelationshipKind,
}

/// Directed graph of tables and the relationships between them.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    graph: DiGraph<TableNode, RelationshipEdge>,

    /// Index: (schema, table) → NodeIndex
    table_index: HashMap<(String, String), NodeIndex>,
}

impl RelationshipGraph {
    /// Build the graph for a profile from the store.
    pub fn build(store: &MetadataStore, profile: ProfileId) -> StoreResult<Self> {
        let mut tables = Vec::new();
        for table in store.list_tables(profile)? {
            let columns = store.list_columns(table.id)?;
            tables.push(TableNode { table, columns });
        }
        let relationships = store.list_relationships(profile)?;
        Ok(Self::from_parts(tables, &relationships))
    }

    /// Build from already loaded tables and relationships.
    ///
    /// Node order follows `tables`. Relationships whose endpoint tables are
    /// missing are ignored.
    pub fn from_parts(tables: Vec<TableNode>, relationships: &[RelationshipView]) -> Self {
        let mut graph = DiGraph::new();
        let mut table_index = HashMap::new();

        for node in tables {
            let key = (node.table.schema.clone(), node.table.name.clone());
            let idx = graph.add_node(node);
            table_index.insert(key, idx);
        }

        for rel in relationships {
            let from = table_index.get(&(rel.from_schema.clone(), rel.from_table.clone()));
            let to = table_index.get(&(rel.to_schema.clone(), rel.to_table.clone()));
            if let (Some(&from), Some(&to)) = (from, to) {
                graph.add_edge(
                    from,
                    to,
                    RelationshipEdge {
                        id: rel.id,
                        from_column_id: rel.from_column_id,
                        to_column_id: rel.to_column_id,
                        from_column: rel.from_column.clone(),
                        to_column: rel.to_column.clone(),
                        kind: rel.relationship_type,
                    },
                );
            }
        }

        Self { graph, table_index }
    }

    pub fn table_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Tables in build order.
    pub fn tables(&self) -> impl Iterator<Item = &TableNode> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&TableNode> {
        self.index_of(schema, name).map(|idx| &self.graph[idx])
    }

    /// Edges in build order as (from table, to table, edge).
    pub fn relationships(&self) -> impl Iterator<Item = (&TableNode, &TableNode, &RelationshipEdge)> {
        self.graph.edge_indices().filter_map(move |e| {
            let (from, to) = self.graph.edge_endpoints(e)?;
            Some((&self.graph[from], &self.graph[to], &self.graph[e]))
        })
    }

    /// Tables this table references through its foreign keys.
    pub fn references(&self, schema: &str, name: &str) -> Vec<&TableNode> {
        self.neighbors(schema, name, Direction::Outgoing)
    }

    /// Tables whose foreign keys reference this table.
    pub fn referenced_by(&self, schema: &str, name: &str) -> Vec<&TableNode> {
        self.neighbors(schema, name, Direction::Incoming)
    }

    fn neighbors(&self, schema: &str, name: &str, direction: Direction) -> Vec<&TableNode> {
        let Some(idx) = self.index_of(schema, name) else {
            return Vec::new();
        };

        let mut seen = Vec::new();
        let mut result = Vec::new();
        for edge in self.graph.edges_directed(idx, direction) {
            let other = match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            };
            if !seen.contains(&other) {
                seen.push(other);
                result.push(&self.graph[other]);
            }
        }
        result.sort_by(|a, b| {
            (&a.table.schema, &a.table.name).cmp(&(&b.table.schema, &b.table.name))
        });
        result
    }

    fn index_of(&self, schema: &str, name: &str) -> Option<NodeIndex> {
        self.table_index
            .get(&(schema.to_string(), name.to_string()))
            .copied()
    }
}
