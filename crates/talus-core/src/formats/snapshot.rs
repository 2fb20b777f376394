//! # Snapshot Format
//!
//! The plain nested structure a project graph is persisted as.
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "schema_version": "0.2.0",
//!   "roots": [{ "id": 1, "type": "project_root", "name": "Feature",
//!               "properties": {}, "children": [ ... ] }],
//!   "blocking": [{ "blocker": 4, "blocked": 5 }]
//! }
//! ```
//!
//! Node ids are preserved across a round-trip. Loading rebuilds every index
//! and runs the full integrity check, so a snapshot that violates the tree
//! invariants is rejected rather than half-loaded.
//!
//! ## Size limits
//!
//! `graph_from_json` checks the input length BEFORE parsing, so an oversized
//! payload is rejected without allocating for it.
//!
//! Nesting is bounded by `MAX_TREE_DEPTH`, which the graph enforces on every
//! insert and move. That keeps any valid graph inside `serde_json`'s parser
//! recursion limit, so whatever saves also loads.

use crate::primitives::{DEFAULT_MAX_SNAPSHOT_BYTES, SNAPSHOT_FORMAT_VERSION};
use crate::{BlockingEdge, Graph, Node, NodeId, PropertyValue, TalusError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SNAPSHOT TYPES
// =============================================================================

/// A whole project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub format_version: u32,
    pub schema_version: String,
    pub roots: Vec<NodeSnapshot>,
    #[serde(default)]
    pub blocking: Vec<BlockingSnapshot>,
}

/// One node with its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub type_id: String,
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

/// One blocking edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingSnapshot {
    pub blocker: NodeId,
    pub blocked: NodeId,
}

impl From<&BlockingEdge> for BlockingSnapshot {
    fn from(edge: &BlockingEdge) -> Self {
        Self {
            blocker: edge.blocker,
            blocked: edge.blocked,
        }
    }
}

impl From<BlockingSnapshot> for BlockingEdge {
    fn from(snapshot: BlockingSnapshot) -> Self {
        BlockingEdge::new(snapshot.blocker, snapshot.blocked)
    }
}

// =============================================================================
// GRAPH <-> SNAPSHOT
// =============================================================================

impl Graph {
    /// Capture the graph as a nested snapshot.
    pub fn to_snapshot(&self) -> Result<ProjectSnapshot, TalusError> {
        let roots = self
            .roots()
            .iter()
            .map(|root| self.node_snapshot(*root))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProjectSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            schema_version: self.schema_version().to_string(),
            roots,
            blocking: self.blocking_edges().map(BlockingSnapshot::from).collect(),
        })
    }

    fn node_snapshot(&self, id: NodeId) -> Result<NodeSnapshot, TalusError> {
        let node = self.get_node(id)?;
        let children = node
            .children
            .iter()
            .map(|child| self.node_snapshot(*child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NodeSnapshot {
            id: node.id,
            type_id: node.type_id.clone(),
            name: node.name.clone(),
            properties: node.properties.clone(),
            children,
        })
    }

    /// Rebuild a graph from a snapshot.
    ///
    /// Fails with `SerializationError` on an unsupported format version and
    /// with `ValidationError` on duplicate ids or a broken structure.
    pub fn from_snapshot(snapshot: ProjectSnapshot) -> Result<Self, TalusError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(TalusError::SerializationError(format!(
                "Unsupported snapshot format: {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let mut graph = Graph::with_schema_version(snapshot.schema_version);
        let mut stack: Vec<(NodeSnapshot, bool)> =
            snapshot.roots.into_iter().rev().map(|r| (r, true)).collect();

        while let Some((node_snapshot, is_root)) = stack.pop() {
            let NodeSnapshot {
                id,
                type_id,
                name,
                properties,
                children,
            } = node_snapshot;

            let mut node = Node::new(id, type_id, name);
            node.properties = properties;
            node.children = children.iter().map(|c| c.id).collect();
            graph.import_node(node, is_root)?;

            stack.extend(children.into_iter().rev().map(|c| (c, false)));
        }

        graph.finish_import(snapshot.blocking.into_iter().map(BlockingEdge::from))?;
        Ok(graph)
    }
}

// =============================================================================
// JSON
// =============================================================================

/// Serialize a graph to snapshot JSON.
///
/// This is a pure transformation - no file I/O.
pub fn graph_to_json(graph: &Graph) -> Result<String, TalusError> {
    let snapshot = graph.to_snapshot()?;
    serde_json::to_string_pretty(&snapshot)
        .map_err(|e| TalusError::SerializationError(e.to_string()))
}

/// Deserialize a graph from snapshot JSON, with the default size limit.
pub fn graph_from_json(json: &str) -> Result<Graph, TalusError> {
    graph_from_json_with_limit(json, DEFAULT_MAX_SNAPSHOT_BYTES)
}

/// Deserialize a graph from snapshot JSON, rejecting input over `max_bytes`.
pub fn graph_from_json_with_limit(json: &str, max_bytes: usize) -> Result<Graph, TalusError> {
    if json.len() > max_bytes {
        return Err(TalusError::SerializationError(format!(
            "Snapshot size {} bytes exceeds maximum allowed {} bytes",
            json.len(),
            max_bytes
        )));
    }

    let snapshot: ProjectSnapshot = serde_json::from_str(json).map_err(|e| {
        TalusError::SerializationError(format!("Failed to parse snapshot: {}", e))
    })?;
    Graph::from_snapshot(snapshot)
}

// =============================================================================
// TESTS
// =============================================================================
