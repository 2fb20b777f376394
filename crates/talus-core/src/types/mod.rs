//! # Core Type Definitions
//!
//! This module contains the core types shared by every part of the engine:
//! - Node identifiers (`NodeId`) and the `Node` record
//! - Typed property values (`PropertyValue`)
//! - Blocking edges (`BlockingEdge`)
//! - Error types (`TalusError`)
//!
//! ## Determinism Guarantees
//!
//! - `NodeId` implements `Ord` and is allocated monotonically, so ordering by id
//!   is ordering by creation.
//! - Property maps are `BTreeMap`s for deterministic iteration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a node in a project graph.
///
/// Allocated from a per-graph counter, so a smaller id always means an
/// earlier creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// PROPERTY VALUES
// =============================================================================

/// A property value stored on a node.
///
/// Serialized untagged so snapshots stay plain JSON. The Blueprint decides how
/// a value is interpreted: a `Number` may be a plain number or a currency amount,
/// a `Text` may be free text or the id of a select option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl PropertyValue {
    /// Create a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a numeric value.
    #[must_use]
    pub const fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Get the value as a string slice, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Interpret the value as a finite number.
    ///
    /// Text is accepted when it parses as a number after stripping currency
    /// decoration (`"$1,200.50"`). Non-finite numbers yield `None`.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .chars()
                    .filter(|c| *c != '$' && *c != ',')
                    .collect();
                cleaned.trim().parse::<f64>().ok()?
            }
        };
        n.is_finite().then_some(n)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

// =============================================================================
// NODE
// =============================================================================

/// A typed node in the project tree.
///
/// The parent is deliberately absent: it is tracked only by the Graph's
/// inverted index. Nodes are handed out by shared reference; every mutation
/// goes through the Graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// The node identifier.
    pub id: NodeId,
    /// Blueprint node-type id.
    pub type_id: String,
    /// Display name.
    pub name: String,
    /// Property id -> value.
    pub properties: BTreeMap<String, PropertyValue>,
    /// Ordered child ids.
    pub children: Vec<NodeId>,
}

impl Node {
    /// Create a node with no properties and no children.
    #[must_use]
    pub fn new(id: NodeId, type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            type_id: type_id.into(),
            name: name.into(),
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Get a property value.
    #[must_use]
    pub fn property(&self, property_id: &str) -> Option<&PropertyValue> {
        self.properties.get(property_id)
    }
}

// =============================================================================
// BLOCKING EDGE
// =============================================================================

/// A directed "blocks" relationship: `blocker` must finish before `blocked`.
///
/// Blocking edges live outside the ownership tree and may form cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockingEdge {
    pub blocker: NodeId,
    pub blocked: NodeId,
}

impl BlockingEdge {
    #[must_use]
    pub const fn new(blocker: NodeId, blocked: NodeId) -> Self {
        Self { blocker, blocked }
    }

    /// Check if the edge touches a node on either end.
    #[must_use]
    pub fn touches(&self, node: NodeId) -> bool {
        self.blocker == node || self.blocked == node
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Talus engine.
///
/// - No silent failures
/// - Use `Result<T, TalusError>` for fallible operations
/// - The engine never panics on bad input; every error is recoverable
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TalusError {
    /// The requested node does not exist in the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// The child type is not allowed under the parent type (`None` = root level).
    #[error("Type '{child_type}' is not allowed under {}", .parent_type.as_deref().unwrap_or("the project root level"))]
    InvalidHierarchy {
        parent_type: Option<String>,
        child_type: String,
    },

    /// A property value or structural request failed Blueprint validation.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Moving a node under itself or one of its descendants.
    #[error("Moving {node} under {parent} would create a cycle")]
    WouldCreateCycle { node: NodeId, parent: NodeId },

    /// Undo requested with no command in history.
    #[error("Nothing to undo")]
    EmptyUndoStack,

    /// Redo requested with no undone command in history.
    #[error("Nothing to redo")]
    EmptyRedoStack,

    /// No chain of registered migrations connects the two versions.
    #[error("No migration path from {from} to {to}")]
    NoMigrationPath { from: String, to: String },

    /// A migration was already registered for this version step.
    #[error("Migration {from} -> {to} is already registered")]
    MigrationAlreadyRegistered { from: String, to: String },

    /// A migration step failed; `messages` holds the audit trail up to the failure.
    #[error("Migration {from} -> {to} failed: {reason}")]
    MigrationStepFailed {
        from: String,
        to: String,
        reason: String,
        messages: Vec<String>,
    },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Engine configuration could not be parsed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
