//! # Graph Engine
//!
//! The project graph: an ownership tree of typed nodes plus a separate set of
//! blocking edges.
//!
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.
//!
//! ## Invariants
//!
//! - Node ids are unique across the graph.
//! - Every non-root node appears in exactly one parent's child list and has
//!   exactly one entry in the inverted parent index.
//! - The ownership tree is acyclic.
//! - At creation, a node's type is an allowed child of its parent's type.
//! - No node sits deeper than `MAX_TREE_DEPTH`.
//!
//! Blocking edges are not part of the tree and may form cycles.
//!
//! Methods taking a `&Blueprint` validate against it. The `*_unchecked` and
//! `insert_node` variants only maintain structural invariants; they exist for
//! migration transforms, where the old blueprint no longer describes the
//! target shape.

use crate::blueprint::Blueprint;
use crate::primitives::{MAX_ANCESTOR_DEPTH, MAX_NAME_LENGTH, MAX_TREE_DEPTH};
use crate::{BlockingEdge, Node, NodeId, PropertyValue, TalusError};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SUPPORT TYPES
// =============================================================================

/// Where a node sits: its parent (`None` for roots) and its index among siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLocation {
    pub parent: Option<NodeId>,
    pub index: usize,
}

/// Everything `remove_node` took out of the graph, enough to put it back exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedSubtree {
    /// The removed node (top of the subtree).
    pub root: NodeId,
    /// Where the removed node used to sit.
    pub location: NodeLocation,
    /// Removed nodes in pre-order, with their child lists intact.
    pub nodes: Vec<Node>,
    /// Blocking edges dropped because they touched a removed node.
    pub blocking: Vec<BlockingEdge>,
}

impl RemovedSubtree {
    /// Ids of all removed nodes, in pre-order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// The project graph.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Node storage: NodeId -> Node
    nodes: BTreeMap<NodeId, Node>,

    /// Top-level nodes, in display order.
    roots: Vec<NodeId>,

    /// Inverted index: child -> parent
    parents: BTreeMap<NodeId, NodeId>,

    /// Blocking edges (blocker -> blocked).
    blocking: BTreeSet<BlockingEdge>,

    /// Blueprint version this graph conforms to.
    schema_version: String,

    /// Next available NodeId
    next_node_id: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            roots: Vec::new(),
            parents: BTreeMap::new(),
            blocking: BTreeSet::new(),
            schema_version: String::new(),
            next_node_id: 1,
        }
    }
}

impl Graph {
    /// Create a new empty graph with no recorded schema version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph recorded at the given schema version.
    #[must_use]
    pub fn with_schema_version(version: impl Into<String>) -> Self {
        Self {
            schema_version: version.into(),
            ..Self::default()
        }
    }

    /// The blueprint version this graph was built against or migrated to.
    #[must_use]
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub(crate) fn set_schema_version(&mut self, version: impl Into<String>) {
        self.schema_version = version.into();
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Get the total number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph contains a node.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Top-level nodes in display order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node.
    pub fn get_node(&self, id: NodeId) -> Result<&Node, TalusError> {
        self.nodes.get(&id).ok_or(TalusError::NodeNotFound(id))
    }

    /// Look up a node's parent. `Ok(None)` means the node is a root.
    pub fn get_parent(&self, id: NodeId) -> Result<Option<NodeId>, TalusError> {
        if !self.nodes.contains_key(&id) {
            return Err(TalusError::NodeNotFound(id));
        }
        Ok(self.parents.get(&id).copied())
    }

    /// Where a node currently sits.
    pub fn location(&self, id: NodeId) -> Result<NodeLocation, TalusError> {
        let parent = self.get_parent(id)?;
        let siblings = self.sibling_list(parent)?;
        let index = siblings
            .iter()
            .position(|c| *c == id)
            .ok_or_else(|| integrity_error(format!("{} missing from its sibling list", id)))?;
        Ok(NodeLocation { parent, index })
    }

    /// Ancestors of a node, nearest first (parent, grandparent, ..., root).
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>, TalusError> {
        if !self.nodes.contains_key(&id) {
            return Err(TalusError::NodeNotFound(id));
        }
        let mut chain = Vec::new();
        let mut current = id;
        while let Some(&parent) = self.parents.get(&current) {
            if chain.len() >= MAX_ANCESTOR_DEPTH {
                return Err(integrity_error(format!(
                    "ancestor chain of {} exceeds {} levels",
                    id, MAX_ANCESTOR_DEPTH
                )));
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    /// Depth of a node; roots are at depth 0.
    pub fn depth(&self, id: NodeId) -> Result<usize, TalusError> {
        Ok(self.ancestors(id)?.len())
    }

    /// A node and all its descendants, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Result<Vec<NodeId>, TalusError> {
        if !self.nodes.contains_key(&id) {
            return Err(TalusError::NodeNotFound(id));
        }
        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                return Err(integrity_error(format!("{} reached twice below {}", current, id)));
            }
            order.push(current);
            if let Some(node) = self.nodes.get(&current) {
                // Reverse so the first child is visited first
                stack.extend(node.children.iter().rev().copied());
            }
        }
        Ok(order)
    }

    /// Check if `node` lies in the subtree rooted at `ancestor` (inclusive).
    ///
    /// A walk that runs past `MAX_ANCESTOR_DEPTH` answers `true`, so callers
    /// guarding against cycles refuse rather than proceed.
    #[must_use]
    pub fn is_in_subtree(&self, node: NodeId, ancestor: NodeId) -> bool {
        if node == ancestor {
            return true;
        }
        let mut current = node;
        for _ in 0..MAX_ANCESTOR_DEPTH {
            match self.parents.get(&current) {
                Some(&parent) if parent == ancestor => return true,
                Some(&parent) => current = parent,
                None => return false,
            }
        }
        true
    }

    /// Levels below `id` in its subtree; a leaf has height 0.
    pub fn subtree_height(&self, id: NodeId) -> Result<usize, TalusError> {
        let mut height = 0;
        let mut stack = vec![(self.get_node(id)?, 0usize)];
        while let Some((node, level)) = stack.pop() {
            height = height.max(level);
            if level > MAX_TREE_DEPTH {
                break;
            }
            for child in &node.children {
                stack.push((self.get_node(*child)?, level + 1));
            }
        }
        Ok(height)
    }

    /// Reject placing a subtree of `height` under `parent` past `MAX_TREE_DEPTH`.
    fn ensure_depth(&self, parent: Option<NodeId>, height: usize) -> Result<(), TalusError> {
        let level = match parent {
            Some(parent) => self.depth(parent)? + 1,
            None => 0,
        };
        if level + height > MAX_TREE_DEPTH {
            return Err(TalusError::ValidationError(format!(
                "tree would reach {} levels deep (limit {})",
                level + height,
                MAX_TREE_DEPTH
            )));
        }
        Ok(())
    }

    // =========================================================================
    // CREATION
    // =========================================================================

    /// Create a top-level node. Only the blueprint's root type is accepted.
    ///
    /// Restricted to session initialization; everything else nests under an
    /// existing node.
    pub(crate) fn create_root(
        &mut self,
        blueprint: &Blueprint,
        type_id: &str,
        name: &str,
    ) -> Result<NodeId, TalusError> {
        if type_id != blueprint.root_type {
            return Err(TalusError::InvalidHierarchy {
                parent_type: None,
                child_type: type_id.to_string(),
            });
        }
        validate_name(name)?;
        let id = self.allocate_id(None)?;
        let mut node = Node::new(id, type_id, name);
        apply_defaults(blueprint, &mut node);
        let index = self.roots.len();
        self.attach(node, NodeLocation { parent: None, index });
        Ok(id)
    }

    /// Create a node under `parent`.
    ///
    /// Fails with `NodeNotFound` if the parent is missing and with
    /// `InvalidHierarchy` if the blueprint does not allow `type_id` under the
    /// parent's type. Blueprint defaults are applied to the new node.
    pub fn create_node(
        &mut self,
        blueprint: &Blueprint,
        parent: NodeId,
        type_id: &str,
        name: &str,
    ) -> Result<NodeId, TalusError> {
        self.create_node_with_id(blueprint, parent, type_id, name, None)
    }

    /// `create_node`, optionally reusing a specific id (used by redo).
    pub(crate) fn create_node_with_id(
        &mut self,
        blueprint: &Blueprint,
        parent: NodeId,
        type_id: &str,
        name: &str,
        id: Option<NodeId>,
    ) -> Result<NodeId, TalusError> {
        let parent_node = self.get_node(parent)?;
        blueprint.ensure_allowed_child(&parent_node.type_id, type_id)?;
        validate_name(name)?;
        self.ensure_depth(Some(parent), 0)?;
        let index = parent_node.children.len();

        let id = self.allocate_id(id)?;
        let mut node = Node::new(id, type_id, name);
        apply_defaults(blueprint, &mut node);
        self.attach(
            node,
            NodeLocation {
                parent: Some(parent),
                index,
            },
        );
        Ok(id)
    }

    /// Insert a node without blueprint validation.
    ///
    /// For migration transforms only: structural invariants still hold, but
    /// the type is not checked against any allowed-children table.
    pub fn insert_node(
        &mut self,
        parent: Option<NodeId>,
        type_id: &str,
        name: &str,
    ) -> Result<NodeId, TalusError> {
        let index = self.sibling_list(parent)?.len();
        validate_name(name)?;
        self.ensure_depth(parent, 0)?;
        let id = self.allocate_id(None)?;
        self.attach(Node::new(id, type_id, name), NodeLocation { parent, index });
        Ok(id)
    }

    fn allocate_id(&mut self, requested: Option<NodeId>) -> Result<NodeId, TalusError> {
        match requested {
            Some(id) if self.nodes.contains_key(&id) => Err(TalusError::ValidationError(format!(
                "node id {} is already in use",
                id
            ))),
            Some(id) => {
                if id.0 >= self.next_node_id {
                    self.next_node_id = id.0.saturating_add(1);
                }
                Ok(id)
            }
            None => {
                let id = NodeId(self.next_node_id);
                self.next_node_id = self.next_node_id.saturating_add(1);
                Ok(id)
            }
        }
    }

    /// Insert a fresh node at a location. The location's parent must exist.
    fn attach(&mut self, node: Node, location: NodeLocation) {
        let id = node.id;
        self.nodes.insert(id, node);
        self.link(id, location);
    }

    /// Put an existing, detached node at a location.
    fn link(&mut self, id: NodeId, location: NodeLocation) {
        match location.parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    let index = location.index.min(parent_node.children.len());
                    parent_node.children.insert(index, id);
                }
                self.parents.insert(id, parent);
            }
            None => {
                let index = location.index.min(self.roots.len());
                self.roots.insert(index, id);
                self.parents.remove(&id);
            }
        }
    }

    /// Take a node out of its sibling list and the parent index.
    fn unlink(&mut self, id: NodeId) {
        match self.parents.remove(&id) {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }

    fn sibling_list(&self, parent: Option<NodeId>) -> Result<&[NodeId], TalusError> {
        match parent {
            Some(parent) => Ok(&self.get_node(parent)?.children),
            None => Ok(&self.roots),
        }
    }

    // =========================================================================
    // REMOVAL
    // =========================================================================

    /// Remove a node and all its descendants (cascade delete).
    ///
    /// Blocking edges touching any removed node are dropped. The returned
    /// record restores everything through `restore_subtree`.
    pub fn remove_node(&mut self, id: NodeId) -> Result<RemovedSubtree, TalusError> {
        let location = self.location(id)?;
        let order = self.descendants(id)?;
        let removed_ids: BTreeSet<NodeId> = order.iter().copied().collect();

        self.unlink(id);

        let mut nodes = Vec::with_capacity(order.len());
        for node_id in &order {
            if let Some(node) = self.nodes.remove(node_id) {
                nodes.push(node);
            }
            if *node_id != id {
                self.parents.remove(node_id);
            }
        }

        let blocking: Vec<BlockingEdge> = self
            .blocking
            .iter()
            .filter(|e| removed_ids.contains(&e.blocker) || removed_ids.contains(&e.blocked))
            .copied()
            .collect();
        for edge in &blocking {
            self.blocking.remove(edge);
        }

        Ok(RemovedSubtree {
            root: id,
            location,
            nodes,
            blocking,
        })
    }

    /// Put back a subtree removed by `remove_node`, at its former location.
    pub(crate) fn restore_subtree(&mut self, removed: RemovedSubtree) -> Result<(), TalusError> {
        if let Some(parent) = removed.location.parent
            && !self.nodes.contains_key(&parent)
        {
            return Err(TalusError::NodeNotFound(parent));
        }
        if let Some(clash) = removed.node_ids().find(|id| self.nodes.contains_key(id)) {
            return Err(TalusError::ValidationError(format!(
                "cannot restore subtree: node id {} is in use",
                clash
            )));
        }

        for node in removed.nodes {
            for child in &node.children {
                self.parents.insert(*child, node.id);
            }
            if node.id.0 >= self.next_node_id {
                self.next_node_id = node.id.0.saturating_add(1);
            }
            self.nodes.insert(node.id, node);
        }
        self.link(removed.root, removed.location);
        self.blocking.extend(removed.blocking);
        Ok(())
    }

    // =========================================================================
    // STRUCTURE
    // =========================================================================

    /// Move a node to a new parent (or to the root level) at `position`.
    ///
    /// `None` appends. Returns the former location. Fails with
    /// `WouldCreateCycle` if the target parent is the node itself or one of
    /// its descendants. No blueprint validation happens here.
    pub fn move_node(
        &mut self,
        id: NodeId,
        new_parent: Option<NodeId>,
        position: Option<usize>,
    ) -> Result<NodeLocation, TalusError> {
        let previous = self.location(id)?;
        if let Some(parent) = new_parent {
            if !self.nodes.contains_key(&parent) {
                return Err(TalusError::NodeNotFound(parent));
            }
            if self.is_in_subtree(parent, id) {
                return Err(TalusError::WouldCreateCycle { node: id, parent });
            }
        }
        self.ensure_depth(new_parent, self.subtree_height(id)?)?;

        self.unlink(id);
        let len = self.sibling_list(new_parent)?.len();
        let index = position.unwrap_or(len).min(len);
        self.link(
            id,
            NodeLocation {
                parent: new_parent,
                index,
            },
        );
        Ok(previous)
    }

    // =========================================================================
    // BLOCKING EDGES
    // =========================================================================

    /// Add a blocking edge. Returns `false` if it already existed.
    ///
    /// Cycles are tolerated; the velocity engine copes with them.
    pub fn add_blocking_edge(&mut self, blocker: NodeId, blocked: NodeId) -> Result<bool, TalusError> {
        self.get_node(blocker)?;
        self.get_node(blocked)?;
        Ok(self.blocking.insert(BlockingEdge::new(blocker, blocked)))
    }

    /// Remove a blocking edge. Returns `false` if it did not exist.
    pub fn remove_blocking_edge(&mut self, blocker: NodeId, blocked: NodeId) -> Result<bool, TalusError> {
        self.get_node(blocker)?;
        self.get_node(blocked)?;
        Ok(self.blocking.remove(&BlockingEdge::new(blocker, blocked)))
    }

    /// All blocking edges, ordered by (blocker, blocked).
    pub fn blocking_edges(&self) -> impl Iterator<Item = &BlockingEdge> {
        self.blocking.iter()
    }

    /// Check if a blocking edge exists.
    #[must_use]
    pub fn has_blocking_edge(&self, blocker: NodeId, blocked: NodeId) -> bool {
        self.blocking.contains(&BlockingEdge::new(blocker, blocked))
    }

    /// Nodes that `node` blocks.
    #[must_use]
    pub fn blocks(&self, node: NodeId) -> Vec<NodeId> {
        self.blocking
            .range(BlockingEdge::new(node, NodeId(0))..=BlockingEdge::new(node, NodeId(u64::MAX)))
            .map(|e| e.blocked)
            .collect()
    }

    /// Nodes blocking `node`.
    #[must_use]
    pub fn blocked_by(&self, node: NodeId) -> Vec<NodeId> {
        self.blocking
            .iter()
            .filter(|e| e.blocked == node)
            .map(|e| e.blocker)
            .collect()
    }

    // =========================================================================
    // PROPERTIES
    // =========================================================================

    /// Set a property after validating it against the node type's schema.
    ///
    /// Returns the previous value.
    pub fn set_property(
        &mut self,
        blueprint: &Blueprint,
        id: NodeId,
        property_id: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, TalusError> {
        let node = self.get_node(id)?;
        blueprint.validate_property(&node.type_id, property_id, &value)?;
        self.set_property_unchecked(id, property_id, value)
    }

    /// Remove a property. Required properties cannot be removed.
    ///
    /// Returns the removed value, if any.
    pub fn remove_property(
        &mut self,
        blueprint: &Blueprint,
        id: NodeId,
        property_id: &str,
    ) -> Result<Option<PropertyValue>, TalusError> {
        let node = self.get_node(id)?;
        if blueprint.property_def(&node.type_id, property_id)?.required {
            return Err(TalusError::ValidationError(format!(
                "property '{}' is required on '{}'",
                property_id, node.type_id
            )));
        }
        self.remove_property_unchecked(id, property_id)
    }

    /// Set a property without schema validation. Returns the previous value.
    pub fn set_property_unchecked(
        &mut self,
        id: NodeId,
        property_id: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, TalusError> {
        let node = self.node_mut(id)?;
        Ok(node.properties.insert(property_id.to_string(), value))
    }

    /// Remove a property without schema validation. Returns the removed value.
    pub fn remove_property_unchecked(
        &mut self,
        id: NodeId,
        property_id: &str,
    ) -> Result<Option<PropertyValue>, TalusError> {
        let node = self.node_mut(id)?;
        Ok(node.properties.remove(property_id))
    }

    /// Put a property back to a previous state (`None` = absent).
    pub(crate) fn restore_property(
        &mut self,
        id: NodeId,
        property_id: &str,
        previous: Option<PropertyValue>,
    ) -> Result<(), TalusError> {
        match previous {
            Some(value) => self.set_property_unchecked(id, property_id, value)?,
            None => self.remove_property_unchecked(id, property_id)?,
        };
        Ok(())
    }

    /// Change a node's type tag. Used by migrations.
    pub fn retype_node(&mut self, id: NodeId, type_id: &str) -> Result<(), TalusError> {
        self.node_mut(id)?.type_id = type_id.to_string();
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TalusError> {
        self.nodes.get_mut(&id).ok_or(TalusError::NodeNotFound(id))
    }

    // =========================================================================
    // IMPORT
    // =========================================================================

    /// Add a node with its original id and child list, as read from a snapshot.
    ///
    /// Parent links are rebuilt by `finish_import`.
    pub(crate) fn import_node(&mut self, node: Node, is_root: bool) -> Result<(), TalusError> {
        let id = self.allocate_id(Some(node.id))?;
        if is_root {
            self.roots.push(id);
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Rebuild the parent index and blocking set after `import_node` calls,
    /// then verify every invariant.
    pub(crate) fn finish_import(
        &mut self,
        blocking: impl IntoIterator<Item = BlockingEdge>,
    ) -> Result<(), TalusError> {
        self.parents.clear();
        for node in self.nodes.values() {
            for child in &node.children {
                if self.parents.insert(*child, node.id).is_some() {
                    return Err(integrity_error(format!("{} has more than one parent", child)));
                }
            }
        }
        self.blocking = blocking.into_iter().collect();
        self.check_integrity()
    }

    // =========================================================================
    // INTEGRITY
    // =========================================================================

    /// Verify the structural invariants.
    ///
    /// Checks id resolution, single-parent membership, index consistency,
    /// acyclicity and full reachability from the roots, and that blocking
    /// edges point at existing nodes.
    pub fn check_integrity(&self) -> Result<(), TalusError> {
        let mut seen_roots = BTreeSet::new();
        for root in &self.roots {
            if !self.nodes.contains_key(root) {
                return Err(integrity_error(format!("root {} does not exist", root)));
            }
            if self.parents.contains_key(root) {
                return Err(integrity_error(format!("root {} has a parent", root)));
            }
            if !seen_roots.insert(*root) {
                return Err(integrity_error(format!("root {} listed twice", root)));
            }
        }

        let mut membership: BTreeMap<NodeId, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            for child in &node.children {
                if !self.nodes.contains_key(child) {
                    return Err(integrity_error(format!(
                        "{} lists missing child {}",
                        node.id, child
                    )));
                }
                if self.parents.get(child) != Some(&node.id) {
                    return Err(integrity_error(format!(
                        "parent index for {} does not point at {}",
                        child, node.id
                    )));
                }
                *membership.entry(*child).or_default() += 1;
            }
        }
        for id in self.nodes.keys() {
            let count = membership.get(id).copied().unwrap_or(0);
            let expected = usize::from(!seen_roots.contains(id));
            if count != expected {
                return Err(integrity_error(format!(
                    "{} appears in {} child lists, expected {}",
                    id, count, expected
                )));
            }
        }
        if self.parents.len() + self.roots.len() != self.nodes.len() {
            return Err(integrity_error("parent index size mismatch".to_string()));
        }

        // Reachability: every node exactly once from the roots.
        let mut reached = 0usize;
        for root in &self.roots {
            reached += self.descendants(*root)?.len();
            let height = self.subtree_height(*root)?;
            if height > MAX_TREE_DEPTH {
                return Err(integrity_error(format!(
                    "tree under {} exceeds {} levels",
                    root, MAX_TREE_DEPTH
                )));
            }
        }
        if reached != self.nodes.len() {
            return Err(integrity_error(format!(
                "{} of {} nodes reachable from the roots",
                reached,
                self.nodes.len()
            )));
        }

        if let Some(edge) = self
            .blocking
            .iter()
            .find(|e| !self.nodes.contains_key(&e.blocker) || !self.nodes.contains_key(&e.blocked))
        {
            return Err(integrity_error(format!(
                "blocking edge {} -> {} points at a missing node",
                edge.blocker, edge.blocked
            )));
        }
        Ok(())
    }
}

fn integrity_error(message: String) -> TalusError {
    TalusError::ValidationError(format!("graph integrity: {}", message))
}

fn validate_name(name: &str) -> Result<(), TalusError> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(TalusError::ValidationError(format!(
            "node name exceeds {} bytes",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn apply_defaults(blueprint: &Blueprint, node: &mut Node) {
    if let Some(def) = blueprint.node_type(&node.type_id) {
        for (property_id, value) in def.defaults() {
            node.properties
                .entry(property_id.to_string())
                .or_insert_with(|| value.clone());
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{film_blueprint, film_graph};

    #[test]
    fn create_node_links_both_indices() {
        let bp = film_blueprint();
        let fg = film_graph(&bp);

        assert_eq!(fg.graph.get_parent(fg.task_a).expect("parent"), Some(fg.phase));
        assert_eq!(
            fg.graph.get_node(fg.phase).expect("phase").children,
            vec![fg.task_a, fg.task_b]
        );
        assert_eq!(fg.graph.get_parent(fg.root).expect("parent"), None);
        assert_eq!(fg.graph.roots(), &[fg.root]);
        fg.graph.check_integrity().expect("integrity");
    }

    #[test]
    fn create_node_applies_defaults() {
        let bp = film_blueprint();
        let fg = film_graph(&bp);
        let task = fg.graph.get_node(fg.task_a).expect("task");
        assert_eq!(task.property("status"), Some(&PropertyValue::text("st-todo")));
    }

    #[test]
    fn create_node_missing_parent_fails() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let result = fg.graph.create_node(&bp, NodeId(999), "task", "Orphan");
        assert_eq!(result, Err(TalusError::NodeNotFound(NodeId(999))));
    }

    #[test]
    fn create_node_disallowed_type_fails_without_mutation() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let before = fg.graph.node_count();
        let result = fg.graph.create_node(&bp, fg.root, "task", "Misplaced");
        assert!(matches!(result, Err(TalusError::InvalidHierarchy { .. })));
        assert_eq!(fg.graph.node_count(), before);
    }

    #[test]
    fn create_root_only_accepts_root_type() {
        let bp = film_blueprint();
        let mut graph = Graph::new();
        let result = graph.create_root(&bp, "task", "Loose task");
        assert!(matches!(
            result,
            Err(TalusError::InvalidHierarchy {
                parent_type: None,
                ..
            })
        ));
    }

    #[test]
    fn ids_follow_creation_order() {
        let bp = film_blueprint();
        let fg = film_graph(&bp);
        assert!(fg.root < fg.phase);
        assert!(fg.phase < fg.task_a);
        assert!(fg.task_a < fg.task_b);
    }

    #[test]
    fn remove_node_cascades_and_drops_edges() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let sub = fg
            .graph
            .create_node(&bp, fg.task_a, "subtask", "Permit")
            .expect("subtask");
        fg.graph.add_blocking_edge(fg.task_b, sub).expect("edge");

        let removed = fg.graph.remove_node(fg.phase).expect("remove");

        for id in [fg.phase, fg.task_a, fg.task_b, sub] {
            assert_eq!(fg.graph.get_node(id), Err(TalusError::NodeNotFound(id)));
        }
        assert_eq!(removed.nodes.len(), 4);
        assert_eq!(removed.blocking.len(), 1);
        assert_eq!(fg.graph.blocking_edges().count(), 0);
        assert!(fg.graph.get_node(fg.root).expect("root").children.is_empty());
        fg.graph.check_integrity().expect("integrity");
    }

    #[test]
    fn restore_subtree_puts_everything_back() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph.add_blocking_edge(fg.task_a, fg.task_b).expect("edge");
        let before = fg.graph.clone();

        let removed = fg.graph.remove_node(fg.task_a).expect("remove");
        fg.graph.restore_subtree(removed).expect("restore");

        assert_eq!(
            fg.graph.get_node(fg.phase).expect("phase").children,
            before.get_node(fg.phase).expect("phase").children
        );
        assert!(fg.graph.has_blocking_edge(fg.task_a, fg.task_b));
        fg.graph.check_integrity().expect("integrity");
    }

    #[test]
    fn remove_missing_node_fails() {
        let mut graph = Graph::new();
        assert!(matches!(
            graph.remove_node(NodeId(7)),
            Err(TalusError::NodeNotFound(NodeId(7)))
        ));
    }

    #[test]
    fn move_node_rejects_cycles() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let result = fg.graph.move_node(fg.phase, Some(fg.task_a), None);
        assert!(matches!(result, Err(TalusError::WouldCreateCycle { .. })));
        let result = fg.graph.move_node(fg.phase, Some(fg.phase), None);
        assert!(matches!(result, Err(TalusError::WouldCreateCycle { .. })));
        fg.graph.check_integrity().expect("integrity");
    }

    /// Chain of raw `step` nodes hanging off `top`, as deep as the limit allows.
    fn deepest_chain(graph: &mut Graph, top: NodeId) -> Vec<NodeId> {
        let mut chain = vec![top];
        while let Ok(id) = graph.insert_node(chain.last().copied(), "step", "Step") {
            chain.push(id);
        }
        chain
    }

    #[test]
    fn tree_depth_is_capped() {
        let mut graph = Graph::new();
        let root = graph.insert_node(None, "project_root", "Root").expect("root");
        let chain = deepest_chain(&mut graph, root);

        let deepest = *chain.last().expect("chain");
        assert_eq!(graph.depth(deepest).expect("depth"), MAX_TREE_DEPTH);
        assert_eq!(graph.ancestors(deepest).expect("ancestors").len(), MAX_TREE_DEPTH);
        assert!(matches!(
            graph.insert_node(Some(deepest), "step", "Too deep"),
            Err(TalusError::ValidationError(_))
        ));
        graph.check_integrity().expect("integrity");
    }

    #[test]
    fn deep_ancestor_cannot_move_under_its_descendant() {
        let mut graph = Graph::new();
        let root = graph.insert_node(None, "project_root", "Root").expect("root");
        let chain = deepest_chain(&mut graph, root);
        let deepest = *chain.last().expect("chain");

        let result = graph.move_node(chain[1], Some(deepest), None);
        assert!(matches!(result, Err(TalusError::WouldCreateCycle { .. })));
        assert_eq!(graph.node_count(), chain.len());
        graph.check_integrity().expect("integrity");
    }

    #[test]
    fn move_rejects_subtree_pushed_past_depth_limit() {
        let mut graph = Graph::new();
        let root = graph.insert_node(None, "project_root", "Root").expect("root");
        let chain = deepest_chain(&mut graph, root);
        let branch = graph.insert_node(Some(root), "step", "Branch").expect("branch");
        graph.insert_node(Some(branch), "step", "Leaf").expect("leaf");

        let target = chain[MAX_TREE_DEPTH - 1];
        assert!(matches!(
            graph.move_node(branch, Some(target), None),
            Err(TalusError::ValidationError(_))
        ));
        assert_eq!(graph.get_parent(branch).expect("parent"), Some(root));

        // One level shallower fits.
        graph
            .move_node(branch, Some(chain[MAX_TREE_DEPTH - 2]), None)
            .expect("move");
        graph.check_integrity().expect("integrity");
    }

    #[test]
    fn move_node_reorders_and_reports_previous_location() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let previous = fg
            .graph
            .move_node(fg.task_b, Some(fg.phase), Some(0))
            .expect("move");
        assert_eq!(
            previous,
            NodeLocation {
                parent: Some(fg.phase),
                index: 1
            }
        );
        assert_eq!(
            fg.graph.get_node(fg.phase).expect("phase").children,
            vec![fg.task_b, fg.task_a]
        );
        fg.graph.check_integrity().expect("integrity");
    }

    #[test]
    fn blocking_edges_are_plain_set_operations() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        assert!(fg.graph.add_blocking_edge(fg.task_a, fg.task_b).expect("add"));
        assert!(!fg.graph.add_blocking_edge(fg.task_a, fg.task_b).expect("add"));
        // cycles are accepted
        assert!(fg.graph.add_blocking_edge(fg.task_b, fg.task_a).expect("add"));
        assert_eq!(fg.graph.blocks(fg.task_a), vec![fg.task_b]);
        assert_eq!(fg.graph.blocked_by(fg.task_a), vec![fg.task_b]);
        assert!(fg.graph.remove_blocking_edge(fg.task_a, fg.task_b).expect("remove"));
        assert!(!fg.graph.remove_blocking_edge(fg.task_a, fg.task_b).expect("remove"));
        assert!(fg.graph.add_blocking_edge(fg.task_a, NodeId(404)).is_err());
    }

    #[test]
    fn set_property_validates_schema() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let previous = fg
            .graph
            .set_property(&bp, fg.task_a, "estimated_cost", 120.0.into())
            .expect("set");
        assert_eq!(previous, None);
        assert!(matches!(
            fg.graph.set_property(&bp, fg.task_a, "estimated_cost", "lots".into()),
            Err(TalusError::ValidationError(_))
        ));
        assert!(matches!(
            fg.graph.set_property(&bp, fg.task_a, "colour", "red".into()),
            Err(TalusError::ValidationError(_))
        ));
    }

    #[test]
    fn required_property_cannot_be_removed() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        assert!(matches!(
            fg.graph.remove_property(&bp, fg.task_a, "status"),
            Err(TalusError::ValidationError(_))
        ));
        fg.graph
            .set_property(&bp, fg.task_a, "notes", "call ahead".into())
            .expect("set");
        let removed = fg.graph.remove_property(&bp, fg.task_a, "notes").expect("remove");
        assert_eq!(removed, Some(PropertyValue::text("call ahead")));
    }

    #[test]
    fn ancestors_and_depth() {
        let bp = film_blueprint();
        let fg = film_graph(&bp);
        assert_eq!(fg.graph.ancestors(fg.task_a).expect("ancestors"), vec![fg.phase, fg.root]);
        assert_eq!(fg.graph.depth(fg.task_a).expect("depth"), 2);
        assert_eq!(fg.graph.depth(fg.root).expect("depth"), 0);
    }

    #[test]
    fn insert_node_skips_blueprint_checks() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let container = fg
            .graph
            .insert_node(Some(fg.root), "inventory_root", "Inventory")
            .expect("insert");
        assert_eq!(fg.graph.get_parent(container).expect("parent"), Some(fg.root));
        fg.graph.check_integrity().expect("integrity");
    }
}
