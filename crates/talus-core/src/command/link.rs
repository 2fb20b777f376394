//! Structural commands: tree moves and blocking edges.

use super::node::not_executed;
use super::{CommandContext, CommandOutput, Reversible};
use crate::events::DomainEvent;
use crate::graph::NodeLocation;
use crate::{NodeId, TalusError};

// =============================================================================
// MOVE NODE
// =============================================================================

/// Re-parent or reorder a node within the ownership tree.
///
/// The new parent's type must allow the node's type; moving to the root level
/// requires the blueprint's root type.
#[derive(Debug, Clone)]
pub struct MoveNode {
    node: NodeId,
    new_parent: Option<NodeId>,
    position: Option<usize>,
    previous: Option<NodeLocation>,
}

impl MoveNode {
    #[must_use]
    pub fn new(node: NodeId, new_parent: Option<NodeId>, position: Option<usize>) -> Self {
        Self {
            node,
            new_parent,
            position,
            previous: None,
        }
    }
}

impl Reversible for MoveNode {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        let node_type = ctx.graph.get_node(self.node)?.type_id.clone();
        match self.new_parent {
            Some(parent) => {
                let parent_type = &ctx.graph.get_node(parent)?.type_id;
                ctx.blueprint.ensure_allowed_child(parent_type, &node_type)?;
            }
            None if node_type != ctx.blueprint.root_type => {
                return Err(TalusError::InvalidHierarchy {
                    parent_type: None,
                    child_type: node_type,
                });
            }
            None => {}
        }

        let previous = ctx
            .graph
            .move_node(self.node, self.new_parent, self.position)?;
        let now = ctx.graph.location(self.node)?;
        self.previous = Some(previous);

        ctx.emit(DomainEvent::NodeUnlinked {
            node: self.node,
            parent: previous.parent,
        });
        ctx.emit(DomainEvent::NodeLinked {
            node: self.node,
            parent: now.parent,
            index: now.index,
        });
        Ok(CommandOutput::Changed(previous != now))
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        let previous = self.previous.take().ok_or_else(|| not_executed("move_node"))?;
        let current = ctx
            .graph
            .move_node(self.node, previous.parent, Some(previous.index))?;
        ctx.emit(DomainEvent::NodeUnlinked {
            node: self.node,
            parent: current.parent,
        });
        ctx.emit(DomainEvent::NodeLinked {
            node: self.node,
            parent: previous.parent,
            index: previous.index,
        });
        Ok(())
    }
}

// =============================================================================
// BLOCKING EDGES
// =============================================================================

/// Add a blocking edge. Adding an existing edge succeeds and changes nothing.
#[derive(Debug, Clone)]
pub struct LinkBlocking {
    blocker: NodeId,
    blocked: NodeId,
    changed: Option<bool>,
}

impl LinkBlocking {
    #[must_use]
    pub fn new(blocker: NodeId, blocked: NodeId) -> Self {
        Self {
            blocker,
            blocked,
            changed: None,
        }
    }
}

impl Reversible for LinkBlocking {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        let changed = ctx.graph.add_blocking_edge(self.blocker, self.blocked)?;
        if changed {
            ctx.emit(DomainEvent::BlockingLinked {
                blocker: self.blocker,
                blocked: self.blocked,
            });
        }
        self.changed = Some(changed);
        Ok(CommandOutput::Changed(changed))
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        let changed = self.changed.take().ok_or_else(|| not_executed("link_blocking"))?;
        if changed {
            ctx.graph.remove_blocking_edge(self.blocker, self.blocked)?;
            ctx.emit(DomainEvent::BlockingUnlinked {
                blocker: self.blocker,
                blocked: self.blocked,
            });
        }
        Ok(())
    }
}

/// Remove a blocking edge. Removing a missing edge succeeds and changes nothing.
#[derive(Debug, Clone)]
pub struct UnlinkBlocking {
    blocker: NodeId,
    blocked: NodeId,
    changed: Option<bool>,
}

impl UnlinkBlocking {
    #[must_use]
    pub fn new(blocker: NodeId, blocked: NodeId) -> Self {
        Self {
            blocker,
            blocked,
            changed: None,
        }
    }
}

impl Reversible for UnlinkBlocking {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        let changed = ctx.graph.remove_blocking_edge(self.blocker, self.blocked)?;
        if changed {
            ctx.emit(DomainEvent::BlockingUnlinked {
                blocker: self.blocker,
                blocked: self.blocked,
            });
        }
        self.changed = Some(changed);
        Ok(CommandOutput::Changed(changed))
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        let changed = self
            .changed
            .take()
            .ok_or_else(|| not_executed("unlink_blocking"))?;
        if changed {
            ctx.graph.add_blocking_edge(self.blocker, self.blocked)?;
            ctx.emit(DomainEvent::BlockingLinked {
                blocker: self.blocker,
                blocked: self.blocked,
            });
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
