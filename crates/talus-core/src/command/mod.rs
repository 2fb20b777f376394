//! # Commands
//!
//! Reversible mutations: the only sanctioned way to change a project graph
//! once a session is open.
//!
//! Each command captures whatever it needs to reverse itself during
//! `execute`. Redo re-runs `execute` with the same captured parameters; a
//! redone `CreateNode` reuses the id it was first given, so undo/redo cycles
//! reproduce identical graphs.
//!
//! Primitive commands validate every precondition before touching the graph.
//! `ApplyKit` is built from primitives and rolls them back on failure.
//!
//! Commands do not publish events themselves. They append to a buffer the
//! dispatcher flushes only when the whole command succeeded.

mod kit;
mod link;
mod node;

pub use kit::ApplyKit;
pub use link::{LinkBlocking, MoveNode, UnlinkBlocking};
pub use node::{CreateNode, DeleteNode, PropertyChange, UpdateProperty};

use crate::blueprint::Blueprint;
use crate::events::DomainEvent;
use crate::{Graph, NodeId, PropertyValue, TalusError};

// =============================================================================
// CONTEXT & CONTRACT
// =============================================================================

/// What a command may touch while it runs.
pub(crate) struct CommandContext<'a> {
    pub graph: &'a mut Graph,
    pub blueprint: &'a Blueprint,
    pub events: &'a mut Vec<DomainEvent>,
}

impl CommandContext<'_> {
    pub fn emit(&mut self, event: DomainEvent) {
        self.events.push(event);
    }
}

/// Execute/undo contract shared by every command.
pub(crate) trait Reversible {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError>;
    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError>;
}

/// What a successful command hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Nothing worth reporting.
    Unit,
    /// The node the command created.
    Created(NodeId),
    /// Several created nodes (ApplyKit: the top-level clones).
    CreatedMany(Vec<NodeId>),
    /// Whether a set-style operation changed anything.
    Changed(bool),
}

impl CommandOutput {
    /// The created node, if exactly one was created.
    #[must_use]
    pub fn created(&self) -> Option<NodeId> {
        match self {
            Self::Created(id) => Some(*id),
            _ => None,
        }
    }

    /// Every created node id reported by the command.
    #[must_use]
    pub fn created_ids(&self) -> Vec<NodeId> {
        match self {
            Self::Created(id) => vec![*id],
            Self::CreatedMany(ids) => ids.clone(),
            Self::Unit | Self::Changed(_) => Vec::new(),
        }
    }
}

// =============================================================================
// COMMAND
// =============================================================================

/// A mutation request, plus the reverse state it captured once executed.
#[derive(Debug, Clone)]
pub enum Command {
    CreateNode(CreateNode),
    DeleteNode(DeleteNode),
    UpdateProperty(UpdateProperty),
    MoveNode(MoveNode),
    LinkBlocking(LinkBlocking),
    UnlinkBlocking(UnlinkBlocking),
    ApplyKit(ApplyKit),
}

impl Command {
    #[must_use]
    pub fn create_node(parent: NodeId, type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::CreateNode(CreateNode::new(parent, type_id, name))
    }

    #[must_use]
    pub fn delete_node(node: NodeId) -> Self {
        Self::DeleteNode(DeleteNode::new(node))
    }

    #[must_use]
    pub fn set_property(
        node: NodeId,
        property: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self::UpdateProperty(UpdateProperty::new(
            node,
            property,
            PropertyChange::Set(value.into()),
        ))
    }

    #[must_use]
    pub fn remove_property(node: NodeId, property: impl Into<String>) -> Self {
        Self::UpdateProperty(UpdateProperty::new(node, property, PropertyChange::Remove))
    }

    /// Move `node` under `new_parent` (`None` = root level) at `position` (`None` = append).
    #[must_use]
    pub fn move_node(node: NodeId, new_parent: Option<NodeId>, position: Option<usize>) -> Self {
        Self::MoveNode(MoveNode::new(node, new_parent, position))
    }

    #[must_use]
    pub fn link_blocking(blocker: NodeId, blocked: NodeId) -> Self {
        Self::LinkBlocking(LinkBlocking::new(blocker, blocked))
    }

    #[must_use]
    pub fn unlink_blocking(blocker: NodeId, blocked: NodeId) -> Self {
        Self::UnlinkBlocking(UnlinkBlocking::new(blocker, blocked))
    }

    /// Clone every child subtree of `kit` under `target`.
    #[must_use]
    pub fn apply_kit(kit: NodeId, target: NodeId) -> Self {
        Self::ApplyKit(ApplyKit::new(kit, target))
    }

    /// Stable name used in events and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateNode(_) => "create_node",
            Self::DeleteNode(_) => "delete_node",
            Self::UpdateProperty(c) => match c.change() {
                PropertyChange::Set(_) => "set_property",
                PropertyChange::Remove => "remove_property",
            },
            Self::MoveNode(_) => "move_node",
            Self::LinkBlocking(_) => "link_blocking",
            Self::UnlinkBlocking(_) => "unlink_blocking",
            Self::ApplyKit(_) => "apply_kit",
        }
    }

    fn inner(&mut self) -> &mut dyn Reversible {
        match self {
            Self::CreateNode(c) => c,
            Self::DeleteNode(c) => c,
            Self::UpdateProperty(c) => c,
            Self::MoveNode(c) => c,
            Self::LinkBlocking(c) => c,
            Self::UnlinkBlocking(c) => c,
            Self::ApplyKit(c) => c,
        }
    }
}

impl Reversible for Command {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        self.inner().execute(ctx)
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        self.inner().undo(ctx)
    }
}

#[cfg(test)]
pub(crate) mod test_harness {
    //! Runs commands against a bare graph, without a dispatcher.

    use super::*;

    pub fn run(
        command: &mut Command,
        graph: &mut Graph,
        blueprint: &Blueprint,
    ) -> (Result<CommandOutput, TalusError>, Vec<DomainEvent>) {
        let mut events = Vec::new();
        let mut ctx = CommandContext {
            graph,
            blueprint,
            events: &mut events,
        };
        let result = command.execute(&mut ctx);
        (result, events)
    }

    pub fn revert(
        command: &mut Command,
        graph: &mut Graph,
        blueprint: &Blueprint,
    ) -> (Result<(), TalusError>, Vec<DomainEvent>) {
        let mut events = Vec::new();
        let mut ctx = CommandContext {
            graph,
            blueprint,
            events: &mut events,
        };
        let result = command.undo(&mut ctx);
        (result, events)
    }
}
