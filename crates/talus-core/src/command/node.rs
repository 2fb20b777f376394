//! Node lifecycle and property commands.

use super::{CommandContext, CommandOutput, Reversible};
use crate::events::DomainEvent;
use crate::graph::RemovedSubtree;
use crate::{NodeId, PropertyValue, TalusError};

// =============================================================================
// CREATE NODE
// =============================================================================

/// Create a node under an existing parent.
#[derive(Debug, Clone)]
pub struct CreateNode {
    parent: NodeId,
    type_id: String,
    name: String,
    /// Set on first execution; reused on redo.
    created: Option<NodeId>,
}

impl CreateNode {
    #[must_use]
    pub fn new(parent: NodeId, type_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent,
            type_id: type_id.into(),
            name: name.into(),
            created: None,
        }
    }

    /// The id this command created, once executed.
    #[must_use]
    pub fn created(&self) -> Option<NodeId> {
        self.created
    }

    #[must_use]
    pub fn parent(&self) -> NodeId {
        self.parent
    }
}

impl Reversible for CreateNode {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        let id = ctx.graph.create_node_with_id(
            ctx.blueprint,
            self.parent,
            &self.type_id,
            &self.name,
            self.created,
        )?;
        self.created = Some(id);
        ctx.emit(DomainEvent::NodeCreated {
            node: id,
            parent: Some(self.parent),
            type_id: self.type_id.clone(),
        });
        Ok(CommandOutput::Created(id))
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        let id = self.created.ok_or_else(|| not_executed("create_node"))?;
        let removed = ctx.graph.remove_node(id)?;
        ctx.emit(DomainEvent::NodeDeleted {
            node: id,
            parent: removed.location.parent,
            removed: removed.node_ids().collect(),
        });
        Ok(())
    }
}

// =============================================================================
// DELETE NODE
// =============================================================================

/// Cascade-delete a node. The removed subtree is kept for undo.
#[derive(Debug, Clone)]
pub struct DeleteNode {
    node: NodeId,
    removed: Option<RemovedSubtree>,
}

impl DeleteNode {
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            removed: None,
        }
    }
}

impl Reversible for DeleteNode {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        let removed = ctx.graph.remove_node(self.node)?;
        ctx.emit(DomainEvent::NodeDeleted {
            node: self.node,
            parent: removed.location.parent,
            removed: removed.node_ids().collect(),
        });
        self.removed = Some(removed);
        Ok(CommandOutput::Unit)
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        let removed = self.removed.take().ok_or_else(|| not_executed("delete_node"))?;
        let restored: Vec<(NodeId, String)> = removed
            .nodes
            .iter()
            .map(|n| (n.id, n.type_id.clone()))
            .collect();
        let edges = removed.blocking.clone();

        if let Err(e) = ctx.graph.restore_subtree(removed.clone()) {
            self.removed = Some(removed);
            return Err(e);
        }

        for (id, type_id) in restored {
            let parent = ctx.graph.get_parent(id)?;
            ctx.emit(DomainEvent::NodeCreated {
                node: id,
                parent,
                type_id,
            });
        }
        for edge in edges {
            ctx.emit(DomainEvent::BlockingLinked {
                blocker: edge.blocker,
                blocked: edge.blocked,
            });
        }
        Ok(())
    }
}

// =============================================================================
// UPDATE PROPERTY
// =============================================================================

/// The requested change to one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    Set(PropertyValue),
    Remove,
}

/// Set or remove one property on a node.
#[derive(Debug, Clone)]
pub struct UpdateProperty {
    node: NodeId,
    property: String,
    change: PropertyChange,
    /// Value before execution (`Some(None)` = was absent).
    previous: Option<Option<PropertyValue>>,
}

impl UpdateProperty {
    #[must_use]
    pub fn new(node: NodeId, property: impl Into<String>, change: PropertyChange) -> Self {
        Self {
            node,
            property: property.into(),
            change,
            previous: None,
        }
    }

    #[must_use]
    pub fn change(&self) -> &PropertyChange {
        &self.change
    }
}

impl Reversible for UpdateProperty {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        let previous = match &self.change {
            PropertyChange::Set(value) => {
                let previous =
                    ctx.graph
                        .set_property(ctx.blueprint, self.node, &self.property, value.clone())?;
                ctx.emit(DomainEvent::PropertyChanged {
                    node: self.node,
                    property: self.property.clone(),
                    value: value.clone(),
                });
                previous
            }
            PropertyChange::Remove => {
                let previous = ctx
                    .graph
                    .remove_property(ctx.blueprint, self.node, &self.property)?;
                if previous.is_some() {
                    ctx.emit(DomainEvent::PropertyDeleted {
                        node: self.node,
                        property: self.property.clone(),
                    });
                }
                previous
            }
        };
        let changed = previous.as_ref() != self.target_value();
        self.previous = Some(previous);
        Ok(CommandOutput::Changed(changed))
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        let previous = self
            .previous
            .take()
            .ok_or_else(|| not_executed("update_property"))?;
        ctx.graph
            .restore_property(self.node, &self.property, previous.clone())?;
        ctx.emit(match previous {
            Some(value) => DomainEvent::PropertyChanged {
                node: self.node,
                property: self.property.clone(),
                value,
            },
            None => DomainEvent::PropertyDeleted {
                node: self.node,
                property: self.property.clone(),
            },
        });
        Ok(())
    }
}

impl UpdateProperty {
    fn target_value(&self) -> Option<&PropertyValue> {
        match &self.change {
            PropertyChange::Set(value) => Some(value),
            PropertyChange::Remove => None,
        }
    }
}

pub(super) fn not_executed(name: &str) -> TalusError {
    TalusError::ValidationError(format!("{} has not been executed", name))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::command::test_harness::{revert, run};
    use crate::command::{Command, CommandOutput};
    use crate::events::DomainEvent;
    use crate::test_support::{film_blueprint, film_graph};
    use crate::{PropertyValue, TalusError};

    #[test]
    fn create_then_undo_then_redo_reuses_id() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let mut cmd = Command::create_node(fg.task_a, "subtask", "Permit");

        let (result, events) = run(&mut cmd, &mut fg.graph, &bp);
        let id = result.expect("create").created().expect("id");
        assert!(matches!(events.as_slice(), [DomainEvent::NodeCreated { .. }]));

        revert(&mut cmd, &mut fg.graph, &bp).0.expect("undo");
        assert!(!fg.graph.contains_node(id));

        let (result, _) = run(&mut cmd, &mut fg.graph, &bp);
        assert_eq!(result.expect("redo"), CommandOutput::Created(id));
        assert_eq!(fg.graph.get_parent(id).expect("parent"), Some(fg.task_a));
    }

    #[test]
    fn create_with_invalid_hierarchy_changes_nothing() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let before = fg.graph.to_snapshot().expect("snapshot");
        let mut cmd = Command::create_node(fg.root, "subtask", "Nope");

        let (result, events) = run(&mut cmd, &mut fg.graph, &bp);
        assert!(matches!(result, Err(TalusError::InvalidHierarchy { .. })));
        assert!(events.is_empty());
        assert_eq!(fg.graph.to_snapshot().expect("snapshot"), before);
    }

    #[test]
    fn delete_undo_restores_subtree_and_edges() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph.add_blocking_edge(fg.task_a, fg.task_b).expect("edge");
        let before = fg.graph.to_snapshot().expect("snapshot");

        let mut cmd = Command::delete_node(fg.phase);
        run(&mut cmd, &mut fg.graph, &bp).0.expect("delete");
        assert_eq!(fg.graph.node_count(), 1);

        let (result, events) = revert(&mut cmd, &mut fg.graph, &bp);
        result.expect("undo");
        assert_eq!(fg.graph.to_snapshot().expect("snapshot"), before);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, DomainEvent::NodeCreated { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn update_property_undo_restores_absence() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let mut cmd = Command::set_property(fg.task_a, "estimated_cost", 90.0);

        run(&mut cmd, &mut fg.graph, &bp).0.expect("set");
        revert(&mut cmd, &mut fg.graph, &bp).0.expect("undo");

        let task = fg.graph.get_node(fg.task_a).expect("task");
        assert_eq!(task.property("estimated_cost"), None);
    }

    #[test]
    fn update_property_undo_restores_previous_value() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let mut cmd = Command::set_property(fg.task_a, "status", "st-done");

        run(&mut cmd, &mut fg.graph, &bp).0.expect("set");
        revert(&mut cmd, &mut fg.graph, &bp).0.expect("undo");

        let task = fg.graph.get_node(fg.task_a).expect("task");
        assert_eq!(task.property("status"), Some(&PropertyValue::text("st-todo")));
    }

    #[test]
    fn remove_property_round_trips() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph
            .set_property(&bp, fg.task_a, "notes", "bring permits".into())
            .expect("set");

        let mut cmd = Command::remove_property(fg.task_a, "notes");
        let (result, events) = run(&mut cmd, &mut fg.graph, &bp);
        assert_eq!(result.expect("remove"), CommandOutput::Changed(true));
        assert!(matches!(events.as_slice(), [DomainEvent::PropertyDeleted { .. }]));

        revert(&mut cmd, &mut fg.graph, &bp).0.expect("undo");
        let task = fg.graph.get_node(fg.task_a).expect("task");
        assert_eq!(task.property("notes"), Some(&PropertyValue::text("bring permits")));
    }

    #[test]
    fn undo_before_execute_is_an_error() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        let mut cmd = Command::delete_node(fg.task_a);
        assert!(revert(&mut cmd, &mut fg.graph, &bp).0.is_err());
    }
}
