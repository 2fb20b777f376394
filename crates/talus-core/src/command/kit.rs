//! # ApplyKit
//!
//! Macro command that clones every child subtree of a kit node under a target.
//!
//! The kit is read into a plan before anything is mutated, so a target inside
//! the kit itself clones the kit as it was, once. The plan is then carried out
//! as a sequence of primitive `CreateNode` / `UpdateProperty` sub-commands.
//! If any of them fails, the ones already applied are undone in reverse order
//! and the events they buffered are discarded: the kit lands completely or not
//! at all.

use super::{Command, CommandContext, CommandOutput, Reversible};
use crate::{Graph, NodeId, PropertyValue, TalusError};
use std::collections::BTreeMap;

/// One node of the captured kit, in pre-order.
#[derive(Debug, Clone)]
struct PlannedNode {
    source: NodeId,
    /// Source parent inside the kit; `None` for the kit's direct children.
    source_parent: Option<NodeId>,
    type_id: String,
    name: String,
    properties: Vec<(String, PropertyValue)>,
}

/// Clone a kit's children under a target node.
#[derive(Debug, Clone)]
pub struct ApplyKit {
    kit: NodeId,
    target: NodeId,
    /// Sub-commands in execution order. Replayed as-is on redo.
    applied: Vec<Command>,
    /// Clones placed directly under the target.
    top_level: Vec<NodeId>,
    planned: bool,
}

impl ApplyKit {
    #[must_use]
    pub fn new(kit: NodeId, target: NodeId) -> Self {
        Self {
            kit,
            target,
            applied: Vec::new(),
            top_level: Vec::new(),
            planned: false,
        }
    }

    /// Number of primitive sub-commands this kit application consists of.
    #[must_use]
    pub fn sub_command_count(&self) -> usize {
        self.applied.len()
    }

    fn first_run(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        ctx.graph.get_node(self.target)?;
        let plan = capture_plan(ctx.graph, self.kit)?;
        let mut clones: BTreeMap<NodeId, NodeId> = BTreeMap::new();

        for planned in plan {
            let parent = match planned.source_parent {
                Some(source) => clones.get(&source).copied().ok_or_else(|| {
                    TalusError::ValidationError(format!("kit node {} cloned out of order", source))
                })?,
                None => self.target,
            };

            let mut create = Command::create_node(parent, planned.type_id, planned.name);
            let output = create.execute(ctx)?;
            self.applied.push(create);
            let clone = output.created().ok_or_else(|| {
                TalusError::ValidationError("create_node produced no node".to_string())
            })?;
            clones.insert(planned.source, clone);
            if planned.source_parent.is_none() {
                self.top_level.push(clone);
            }

            for (property, value) in planned.properties {
                let mut update = Command::set_property(clone, property, value);
                update.execute(ctx)?;
                self.applied.push(update);
            }
        }
        Ok(())
    }

    /// Re-run stored sub-commands. Returns how many succeeded.
    fn replay(&mut self, ctx: &mut CommandContext<'_>) -> (usize, Result<(), TalusError>) {
        for (done, command) in self.applied.iter_mut().enumerate() {
            if let Err(e) = command.execute(ctx) {
                return (done, Err(e));
            }
        }
        (self.applied.len(), Ok(()))
    }

    /// Undo the first `count` sub-commands, newest first.
    fn rollback(&mut self, ctx: &mut CommandContext<'_>, count: usize) {
        for command in self.applied[..count].iter_mut().rev() {
            if let Err(e) = command.undo(ctx) {
                tracing::warn!(error = %e, sub_command = command.name(), "apply_kit rollback step failed");
            }
        }
    }
}

impl Reversible for ApplyKit {
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<CommandOutput, TalusError> {
        let mark = ctx.events.len();

        let result = if self.planned {
            let (done, result) = self.replay(ctx);
            if result.is_err() {
                self.rollback(ctx, done);
            }
            result
        } else {
            let result = self.first_run(ctx);
            if result.is_err() {
                let count = self.applied.len();
                self.rollback(ctx, count);
                self.applied.clear();
                self.top_level.clear();
            }
            result
        };

        match result {
            Ok(()) => {
                self.planned = true;
                tracing::debug!(
                    kit = %self.kit,
                    target = %self.target,
                    sub_commands = self.applied.len(),
                    "kit applied"
                );
                Ok(CommandOutput::CreatedMany(self.top_level.clone()))
            }
            Err(e) => {
                ctx.events.truncate(mark);
                tracing::debug!(kit = %self.kit, target = %self.target, error = %e, "kit rolled back");
                Err(e)
            }
        }
    }

    fn undo(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), TalusError> {
        let total = self.applied.len();
        for undone in 0..total {
            let index = total - 1 - undone;
            if let Err(e) = self.applied[index].undo(ctx) {
                // Put back what was already reverted, oldest first.
                for command in &mut self.applied[index + 1..] {
                    if let Err(redo_err) = command.execute(ctx) {
                        tracing::warn!(error = %redo_err, sub_command = command.name(), "apply_kit undo recovery step failed");
                    }
                }
                tracing::debug!(kit = %self.kit, target = %self.target, error = %e, "kit undo abandoned");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Read the kit's child subtrees into a pre-order plan.
fn capture_plan(graph: &Graph, kit: NodeId) -> Result<Vec<PlannedNode>, TalusError> {
    let kit_node = graph.get_node(kit)?;
    let mut plan = Vec::new();
    let mut stack: Vec<(NodeId, Option<NodeId>)> =
        kit_node.children.iter().rev().map(|c| (*c, None)).collect();

    while let Some((source, source_parent)) = stack.pop() {
        let node = graph.get_node(source)?;
        plan.push(PlannedNode {
            source,
            source_parent,
            type_id: node.type_id.clone(),
            name: node.name.clone(),
            properties: node
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        });
        stack.extend(node.children.iter().rev().map(|c| (*c, Some(source))));
    }
    Ok(plan)
}

// =============================================================================
// TESTS
// =============================================================================
