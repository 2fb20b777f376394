//! # Command Dispatcher
//!
//! Owns the project graph and sequences every mutation through reversible
//! commands.
//!
//! ## Contract
//!
//! - `execute`: on success the command joins the undo stack, the redo stack
//!   is cleared and the command's buffered events are published. On failure
//!   `CommandFailed` is published and both stacks are left untouched.
//! - `undo` / `redo`: move one command between the stacks. A failing undo or
//!   redo leaves the command where it was.
//! - History is bounded; the oldest undo entry is dropped past the limit.
//!
//! Lifecycle events (`CommandExecuting`, `CommandExecuted`, ...) bracket the
//! domain events of each command.

use crate::blueprint::Blueprint;
use crate::command::{Command, CommandContext, CommandOutput, Reversible};
use crate::config::EngineConfig;
use crate::events::{CommandId, DomainEvent, EventSink};
use crate::{Graph, TalusError};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug)]
struct HistoryEntry {
    id: CommandId,
    command: Command,
}

/// Sequences commands against one graph and keeps undo/redo history.
#[derive(Debug)]
pub struct Dispatcher {
    graph: Graph,
    blueprint: Arc<Blueprint>,
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    history_limit: usize,
    next_command_id: u64,
    events: EventSink,
}

impl Dispatcher {
    /// Bind a dispatcher to a graph and blueprint.
    pub fn new(graph: Graph, blueprint: Arc<Blueprint>, config: &EngineConfig, events: EventSink) -> Self {
        Self {
            graph,
            blueprint,
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            history_limit: config.history_limit.max(1),
            next_command_id: 1,
            events,
        }
    }

    /// The graph, read-only. Mutation goes through `execute`.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    /// Release the graph, discarding history.
    #[must_use]
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Execute a command and record it for undo.
    pub fn execute(&mut self, mut command: Command) -> Result<CommandOutput, TalusError> {
        let id = CommandId(self.next_command_id);
        self.next_command_id += 1;
        let name = command.name();

        self.events.emit(DomainEvent::CommandExecuting {
            command: id,
            name: name.to_string(),
        });

        let mut buffered = Vec::new();
        let result = {
            let mut ctx = CommandContext {
                graph: &mut self.graph,
                blueprint: &self.blueprint,
                events: &mut buffered,
            };
            command.execute(&mut ctx)
        };

        match result {
            Ok(output) => {
                tracing::debug!(command = %id, name, "command executed");
                self.push_undo(HistoryEntry { id, command });
                self.redo_stack.clear();
                self.events.emit_all(buffered);
                self.events.emit(DomainEvent::CommandExecuted {
                    command: id,
                    name: name.to_string(),
                });
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(command = %id, name, error = %e, "command failed");
                self.events.emit(DomainEvent::CommandFailed {
                    command: id,
                    name: name.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Undo the most recent command. Returns its id.
    pub fn undo(&mut self) -> Result<CommandId, TalusError> {
        let mut entry = self.undo_stack.pop_back().ok_or(TalusError::EmptyUndoStack)?;

        let mut buffered = Vec::new();
        let result = {
            let mut ctx = CommandContext {
                graph: &mut self.graph,
                blueprint: &self.blueprint,
                events: &mut buffered,
            };
            entry.command.undo(&mut ctx)
        };

        if let Err(e) = result {
            tracing::warn!(command = %entry.id, name = entry.command.name(), error = %e, "undo failed");
            self.undo_stack.push_back(entry);
            return Err(e);
        }

        let id = entry.id;
        let name = entry.command.name();
        tracing::debug!(command = %id, name, "command undone");
        self.redo_stack.push(entry);
        self.events.emit_all(buffered);
        self.events.emit(DomainEvent::UndoPerformed {
            command: id,
            name: name.to_string(),
        });
        Ok(id)
    }

    /// Re-execute the most recently undone command.
    pub fn redo(&mut self) -> Result<CommandOutput, TalusError> {
        let mut entry = self.redo_stack.pop().ok_or(TalusError::EmptyRedoStack)?;

        let mut buffered = Vec::new();
        let result = {
            let mut ctx = CommandContext {
                graph: &mut self.graph,
                blueprint: &self.blueprint,
                events: &mut buffered,
            };
            entry.command.execute(&mut ctx)
        };

        match result {
            Ok(output) => {
                let id = entry.id;
                let name = entry.command.name();
                tracing::debug!(command = %id, name, "command redone");
                self.push_undo(entry);
                self.events.emit_all(buffered);
                self.events.emit(DomainEvent::RedoPerformed {
                    command: id,
                    name: name.to_string(),
                });
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(command = %entry.id, name = entry.command.name(), error = %e, "redo failed");
                self.redo_stack.push(entry);
                Err(e)
            }
        }
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push_back(entry);
        while self.undo_stack.len() > self.history_limit {
            if let Some(dropped) = self.undo_stack.pop_front() {
                tracing::trace!(command = %dropped.id, "history limit reached; oldest command dropped");
            }
        }
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Forget all history. The graph is unchanged.
    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================
