//! # Domain Events
//!
//! Notifications describing what happened to a project graph.
//!
//! The engine pushes events onto an internal `std::sync::mpsc` channel through
//! an [`EventSink`]. A separate [`EventForwarder`] drains that channel into a
//! [`Notifier`], which is where transports (websocket broadcast, UI bridge,
//! logging) plug in.
//!
//! Emission is fire-and-forget: a disabled sink or a dropped receiver never
//! affects the outcome of a graph operation.

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

// =============================================================================
// EVENT TYPES
// =============================================================================

/// Identifier the dispatcher assigns to each executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Something that happened to the graph or the command history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    NodeCreated {
        node: NodeId,
        parent: Option<NodeId>,
        type_id: String,
    },
    /// `removed` lists the whole cascaded subtree, top node first.
    NodeDeleted {
        node: NodeId,
        parent: Option<NodeId>,
        removed: Vec<NodeId>,
    },
    NodeLinked {
        node: NodeId,
        parent: Option<NodeId>,
        index: usize,
    },
    NodeUnlinked {
        node: NodeId,
        parent: Option<NodeId>,
    },
    BlockingLinked {
        blocker: NodeId,
        blocked: NodeId,
    },
    BlockingUnlinked {
        blocker: NodeId,
        blocked: NodeId,
    },
    PropertyChanged {
        node: NodeId,
        property: String,
        value: crate::PropertyValue,
    },
    PropertyDeleted {
        node: NodeId,
        property: String,
    },
    CommandExecuting {
        command: CommandId,
        name: String,
    },
    CommandExecuted {
        command: CommandId,
        name: String,
    },
    CommandFailed {
        command: CommandId,
        name: String,
        error: String,
    },
    UndoPerformed {
        command: CommandId,
        name: String,
    },
    RedoPerformed {
        command: CommandId,
        name: String,
    },
    MigrationApplied {
        from: String,
        to: String,
        messages: Vec<String>,
    },
}

impl DomainEvent {
    /// Short dotted name, e.g. `node.created`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NodeCreated { .. } => "node.created",
            Self::NodeDeleted { .. } => "node.deleted",
            Self::NodeLinked { .. } => "node.linked",
            Self::NodeUnlinked { .. } => "node.unlinked",
            Self::BlockingLinked { .. } => "blocking.linked",
            Self::BlockingUnlinked { .. } => "blocking.unlinked",
            Self::PropertyChanged { .. } => "property.changed",
            Self::PropertyDeleted { .. } => "property.deleted",
            Self::CommandExecuting { .. } => "command.executing",
            Self::CommandExecuted { .. } => "command.executed",
            Self::CommandFailed { .. } => "command.failed",
            Self::UndoPerformed { .. } => "history.undo",
            Self::RedoPerformed { .. } => "history.redo",
            Self::MigrationApplied { .. } => "migration.applied",
        }
    }
}

// =============================================================================
// SINK
// =============================================================================

/// Sending half of the event channel.
///
/// Cheap to clone. The default sink is disabled and drops every event.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<DomainEvent>>,
}

impl EventSink {
    /// Create a connected sink and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, Receiver<DomainEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Publish an event. A closed channel is logged and otherwise ignored.
    pub fn emit(&self, event: DomainEvent) {
        if let Some(sender) = &self.sender
            && sender.send(event).is_err()
        {
            tracing::trace!("event receiver dropped; event discarded");
        }
    }

    /// Publish a batch of events in order.
    pub fn emit_all(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

// =============================================================================
// NOTIFIER
// =============================================================================

/// Destination for forwarded events.
pub trait Notifier {
    fn notify(&mut self, event: &DomainEvent);
}

/// Notifier that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&mut self, _event: &DomainEvent) {}
}

/// Notifier that emits each event as a `tracing` debug record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, event: &DomainEvent) {
        tracing::debug!(event_type = event.event_type(), ?event, "domain event");
    }
}

/// Any closure over an event is a notifier.
impl<F> Notifier for F
where
    F: FnMut(&DomainEvent),
{
    fn notify(&mut self, event: &DomainEvent) {
        self(event);
    }
}

// =============================================================================
// FORWARDER
// =============================================================================

/// Drains the event channel into a notifier.
///
/// Either call [`drain`](Self::drain) between operations or hand the forwarder
/// to its own thread and call [`run`](Self::run), which returns once every
/// sink has been dropped.
pub struct EventForwarder<N: Notifier> {
    receiver: Receiver<DomainEvent>,
    notifier: N,
}

impl<N: Notifier> EventForwarder<N> {
    pub fn new(receiver: Receiver<DomainEvent>, notifier: N) -> Self {
        Self { receiver, notifier }
    }

    /// Forward everything currently queued without blocking.
    ///
    /// Returns the number of events forwarded.
    pub fn drain(&mut self) -> usize {
        let mut forwarded = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.notifier.notify(&event);
                    forwarded += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!("event channel closed");
                    break;
                }
            }
        }
        forwarded
    }

    /// Forward events until every sink is dropped.
    ///
    /// Returns the number of events forwarded.
    pub fn run(mut self) -> usize {
        let mut forwarded = 0;
        while let Ok(event) = self.receiver.recv() {
            self.notifier.notify(&event);
            forwarded += 1;
        }
        tracing::debug!(forwarded, "event forwarder stopped");
        forwarded
    }

    /// Recover the notifier.
    pub fn into_notifier(self) -> N {
        self.notifier
    }
}

// =============================================================================
// TESTS
// =============================================================================
