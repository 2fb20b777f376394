//! # talus-core
//!
//! The in-memory project graph engine for Talus.
//!
//! A blueprint describes node types, which types nest under which, property
//! schemas and scoring weights. This crate builds and evolves a tree of typed
//! nodes against such a blueprint:
//!
//! - `graph`: the node tree, its indices and the blocking edge set
//! - `command` / `dispatcher`: reversible mutations with undo/redo
//! - `velocity`: dependency-aware priority ranking
//! - `migration`: schema evolution between blueprint versions
//! - `formats`: the nested snapshot used at the persistence boundary
//! - `session`: one open project, tying the above together
//!
//! ## Architectural Constraints
//!
//! - Synchronous and single-owner: no async, no locking, no network
//! - Deterministic: `BTreeMap`/`BTreeSet` everywhere, ties broken by creation order
//! - No panics on bad input: every failure is a `TalusError`
//! - Logging through `tracing`; installing a subscriber is the caller's job

// =============================================================================
// MODULES
// =============================================================================

pub mod blueprint;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod formats;
pub mod graph;
pub mod migration;
pub mod primitives;
pub mod session;
pub mod types;
pub mod velocity;

#[cfg(test)]
mod test_support;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{BlockingEdge, Node, NodeId, PropertyValue, TalusError};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use blueprint::{
    Blueprint, NodeTypeDef, PropertyDef, PropertyKind, SelectOption, VelocityConfig,
};
pub use command::{Command, CommandOutput};
pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use events::{
    CommandId, DomainEvent, EventForwarder, EventSink, Notifier, NullNotifier, TracingNotifier,
};
pub use graph::{Graph, NodeLocation, RemovedSubtree};
pub use migration::{
    CustomTransform, MigrationRegistry, MigrationReport, NodeTypeMigration, PropertyMapping,
    TemplateMigration, normalize_graph,
};
pub use session::ProjectSession;
pub use velocity::{VelocityScore, compute_scores, rank};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{ProjectSnapshot, graph_from_json, graph_from_json_with_limit, graph_to_json};
