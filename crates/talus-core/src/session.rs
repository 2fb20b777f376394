//! # Session Module
//!
//! One open project: a blueprint, a dispatcher and the graph it owns.
//!
//! A session starts either fresh (a single root of the blueprint's root type)
//! or from an existing graph. When an existing graph was recorded at a
//! different schema version than the blueprint, the session migrates it
//! once, at open time, and optionally normalizes it against the blueprint.
//!
//! After that every mutation goes through `execute` and history.

use crate::blueprint::Blueprint;
use crate::command::{Command, CommandOutput};
use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::events::{CommandId, EventSink};
use crate::formats::{ProjectSnapshot, graph_from_json_with_limit, graph_to_json};
use crate::migration::{MigrationRegistry, MigrationReport, normalize_graph};
use crate::velocity::{self, VelocityScore};
use crate::{Graph, NodeId, TalusError};
use std::sync::Arc;

/// An open project.
#[derive(Debug)]
pub struct ProjectSession {
    dispatcher: Dispatcher,
    blueprint: Arc<Blueprint>,
    config: EngineConfig,
    migration: Option<MigrationReport>,
    normalization: Vec<String>,
}

impl ProjectSession {
    /// Start a new project with a single root node named `name`.
    pub fn fresh(
        blueprint: Arc<Blueprint>,
        name: &str,
        config: EngineConfig,
        events: EventSink,
    ) -> Result<Self, TalusError> {
        config.validate()?;
        let mut graph = Graph::with_schema_version(blueprint.version.clone());
        let root_type = blueprint.root_type.clone();
        let root = graph.create_root(&blueprint, &root_type, name)?;
        tracing::info!(blueprint = %blueprint.id, version = %blueprint.version, %root, "project created");

        Ok(Self {
            dispatcher: Dispatcher::new(graph, Arc::clone(&blueprint), &config, events),
            blueprint,
            config,
            migration: None,
            normalization: Vec::new(),
        })
    }

    /// Open an existing graph, migrating it to the blueprint's version if needed.
    ///
    /// The graph is consumed; use [`upgrade`](Self::upgrade) first to keep a
    /// partly migrated graph when a step fails.
    pub fn open(
        mut graph: Graph,
        blueprint: Arc<Blueprint>,
        registry: &MigrationRegistry,
        config: EngineConfig,
        events: EventSink,
    ) -> Result<Self, TalusError> {
        config.validate()?;
        let (migration, normalization) = match Self::upgrade(&mut graph, &blueprint, registry, &config)? {
            Some((report, messages)) => (Some(report), messages),
            None => (None, Vec::new()),
        };

        Ok(Self {
            dispatcher: Dispatcher::new(graph, Arc::clone(&blueprint), &config, events),
            blueprint,
            config,
            migration,
            normalization,
        })
    }

    /// Migrate `graph` in place to the blueprint's version, then normalize it
    /// if configured. `None` when it was already current.
    ///
    /// On `MigrationStepFailed` the graph stays at the last completed
    /// version, so the caller can keep it, save it, or open it against the
    /// blueprint of that version.
    pub fn upgrade(
        graph: &mut Graph,
        blueprint: &Blueprint,
        registry: &MigrationRegistry,
        config: &EngineConfig,
    ) -> Result<Option<(MigrationReport, Vec<String>)>, TalusError> {
        if graph.schema_version() == blueprint.version {
            return Ok(None);
        }
        let from = graph.schema_version().to_string();
        let report = registry.apply_migrations(graph, &from, &blueprint.version)?;
        tracing::info!(
            from = %report.from_version,
            to = %report.to_version,
            steps = report.steps.len(),
            "project migrated"
        );
        let normalization = if config.normalize_after_migration {
            normalize_graph(graph, blueprint)?
        } else {
            Vec::new()
        };
        Ok(Some((report, normalization)))
    }

    /// Open a project from snapshot JSON, honouring `max_snapshot_bytes`.
    pub fn open_json(
        json: &str,
        blueprint: Arc<Blueprint>,
        registry: &MigrationRegistry,
        config: EngineConfig,
        events: EventSink,
    ) -> Result<Self, TalusError> {
        let graph = graph_from_json_with_limit(json, config.max_snapshot_bytes)?;
        Self::open(graph, blueprint, registry, config, events)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn graph(&self) -> &Graph {
        self.dispatcher.graph()
    }

    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The first root, normally the project root.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.graph().roots().first().copied()
    }

    /// What the open-time migration did, if one ran.
    #[must_use]
    pub fn migration_report(&self) -> Option<&MigrationReport> {
        self.migration.as_ref()
    }

    /// Messages from post-migration normalization.
    #[must_use]
    pub fn normalization_messages(&self) -> &[String] {
        &self.normalization
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    pub fn execute(&mut self, command: Command) -> Result<CommandOutput, TalusError> {
        self.dispatcher.execute(command)
    }

    pub fn undo(&mut self) -> Result<CommandId, TalusError> {
        self.dispatcher.undo()
    }

    pub fn redo(&mut self) -> Result<CommandOutput, TalusError> {
        self.dispatcher.redo()
    }

    /// Velocity scores, highest first.
    #[must_use]
    pub fn scores(&self) -> Vec<VelocityScore> {
        velocity::compute_scores(self.graph(), &self.blueprint)
    }

    #[must_use]
    pub fn rank(&self) -> Vec<(NodeId, f64)> {
        velocity::rank(self.graph(), &self.blueprint)
    }

    pub fn snapshot(&self) -> Result<ProjectSnapshot, TalusError> {
        self.graph().to_snapshot()
    }

    pub fn to_json(&self) -> Result<String, TalusError> {
        graph_to_json(self.graph())
    }

    /// Close the session, handing back the graph.
    #[must_use]
    pub fn into_graph(self) -> Graph {
        self.dispatcher.into_graph()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{NodeTypeMigration, TemplateMigration};
    use crate::test_support::{film_blueprint, film_graph};

    #[test]
    fn fresh_session_has_single_root() {
        let bp = Arc::new(film_blueprint());
        let session =
            ProjectSession::fresh(bp, "Feature", EngineConfig::default(), EventSink::disabled())
                .expect("fresh");
        let root = session.root().expect("root");
        assert_eq!(session.graph().node_count(), 1);
        assert_eq!(session.graph().get_node(root).expect("root").type_id, "project_root");
        assert_eq!(session.graph().schema_version(), "1.0.0");
        assert!(session.migration_report().is_none());
    }

    #[test]
    fn open_at_current_version_skips_migration() {
        let bp = film_blueprint();
        let fg = film_graph(&bp);
        let session = ProjectSession::open(
            fg.graph,
            Arc::new(bp),
            &MigrationRegistry::new(),
            EngineConfig::default(),
            EventSink::disabled(),
        )
        .expect("open");
        assert!(session.migration_report().is_none());
    }

    #[test]
    fn open_old_graph_migrates_and_normalizes() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph.set_schema_version("0.9.0");
        fg.graph
            .retype_node(fg.task_a, "chore")
            .expect("retype");
        fg.graph
            .remove_property_unchecked(fg.task_a, "status")
            .expect("strip");

        let mut registry = MigrationRegistry::new();
        registry
            .register_migration(
                TemplateMigration::new("0.9.0", "1.0.0", "chores become tasks")
                    .with_node_migration(NodeTypeMigration::new("chore", "task")),
            )
            .expect("register");

        let session = ProjectSession::open(
            fg.graph,
            Arc::new(bp),
            &registry,
            EngineConfig::default(),
            EventSink::disabled(),
        )
        .expect("open");

        assert_eq!(session.graph().schema_version(), "1.0.0");
        let task = session.graph().get_node(fg.task_a).expect("task");
        assert_eq!(task.type_id, "task");
        assert!(task.property("status").is_some());
        assert!(!session.normalization_messages().is_empty());
    }

    #[test]
    fn open_without_route_fails() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph.set_schema_version("0.0.1");
        let result = ProjectSession::open(
            fg.graph,
            Arc::new(bp),
            &MigrationRegistry::new(),
            EngineConfig::default(),
            EventSink::disabled(),
        );
        assert!(matches!(result, Err(TalusError::NoMigrationPath { .. })));
    }

    #[test]
    fn failed_upgrade_keeps_partial_progress() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph.set_schema_version("0.8.0");

        let mut registry = MigrationRegistry::new();
        registry
            .register_migration(
                TemplateMigration::new("0.8.0", "0.9.0", "phases become stages")
                    .with_node_migration(NodeTypeMigration::new("phase", "stage")),
            )
            .expect("register");
        registry
            .register_migration(
                TemplateMigration::new("0.9.0", "1.0.0", "broken")
                    .with_transform(|_| Err(TalusError::ValidationError("boom".to_string()))),
            )
            .expect("register");

        let result = ProjectSession::upgrade(&mut fg.graph, &bp, &registry, &EngineConfig::default());
        assert!(matches!(result, Err(TalusError::MigrationStepFailed { .. })));
        assert_eq!(fg.graph.schema_version(), "0.9.0");
        assert_eq!(fg.graph.get_node(fg.phase).expect("phase").type_id, "stage");

        // Continue from the version reached.
        let mut at_090 = bp.clone();
        at_090.version = "0.9.0".to_string();
        let session = ProjectSession::open(
            fg.graph,
            Arc::new(at_090),
            &registry,
            EngineConfig::default(),
            EventSink::disabled(),
        )
        .expect("open");
        assert!(session.migration_report().is_none());
        assert_eq!(session.graph().schema_version(), "0.9.0");
    }

    #[test]
    fn open_json_respects_size_limit() {
        let bp = film_blueprint();
        let fg = film_graph(&bp);
        let json = graph_to_json(&fg.graph).expect("json");
        let config = EngineConfig {
            max_snapshot_bytes: 16,
            ..EngineConfig::default()
        };
        let result = ProjectSession::open_json(
            &json,
            Arc::new(bp),
            &MigrationRegistry::new(),
            config,
            EventSink::disabled(),
        );
        assert!(matches!(result, Err(TalusError::SerializationError(_))));
    }
}
