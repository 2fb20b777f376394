//! # Migration Registry
//!
//! Moves a project graph from one blueprint version to another.
//!
//! ## Architecture
//!
//! - **Version graph**: each registered `TemplateMigration` is an edge
//!   `from_version -> to_version`. A chain is found by breadth-first search,
//!   so the shortest route wins; neighbours are visited in sorted order.
//! - **Per-step atomicity**: a step runs against a working copy of the graph
//!   and is swapped in only if it succeeds. A failing step leaves the graph at
//!   the last completed version; completed steps are not rolled back.
//! - **Audit trail**: every step reports what it did as plain messages.
//! - **Explicit value**: registries are built and passed around by the
//!   caller. There is no global registry.
//!
//! A migrated node keeps only the properties its `NodeTypeMigration` maps;
//! the rest are dropped with an audit message unless the rule opts into
//! `keep_unmapped_properties`.

use crate::blueprint::{Blueprint, PropertyKind};
use crate::events::{DomainEvent, EventSink};
use crate::{Graph, NodeId, PropertyValue, TalusError};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// What happens to one property of a migrated node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyMapping {
    /// Keep the value under a (possibly identical) new id.
    Rename(String),
    /// Remove the value.
    Drop,
}

/// Rule for one node type within a migration step.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTypeMigration {
    pub old_type: String,
    pub new_type: String,
    pub property_map: BTreeMap<String, PropertyMapping>,
    /// Values set when the property is absent after remapping.
    pub new_defaults: BTreeMap<String, PropertyValue>,
    /// Carry over properties `property_map` does not mention.
    pub keep_unmapped: bool,
}

impl NodeTypeMigration {
    #[must_use]
    pub fn new(old_type: impl Into<String>, new_type: impl Into<String>) -> Self {
        Self {
            old_type: old_type.into(),
            new_type: new_type.into(),
            property_map: BTreeMap::new(),
            new_defaults: BTreeMap::new(),
            keep_unmapped: false,
        }
    }

    /// Keep properties the map does not mention instead of dropping them.
    #[must_use]
    pub fn keep_unmapped_properties(mut self) -> Self {
        self.keep_unmapped = true;
        self
    }

    #[must_use]
    pub fn rename_property(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.property_map
            .insert(old.into(), PropertyMapping::Rename(new.into()));
        self
    }

    #[must_use]
    pub fn drop_property(mut self, old: impl Into<String>) -> Self {
        self.property_map.insert(old.into(), PropertyMapping::Drop);
        self
    }

    #[must_use]
    pub fn with_default(mut self, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.new_defaults.insert(property.into(), value.into());
        self
    }

    fn apply_to(&self, graph: &mut Graph, id: NodeId, messages: &mut Vec<String>) -> Result<(), TalusError> {
        let node = graph.get_node(id)?;
        let name = node.name.clone();
        let mut properties = node.properties.clone();

        if self.old_type != self.new_type {
            graph.retype_node(id, &self.new_type)?;
            messages.push(format!(
                "Node {} '{}': type '{}' -> '{}'",
                id, name, self.old_type, self.new_type
            ));
        }

        // Take all mapped values out first so renames can swap ids.
        let mut moved = Vec::new();
        for (old, mapping) in &self.property_map {
            let Some(value) = properties.remove(old) else {
                continue;
            };
            match mapping {
                PropertyMapping::Drop => {
                    messages.push(format!("Node {} '{}': dropped property '{}'", id, name, old));
                }
                PropertyMapping::Rename(new) => {
                    if new != old {
                        messages.push(format!(
                            "Node {} '{}': property '{}' renamed to '{}'",
                            id, name, old, new
                        ));
                    }
                    moved.push((new.clone(), value));
                }
            }
        }
        if !self.keep_unmapped {
            for old in std::mem::take(&mut properties).into_keys() {
                messages.push(format!(
                    "Node {} '{}': dropped property '{}' (not mapped)",
                    id, name, old
                ));
            }
        }
        properties.extend(moved);

        for (property, value) in &self.new_defaults {
            if !properties.contains_key(property) {
                properties.insert(property.clone(), value.clone());
                messages.push(format!(
                    "Node {} '{}': default {} applied to '{}'",
                    id, name, value, property
                ));
            }
        }

        let current: Vec<String> = graph.get_node(id)?.properties.keys().cloned().collect();
        for property in current {
            if !properties.contains_key(&property) {
                graph.remove_property_unchecked(id, &property)?;
            }
        }
        for (property, value) in properties {
            graph.set_property_unchecked(id, &property, value)?;
        }
        Ok(())
    }
}

/// Structural rewrite run after the node-type rules of a step.
///
/// Gets the whole graph and returns audit messages. Use the unchecked graph
/// operations (`insert_node`, `move_node`, `set_property_unchecked`): the
/// blueprint of either version may not describe the intermediate shape.
pub type CustomTransform = Arc<dyn Fn(&mut Graph) -> Result<Vec<String>, TalusError> + Send + Sync>;

/// One version step.
#[derive(Clone)]
pub struct TemplateMigration {
    pub from_version: String,
    pub to_version: String,
    pub description: String,
    pub node_migrations: Vec<NodeTypeMigration>,
    pub custom_transform: Option<CustomTransform>,
}

impl fmt::Debug for TemplateMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateMigration")
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .field("description", &self.description)
            .field("node_migrations", &self.node_migrations)
            .field("custom_transform", &self.custom_transform.is_some())
            .finish()
    }
}

impl TemplateMigration {
    #[must_use]
    pub fn new(
        from_version: impl Into<String>,
        to_version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            from_version: from_version.into(),
            to_version: to_version.into(),
            description: description.into(),
            node_migrations: Vec::new(),
            custom_transform: None,
        }
    }

    #[must_use]
    pub fn with_node_migration(mut self, migration: NodeTypeMigration) -> Self {
        self.node_migrations.push(migration);
        self
    }

    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&mut Graph) -> Result<Vec<String>, TalusError> + Send + Sync + 'static,
    {
        self.custom_transform = Some(Arc::new(transform));
        self
    }

    /// Apply this step in place. Does not touch `schema_version`.
    pub fn apply(&self, graph: &mut Graph) -> Result<Vec<String>, TalusError> {
        let mut messages = Vec::new();
        self.apply_logged(graph, &mut messages)?;
        Ok(messages)
    }

    fn apply_logged(&self, graph: &mut Graph, messages: &mut Vec<String>) -> Result<(), TalusError> {
        let rules: BTreeMap<&str, &NodeTypeMigration> = self
            .node_migrations
            .iter()
            .map(|m| (m.old_type.as_str(), m))
            .collect();

        // Match on the types as they were before this step.
        let targets: Vec<(NodeId, &NodeTypeMigration)> = graph
            .nodes()
            .filter_map(|n| rules.get(n.type_id.as_str()).map(|rule| (n.id, *rule)))
            .collect();

        messages.push(format!(
            "Migration {} -> {}: {} nodes updated",
            self.from_version,
            self.to_version,
            targets.len()
        ));
        for (id, rule) in targets {
            rule.apply_to(graph, id, messages)?;
        }

        if let Some(transform) = &self.custom_transform {
            messages.extend(transform(graph)?);
        }
        Ok(())
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Outcome of a successful `apply_migrations`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationReport {
    pub from_version: String,
    pub to_version: String,
    /// `(from, to)` of each applied step, in order.
    pub steps: Vec<(String, String)>,
    /// Audit messages of all steps.
    pub messages: Vec<String>,
}

/// Registered migrations, keyed by `(from_version, to_version)`.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<(String, String), TemplateMigration>,
    events: EventSink,
}

impl MigrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `MigrationApplied` for every completed step.
    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Add a step. An existing `(from, to)` registration is never replaced.
    pub fn register_migration(&mut self, migration: TemplateMigration) -> Result<(), TalusError> {
        let key = (migration.from_version.clone(), migration.to_version.clone());
        if self.migrations.contains_key(&key) {
            return Err(TalusError::MigrationAlreadyRegistered {
                from: key.0,
                to: key.1,
            });
        }
        tracing::info!(from = %key.0, to = %key.1, description = %migration.description, "migration registered");
        self.migrations.insert(key, migration);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Shortest chain of steps from `from` to `to`. Empty when they are equal.
    pub fn get_migration_path(&self, from: &str, to: &str) -> Result<Vec<&TemplateMigration>, TalusError> {
        if from == to {
            return Ok(Vec::new());
        }

        let mut previous: BTreeMap<&str, &TemplateMigration> = BTreeMap::new();
        let mut visited: BTreeSet<&str> = BTreeSet::from([from]);
        let mut queue: VecDeque<&str> = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            // BTreeMap keys are (from, to), so this range yields neighbours sorted.
            for ((_, next), migration) in self
                .migrations
                .range((current.to_string(), String::new())..)
                .take_while(|((f, _), _)| f == current)
            {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                previous.insert(next.as_str(), migration);
                if next == to {
                    return Ok(Self::unwind(&previous, from, to));
                }
                queue.push_back(next.as_str());
            }
        }

        Err(TalusError::NoMigrationPath {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    fn unwind<'a>(
        previous: &BTreeMap<&str, &'a TemplateMigration>,
        from: &str,
        to: &str,
    ) -> Vec<&'a TemplateMigration> {
        let mut path = Vec::new();
        let mut cursor = to;
        while cursor != from {
            let Some(step) = previous.get(cursor) else {
                break;
            };
            path.push(*step);
            cursor = step.from_version.as_str();
        }
        path.reverse();
        path
    }

    /// Migrate `graph` from `from` to `to`, one atomic step at a time.
    ///
    /// On failure the graph stays at the last completed version and the
    /// `MigrationStepFailed` error carries every message gathered so far.
    pub fn apply_migrations(
        &self,
        graph: &mut Graph,
        from: &str,
        to: &str,
    ) -> Result<MigrationReport, TalusError> {
        let path = self.get_migration_path(from, to)?;
        let mut report = MigrationReport {
            from_version: from.to_string(),
            to_version: to.to_string(),
            ..MigrationReport::default()
        };

        for step in path {
            let mut working = graph.clone();
            let mut step_messages = Vec::new();

            if let Err(e) = step.apply_logged(&mut working, &mut step_messages) {
                step_messages.push(format!(
                    "Migration {} -> {} rolled back",
                    step.from_version, step.to_version
                ));
                report.messages.extend(step_messages);
                tracing::warn!(
                    from = %step.from_version,
                    to = %step.to_version,
                    error = %e,
                    "migration step failed"
                );
                return Err(TalusError::MigrationStepFailed {
                    from: step.from_version.clone(),
                    to: step.to_version.clone(),
                    reason: e.to_string(),
                    messages: report.messages,
                });
            }

            working.set_schema_version(step.to_version.clone());
            *graph = working;

            tracing::info!(
                from = %step.from_version,
                to = %step.to_version,
                messages = step_messages.len(),
                "migration step applied"
            );
            self.events.emit(DomainEvent::MigrationApplied {
                from: step.from_version.clone(),
                to: step.to_version.clone(),
                messages: step_messages.clone(),
            });
            report
                .steps
                .push((step.from_version.clone(), step.to_version.clone()));
            report.messages.extend(step_messages);
        }
        Ok(report)
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Align node data with the active blueprint after a migration.
///
/// - Warns about nodes whose type the blueprint does not define.
/// - Fills in missing declared defaults.
/// - Rewrites select values given as option labels to option ids; values
///   matching neither fall back to the first option.
///
/// Returns audit messages; unknown types are reported, never removed.
pub fn normalize_graph(graph: &mut Graph, blueprint: &Blueprint) -> Result<Vec<String>, TalusError> {
    let mut messages = Vec::new();
    let ids: Vec<NodeId> = graph.nodes().map(|n| n.id).collect();

    for id in ids {
        let node = graph.get_node(id)?;
        let Some(def) = blueprint.node_type(&node.type_id) else {
            tracing::warn!(node = %id, type_id = %node.type_id, "node has unknown type");
            messages.push(format!(
                "[WARN] Node {} '{}' has unknown type '{}'",
                id, node.name, node.type_id
            ));
            continue;
        };
        let name = node.name.clone();
        let mut fixes: Vec<(String, PropertyValue, String)> = Vec::new();

        for property in &def.properties {
            let current = node.property(&property.id);
            match (current, &property.default) {
                (None, Some(default)) => fixes.push((
                    property.id.clone(),
                    default.clone(),
                    format!("[FIX] Node {} '{}': default applied to '{}'", id, name, property.id),
                )),
                (Some(value), _) if property.kind == PropertyKind::Select => {
                    if property.validate(value).is_ok() {
                        continue;
                    }
                    let label = value.to_string();
                    let label = value.as_text().unwrap_or(&label);
                    if let Some(option) = property.option_by_label(label) {
                        fixes.push((
                            property.id.clone(),
                            PropertyValue::text(option.id.clone()),
                            format!(
                                "[FIX] Node {} '{}': select '{}' label mapped to option '{}'",
                                id, name, property.id, option.id
                            ),
                        ));
                    } else if let Some(first) = property.options.first() {
                        fixes.push((
                            property.id.clone(),
                            PropertyValue::text(first.id.clone()),
                            format!(
                                "[FIX] Node {} '{}': select '{}' reset to option '{}'",
                                id, name, property.id, first.id
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }

        for (property, value, message) in fixes {
            graph.set_property_unchecked(id, &property, value)?;
            tracing::warn!(node = %id, property = %property, "normalized property");
            messages.push(message);
        }
    }
    Ok(messages)
}

// =============================================================================
// TESTS
// =============================================================================
