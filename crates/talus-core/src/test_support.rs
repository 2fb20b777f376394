//! Shared fixtures for unit tests.

use crate::blueprint::{Blueprint, NodeTypeDef, PropertyDef, PropertyKind, VelocityConfig};
use crate::{Graph, NodeId};

/// A small film-production blueprint exercising every property kind.
pub(crate) fn film_blueprint() -> Blueprint {
    Blueprint::new("film", "1.0.0", "project_root")
        .with_type(
            NodeTypeDef::new("project_root", "Project")
                .allow_child("phase")
                .allow_child("camera_gear")
                .allow_child("kit")
                .with_property(PropertyDef::new("importance", PropertyKind::Number)),
        )
        .with_type(
            NodeTypeDef::new("phase", "Phase")
                .allow_child("task")
                .with_property(PropertyDef::new("importance", PropertyKind::Number)),
        )
        .with_type(
            NodeTypeDef::new("task", "Task")
                .allow_child("subtask")
                .with_property(PropertyDef::new("importance", PropertyKind::Number))
                .with_property(PropertyDef::new("estimated_cost", PropertyKind::Currency))
                .with_property(PropertyDef::new("budget_priority", PropertyKind::Number))
                .with_property(PropertyDef::new("notes", PropertyKind::Text))
                .with_property(
                    PropertyDef::new("status", PropertyKind::Select)
                        .with_option("st-todo", "Todo")
                        .with_option("st-done", "Done")
                        .with_default("st-todo")
                        .required(),
                ),
        )
        .with_type(
            NodeTypeDef::new("subtask", "Subtask")
                .with_property(PropertyDef::new("notes", PropertyKind::Text)),
        )
        .with_type(
            NodeTypeDef::new("kit", "Kit")
                .allow_child("task")
                .allow_child("camera_gear"),
        )
        .with_type(
            NodeTypeDef::new("camera_gear", "Camera Gear")
                .with_property(PropertyDef::new("model", PropertyKind::Text))
                .with_property(PropertyDef::new("serial", PropertyKind::Text)),
        )
        .with_velocity(VelocityConfig {
            hierarchy_multipliers: vec![100.0, 10.0],
            ..VelocityConfig::default()
        })
}

/// A graph with a project root, one phase and two tasks under it.
pub(crate) struct FilmGraph {
    pub graph: Graph,
    pub root: NodeId,
    pub phase: NodeId,
    pub task_a: NodeId,
    pub task_b: NodeId,
}

pub(crate) fn film_graph(blueprint: &Blueprint) -> FilmGraph {
    let mut graph = Graph::with_schema_version(blueprint.version.clone());
    let root = graph
        .create_root(blueprint, "project_root", "Feature")
        .expect("root");
    let phase = graph
        .create_node(blueprint, root, "phase", "Pre-production")
        .expect("phase");
    let task_a = graph
        .create_node(blueprint, phase, "task", "Scout locations")
        .expect("task a");
    let task_b = graph
        .create_node(blueprint, phase, "task", "Book crew")
        .expect("task b");
    FilmGraph {
        graph,
        root,
        phase,
        task_a,
        task_b,
    }
}
