//! # Velocity Benchmarks
//!
//! Ranking and history throughput on synthetic project graphs.
//!
//! Run with: `cargo bench -p talus-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use talus_core::{
    Blueprint, Command, EngineConfig, EventSink, Graph, NodeId, NodeTypeDef, ProjectSession,
    PropertyDef, PropertyKind, PropertyValue, compute_scores, graph_from_json, graph_to_json,
};

fn blueprint() -> Blueprint {
    Blueprint::new("bench", "1.0.0", "project_root")
        .with_type(NodeTypeDef::new("project_root", "Project").allow_child("phase"))
        .with_type(NodeTypeDef::new("phase", "Phase").allow_child("task"))
        .with_type(
            NodeTypeDef::new("task", "Task")
                .with_property(PropertyDef::new("importance", PropertyKind::Number))
                .with_property(PropertyDef::new("estimated_cost", PropertyKind::Currency)),
        )
}

/// A root, ten phases and `size` tasks spread across them, each task
/// blocking the next.
fn create_project(blueprint: &Blueprint, size: usize) -> Graph {
    let mut graph = Graph::with_schema_version(blueprint.version.clone());
    let root = graph
        .insert_node(None, "project_root", "Project")
        .expect("root");
    let phases: Vec<NodeId> = (0..10)
        .map(|i| {
            graph
                .create_node(blueprint, root, "phase", &format!("Phase {}", i))
                .expect("phase")
        })
        .collect();

    let mut prev = None;
    for i in 0..size {
        let task = graph
            .create_node(blueprint, phases[i % phases.len()], "task", &format!("Task {}", i))
            .expect("task");
        graph
            .set_property_unchecked(task, "importance", PropertyValue::number((i % 7) as f64))
            .expect("importance");
        graph
            .set_property_unchecked(task, "estimated_cost", PropertyValue::number((i * 13 % 500) as f64))
            .expect("cost");
        if let Some(prev) = prev {
            graph.add_blocking_edge(prev, task).expect("edge");
        }
        prev = Some(task);
    }
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_compute_scores(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_scores");
    let blueprint = blueprint();

    for size in [100, 1000, 10000].iter() {
        let graph = create_project(&blueprint, *size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(compute_scores(&graph, &blueprint)));
        });
    }

    group.finish();
}

fn bench_execute_undo(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_undo");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut session = ProjectSession::fresh(
                    Arc::new(blueprint()),
                    "Project",
                    EngineConfig::default(),
                    EventSink::disabled(),
                )
                .expect("session");
                let root = session.root().expect("root");
                let phase = session
                    .execute(Command::create_node(root, "phase", "Phase"))
                    .expect("phase")
                    .created()
                    .expect("id");
                for i in 0..size {
                    let _ = session.execute(Command::create_node(phase, "task", format!("Task {}", i)));
                }
                while session.undo().is_ok() {}
                black_box(session)
            });
        });
    }

    group.finish();
}

fn bench_snapshot_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_json");
    let blueprint = blueprint();

    for size in [100, 1000].iter() {
        let graph = create_project(&blueprint, *size);
        let json = graph_to_json(&graph).expect("json");

        group.bench_with_input(BenchmarkId::new("export", size), size, |b, _| {
            b.iter(|| black_box(graph_to_json(&graph)));
        });
        group.bench_with_input(BenchmarkId::new("import", size), size, |b, _| {
            b.iter(|| black_box(graph_from_json(&json)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compute_scores,
    bench_execute_undo,
    bench_snapshot_json
);
criterion_main!(benches);
