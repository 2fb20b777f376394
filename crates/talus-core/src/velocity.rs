//! # Velocity Engine
//!
//! Ranks every node of a project graph by priority.
//!
//! ## Algorithm
//!
//! 1. **Base score** = hierarchy + financial.
//!    - Hierarchy: along the chain root ... node, each node's importance times
//!      the multiplier for its depth (root = depth 0), summed.
//!    - Financial: `budget_priority / (max(cost, 0) + 1)`.
//! 2. **Dependency boost**: each blocker gains `dependency_boost_factor` times
//!    the summed *base* scores of the distinct nodes it blocks, itself
//!    excluded. A single pass over base scores, so blocking cycles cannot
//!    feed back into themselves.
//!
//! Final score = base + boost. Non-finite intermediate values count as 0, so
//! every score is finite.
//!
//! Ordering: score descending, ties by ascending `NodeId` (creation order).
//! Blocked nodes are reported but not penalized.

use crate::blueprint::{Blueprint, VelocityConfig};
use crate::{Graph, Node, NodeId};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A node's score with its breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityScore {
    pub node: NodeId,
    pub hierarchy: f64,
    pub financial: f64,
    /// hierarchy + financial
    pub base: f64,
    pub dependency_boost: f64,
    /// base + dependency_boost
    pub score: f64,
    /// Nodes this node blocks.
    pub blocks: Vec<NodeId>,
    /// Nodes blocking this node.
    pub blocked_by: Vec<NodeId>,
}

impl VelocityScore {
    /// Whether anything blocks this node.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        !self.blocked_by.is_empty()
    }
}

/// Compute scores for every node, highest first.
pub fn compute_scores(graph: &Graph, blueprint: &Blueprint) -> Vec<VelocityScore> {
    let config = &blueprint.velocity;
    let hierarchy = hierarchy_components(graph, config);

    let mut scores: BTreeMap<NodeId, VelocityScore> = BTreeMap::new();
    for node in graph.nodes() {
        let hierarchy = finite_or_zero(hierarchy.get(&node.id).copied().unwrap_or(0.0));
        let financial = financial_component(node, config);
        let base = finite_or_zero(hierarchy + financial);
        scores.insert(
            node.id,
            VelocityScore {
                node: node.id,
                hierarchy,
                financial,
                base,
                dependency_boost: 0.0,
                score: base,
                blocks: graph.blocks(node.id),
                blocked_by: graph.blocked_by(node.id),
            },
        );
    }

    // Boost from base scores only.
    let bases: BTreeMap<NodeId, f64> = scores.iter().map(|(id, s)| (*id, s.base)).collect();
    for score in scores.values_mut() {
        let blocked_sum: f64 = score
            .blocks
            .iter()
            .filter(|blocked| **blocked != score.node)
            .filter_map(|blocked| bases.get(blocked))
            .sum();
        score.dependency_boost = finite_or_zero(config.dependency_boost_factor * blocked_sum);
        score.score = finite_or_zero(score.base + score.dependency_boost);
    }

    let mut ranked: Vec<VelocityScore> = scores.into_values().collect();
    ranked.sort_by(compare_scores);

    tracing::debug!(
        nodes = ranked.len(),
        edges = graph.blocking_edges().count(),
        "velocity scores computed"
    );
    ranked
}

/// `(node, score)` pairs, highest first.
pub fn rank(graph: &Graph, blueprint: &Blueprint) -> Vec<(NodeId, f64)> {
    compute_scores(graph, blueprint)
        .into_iter()
        .map(|s| (s.node, s.score))
        .collect()
}

fn compare_scores(a: &VelocityScore, b: &VelocityScore) -> Ordering {
    b.score.total_cmp(&a.score).then(a.node.cmp(&b.node))
}

/// Hierarchy component of every reachable node, accumulated top-down.
fn hierarchy_components(graph: &Graph, config: &VelocityConfig) -> BTreeMap<NodeId, f64> {
    let mut result = BTreeMap::new();
    let mut stack: Vec<(NodeId, usize, f64)> = graph.roots().iter().map(|r| (*r, 0, 0.0)).collect();

    while let Some((id, depth, inherited)) = stack.pop() {
        let Ok(node) = graph.get_node(id) else {
            continue;
        };
        if result.contains_key(&id) {
            continue;
        }
        let importance = number_property(node, &config.importance_property).unwrap_or(0.0);
        let own = finite_or_zero(importance * config.level_multiplier(depth));
        let total = finite_or_zero(inherited + own);
        result.insert(id, total);
        stack.extend(node.children.iter().map(|c| (*c, depth + 1, total)));
    }
    result
}

fn financial_component(node: &Node, config: &VelocityConfig) -> f64 {
    let cost = number_property(node, &config.cost_property)
        .unwrap_or(0.0)
        .max(0.0);
    let priority = number_property(node, &config.budget_priority_property)
        .unwrap_or(config.default_budget_priority);
    finite_or_zero(finite_or_zero(priority) / (cost + 1.0))
}

fn number_property(node: &Node, property: &str) -> Option<f64> {
    node.property(property).and_then(|v| v.as_number())
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropertyValue;
    use crate::test_support::{film_blueprint, film_graph};

    fn score_of(scores: &[VelocityScore], id: NodeId) -> &VelocityScore {
        scores
            .iter()
            .find(|s| s.node == id)
            .expect("score for node")
    }

    #[test]
    fn cheaper_sibling_ranks_higher() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph
            .set_property(&bp, fg.task_a, "estimated_cost", 10.0.into())
            .expect("cost");
        fg.graph
            .set_property(&bp, fg.task_b, "estimated_cost", 1000.0.into())
            .expect("cost");

        let scores = compute_scores(&fg.graph, &bp);
        assert!(score_of(&scores, fg.task_a).score > score_of(&scores, fg.task_b).score);
        let a = score_of(&scores, fg.task_a);
        assert!((a.financial - 5.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn hierarchy_accumulates_down_the_chain() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph
            .set_property(&bp, fg.root, "importance", 2.0.into())
            .expect("importance");
        fg.graph
            .set_property(&bp, fg.phase, "importance", 3.0.into())
            .expect("importance");
        fg.graph
            .set_property(&bp, fg.task_a, "importance", 4.0.into())
            .expect("importance");

        let scores = compute_scores(&fg.graph, &bp);
        // 2*100 + 3*10 + 4*1
        assert!((score_of(&scores, fg.task_a).hierarchy - 234.0).abs() < 1e-9);
        assert!((score_of(&scores, fg.task_b).hierarchy - 230.0).abs() < 1e-9);
    }

    #[test]
    fn blocker_gains_blocked_base() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph.add_blocking_edge(fg.task_b, fg.task_a).expect("edge");

        let scores = compute_scores(&fg.graph, &bp);
        let a = score_of(&scores, fg.task_a);
        let b = score_of(&scores, fg.task_b);
        assert!((b.dependency_boost - a.base).abs() < 1e-12);
        assert!(a.is_blocked());
        assert!(!b.is_blocked());
        assert_eq!(scores[0].node, fg.task_b);
    }

    #[test]
    fn cycles_and_self_edges_stay_finite() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph.add_blocking_edge(fg.task_a, fg.task_b).expect("edge");
        fg.graph.add_blocking_edge(fg.task_b, fg.task_a).expect("edge");
        fg.graph.add_blocking_edge(fg.task_a, fg.task_a).expect("edge");

        let scores = compute_scores(&fg.graph, &bp);
        assert!(scores.iter().all(|s| s.score.is_finite()));
        let a = score_of(&scores, fg.task_a);
        let b = score_of(&scores, fg.task_b);
        assert!((a.dependency_boost - b.base).abs() < 1e-12);
    }

    #[test]
    fn ties_break_by_creation_order() {
        let bp = film_blueprint();
        let fg = film_graph(&bp);
        let ranked = rank(&fg.graph, &bp);
        let a = ranked.iter().position(|(id, _)| *id == fg.task_a).expect("a");
        let b = ranked.iter().position(|(id, _)| *id == fg.task_b).expect("b");
        assert!(a < b);
        assert_eq!(ranked, rank(&fg.graph, &bp));
    }

    #[test]
    fn odd_values_are_tolerated() {
        let bp = film_blueprint();
        let mut fg = film_graph(&bp);
        fg.graph
            .set_property_unchecked(fg.task_a, "estimated_cost", PropertyValue::text("$1,200"))
            .expect("cost");
        fg.graph
            .set_property_unchecked(fg.task_b, "estimated_cost", PropertyValue::number(-50.0))
            .expect("cost");
        fg.graph
            .set_property_unchecked(fg.phase, "importance", PropertyValue::number(f64::INFINITY))
            .expect("importance");

        let scores = compute_scores(&fg.graph, &bp);
        assert!((score_of(&scores, fg.task_a).financial - 5.0 / 1201.0).abs() < 1e-12);
        assert!((score_of(&scores, fg.task_b).financial - 5.0).abs() < 1e-12);
        assert!(scores.iter().all(|s| s.score.is_finite()));
    }
}
