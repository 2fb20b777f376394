//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Talus engine.
//!
//! These are compiled into the binary and immutable at runtime. Tunable knobs
//! live in [`crate::config::EngineConfig`] instead.

/// Multiplier applied to hierarchy levels deeper than the Blueprint configures.
pub const DEFAULT_LEVEL_MULTIPLIER: f64 = 1.0;

/// Default property holding a node's importance for the hierarchy component.
pub const DEFAULT_IMPORTANCE_PROPERTY: &str = "importance";

/// Default property holding a node's cost for the financial component.
pub const DEFAULT_COST_PROPERTY: &str = "estimated_cost";

/// Default property holding a node's budget priority.
pub const DEFAULT_BUDGET_PRIORITY_PROPERTY: &str = "budget_priority";

/// Budget priority used when neither node nor Blueprint supplies one.
pub const DEFAULT_BUDGET_PRIORITY: f64 = 5.0;

/// Maximum number of ancestors visited in a single upward walk.
///
/// The tree is acyclic by invariant; this bounds the walk even if a corrupt
/// graph slipped past integrity checks.
pub const MAX_ANCESTOR_DEPTH: usize = 256;

/// Deepest level a node may sit at; roots are level 0.
///
/// Each level nests two JSON values in a snapshot (the node object and its
/// `children` array), and `serde_json` refuses input nested past 127 levels.
/// Deeper trees would save but never load back.
pub const MAX_TREE_DEPTH: usize = 60;

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot layout.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Default number of commands kept in undo history.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Default upper bound for snapshot JSON accepted by `graph_from_json` (64 MB).
pub const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 64 * 1024 * 1024;

/// Maximum length of a node name.
pub const MAX_NAME_LENGTH: usize = 512;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_level_multiplier_is_neutral() {
        assert!((DEFAULT_LEVEL_MULTIPLIER - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tree_depth_fits_ancestor_walk_and_snapshot_nesting() {
        assert!(MAX_TREE_DEPTH < MAX_ANCESTOR_DEPTH);
        // Top-level object, roots array, then two levels per tree level.
        assert!(2 + 2 * (MAX_TREE_DEPTH + 1) < 128);
    }

    #[test]
    fn history_limit_is_positive() {
        assert!(DEFAULT_HISTORY_LIMIT > 0);
    }
}
