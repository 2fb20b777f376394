//! # Formats
//!
//! Serialization formats for project graphs. File I/O lives with the caller.

pub mod snapshot;

pub use snapshot::{
    BlockingSnapshot, NodeSnapshot, ProjectSnapshot, graph_from_json, graph_from_json_with_limit,
    graph_to_json,
};
