// src/dag/mod.rs

//! DAG representation and layering.
//!
//! - [`graph`] turns a dependency map into an ordered sequence of layers
//!   whose members can run concurrently.

pub mod graph;

pub use graph::{DependencyMap, Layer, NodeId, layer_nodes, layer_of};
