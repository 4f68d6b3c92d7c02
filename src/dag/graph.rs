// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::GraphError;

/// Node identifier, unique within a workflow run.
pub type NodeId = String;

/// Node -> direct predecessors.
///
/// Every predecessor must itself be a key of the map.
pub type DependencyMap = BTreeMap<NodeId, Vec<NodeId>>;

/// Nodes without dependency relationships among themselves.
pub type Layer = Vec<NodeId>;

/// Group nodes into concurrency layers.
///
/// `level(n) = 0` for nodes without dependencies, otherwise
/// `1 + max(level(d))` over its dependencies. Layer `i` holds every node of
/// level `i`; within a layer nodes are sorted by name so the result is
/// deterministic for a given input.
///
/// Fails on unknown predecessors and on cycles (including self-loops).
pub fn layer_nodes(nodes: &DependencyMap) -> Result<Vec<Layer>, GraphError> {
    check_dependencies_known(nodes)?;

    // Edge direction: dep -> node.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in nodes.keys() {
        graph.add_node(name.as_str());
    }
    for (name, deps) in nodes.iter() {
        for dep in deps.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
        node: cycle.node_id().to_string(),
    })?;

    let mut level: HashMap<&str, usize> = HashMap::with_capacity(order.len());
    for node in order {
        let lvl = graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .map(|pred| level[pred] + 1)
            .max()
            .unwrap_or(0);
        level.insert(node, lvl);
    }

    let depth = level.values().copied().max().map_or(0, |max| max + 1);
    let mut layers: Vec<Layer> = vec![Vec::new(); depth];
    for (node, lvl) in level {
        layers[lvl].push(node.to_string());
    }
    for layer in layers.iter_mut() {
        layer.sort();
    }

    debug!(
        nodes = nodes.len(),
        layers = layers.len(),
        "computed concurrency layers"
    );

    Ok(layers)
}

/// Index of the layer that contains `node`, if any.
pub fn layer_of(layers: &[Layer], node: &str) -> Option<usize> {
    layers
        .iter()
        .position(|layer| layer.iter().any(|n| n == node))
}

fn check_dependencies_known(nodes: &DependencyMap) -> Result<(), GraphError> {
    for (name, deps) in nodes.iter() {
        for dep in deps.iter() {
            if !nodes.contains_key(dep) {
                return Err(GraphError::UnknownDependency {
                    node: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}
