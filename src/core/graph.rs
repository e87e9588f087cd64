//! Explicit directed edge relation for task and root DAGs.
//!
//! Edges are `(parent, child)` pairs: the child may start only once the
//! parent has succeeded. The relation is backed by a petgraph `DiGraphMap`
//! keyed by entity id so adjacency lookups never chase pointers and cycles
//! are rejected at insertion time.

use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Node bound shared by `TaskId` and `RootId`.
pub trait EdgeNode: Copy + Ord + Hash + Display {}

impl<T: Copy + Ord + Hash + Display> EdgeNode for T {}

#[derive(Clone, Serialize, Deserialize)]
#[serde(
    from = "Vec<(N, N)>",
    into = "Vec<(N, N)>",
    bound(serialize = "N: EdgeNode + Serialize", deserialize = "N: EdgeNode + Deserialize<'de>")
)]
pub struct EdgeSet<N: EdgeNode> {
    graph: DiGraphMap<N, ()>,
}

impl<N: EdgeNode> EdgeSet<N> {
    pub fn new() -> Self {
        Self {
            graph: DiGraphMap::new(),
        }
    }

    /// Add the edge `from -> to`.
    ///
    /// Returns `Ok(false)` if the edge already existed.
    ///
    /// # Errors
    /// Returns `Error::CycleDetected` for a self-loop or an edge that would
    /// close a cycle.
    pub fn insert(&mut self, from: N, to: N) -> Result<bool> {
        if from == to {
            return Err(Error::CycleDetected(format!("{} depends on itself", from)));
        }
        if self.graph.contains_edge(from, to) {
            return Ok(false);
        }
        if self.graph.contains_node(to)
            && self.graph.contains_node(from)
            && has_path_connecting(&self.graph, to, from, None)
        {
            return Err(Error::CycleDetected(format!(
                "Adding dependency from {} to {} would create a cycle",
                from, to
            )));
        }
        self.graph.add_edge(from, to, ());
        Ok(true)
    }

    /// Drop a node and every edge touching it.
    pub fn remove_node(&mut self, node: N) {
        self.graph.remove_node(node);
    }

    pub fn has_edge(&self, from: N, to: N) -> bool {
        self.graph.contains_edge(from, to)
    }

    /// Parents of `node`, sorted.
    pub fn previous(&self, node: N) -> Vec<N> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Children of `node`, sorted.
    pub fn next(&self, node: N) -> Vec<N> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: N, dir: Direction) -> Vec<N> {
        if !self.graph.contains_node(node) {
            return Vec::new();
        }
        let mut out: Vec<N> = self.graph.neighbors_directed(node, dir).collect();
        out.sort();
        out
    }

    pub fn has_previous(&self, node: N) -> bool {
        self.graph.contains_node(node)
            && self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .next()
                .is_some()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }

    pub fn edges(&self) -> Vec<(N, N)> {
        let mut out: Vec<(N, N)> = self.graph.all_edges().map(|(a, b, _)| (a, b)).collect();
        out.sort();
        out
    }

    /// The sub-relation whose endpoints both lie in `nodes`.
    pub fn restrict(&self, nodes: &HashSet<N>) -> Self {
        let mut out = Self::new();
        for (a, b, _) in self.graph.all_edges() {
            if nodes.contains(&a) && nodes.contains(&b) {
                out.graph.add_edge(a, b, ());
            }
        }
        out
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }
}

impl<N: EdgeNode> Default for EdgeSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: EdgeNode> std::fmt::Debug for EdgeSet<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeSet")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

/// Snapshots may be hand-edited, so cycles are not rejected here;
/// `is_cyclic` reports them.
impl<N: EdgeNode> From<Vec<(N, N)>> for EdgeSet<N> {
    fn from(edges: Vec<(N, N)>) -> Self {
        let mut out = Self::new();
        for (a, b) in edges {
            out.graph.add_edge(a, b, ());
        }
        out
    }
}

impl<N: EdgeNode> From<EdgeSet<N>> for Vec<(N, N)> {
    fn from(set: EdgeSet<N>) -> Self {
        set.edges()
    }
}
