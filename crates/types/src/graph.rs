//! Weighted cost graphs.
//!
//! A [`CostGraph`] describes either the hardware (processors with compute
//! capacity, links with communication cost) or the model structure (entities
//! with computational weight, edges with communication probability/cost).
//! Built once per partitioning pass and discarded afterwards.

use crate::VertexId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from cost-graph construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Edges must connect two distinct vertices.
    #[error("self-loop on vertex {0}")]
    SelfLoop(VertexId),

    /// Both edge endpoints must already exist as vertices.
    #[error("unknown vertex {0}")]
    UnknownVertex(VertexId),
}

/// An undirected, weighted graph over [`VertexId`]s.
///
/// Vertices carry a computational-cost weight, edges a communication-cost
/// weight. The edge set may be sparse; self-loops are rejected. Storage is
/// `BTreeMap`-based so that all iteration orders are deterministic, which the
/// partitioner relies on for reproducible runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostGraph {
    weights: BTreeMap<VertexId, u64>,
    adjacency: BTreeMap<VertexId, BTreeMap<VertexId, u64>>,
}

impl CostGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex with the given computational weight.
    ///
    /// Adding an existing vertex overwrites its weight and keeps its edges.
    pub fn add_vertex(&mut self, v: VertexId, weight: u64) {
        self.weights.insert(v, weight);
        self.adjacency.entry(v).or_default();
    }

    /// Add an undirected edge with the given communication weight.
    ///
    /// Re-adding an edge overwrites its weight.
    pub fn add_edge(&mut self, a: VertexId, b: VertexId, weight: u64) -> Result<(), GraphError> {
        if a == b {
            return Err(GraphError::SelfLoop(a));
        }
        for v in [a, b] {
            if !self.weights.contains_key(&v) {
                return Err(GraphError::UnknownVertex(v));
            }
        }
        self.adjacency.entry(a).or_default().insert(b, weight);
        self.adjacency.entry(b).or_default().insert(a, weight);
        Ok(())
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.weights.len()
    }

    /// True if the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// True if the vertex exists.
    pub fn contains(&self, v: VertexId) -> bool {
        self.weights.contains_key(&v)
    }

    /// Computational weight of a vertex.
    pub fn weight_of(&self, v: VertexId) -> Option<u64> {
        self.weights.get(&v).copied()
    }

    /// Sum of all vertex weights.
    pub fn total_weight(&self) -> u64 {
        self.weights.values().sum()
    }

    /// Vertices in ascending id order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, u64)> + '_ {
        self.weights.iter().map(|(v, w)| (*v, *w))
    }

    /// Neighbours of a vertex with edge weights, in ascending id order.
    ///
    /// Empty iterator for unknown vertices.
    pub fn neighbours(&self, v: VertexId) -> impl Iterator<Item = (VertexId, u64)> + '_ {
        self.adjacency
            .get(&v)
            .into_iter()
            .flat_map(|adj| adj.iter().map(|(n, w)| (*n, *w)))
    }

    /// Weight of the edge between two vertices, if present.
    pub fn edge_weight(&self, a: VertexId, b: VertexId) -> Option<u64> {
        self.adjacency.get(&a).and_then(|adj| adj.get(&b)).copied()
    }

    /// All edges, each reported once with `a < b`, in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId, u64)> + '_ {
        self.adjacency.iter().flat_map(|(a, adj)| {
            adj.iter()
                .filter(move |(b, _)| *a < **b)
                .map(move |(b, w)| (*a, *b, *w))
        })
    }
}
