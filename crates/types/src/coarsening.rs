//! Precomputed coarsening hierarchies for multilevel refinement.
//!
//! Coarsening itself (deciding which vertices to merge) is supplied by an
//! external collaborator; this module only validates and exposes the result.

use crate::{CostGraph, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from hierarchy validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HierarchyError {
    /// A hierarchy needs at least the finest graph.
    #[error("hierarchy has no levels")]
    Empty,

    /// A vertex below the coarsest level has no parent.
    #[error("vertex {vertex} at level {level} has no parent")]
    MissingParent { level: usize, vertex: VertexId },

    /// A parent entry points at a vertex the next level does not contain.
    #[error("vertex {vertex} at level {level} merges into unknown parent {parent}")]
    UnknownParent {
        level: usize,
        vertex: VertexId,
        parent: VertexId,
    },

    /// Merging must conserve weight: a coarse vertex weighs exactly the sum
    /// of the fine vertices merged into it.
    #[error("parent {parent} at level {level} weighs {actual}, children sum to {expected}")]
    WeightMismatch {
        level: usize,
        parent: VertexId,
        expected: u64,
        actual: u64,
    },
}

/// One level of a coarsening hierarchy.
///
/// `parent` maps every vertex of `graph` to the coarse vertex it was merged
/// into at the next level. The coarsest level's map is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoarseLevel {
    pub graph: CostGraph,
    pub parent: BTreeMap<VertexId, VertexId>,
}

/// A validated list of graphs from finest (the model graph itself) to
/// coarsest, each with its child-to-parent merge map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoarseningHierarchy {
    levels: Vec<CoarseLevel>,
}

impl CoarseningHierarchy {
    /// Validate and wrap a list of levels, finest first.
    ///
    /// Checks that every non-coarsest vertex has a parent in the next level
    /// and that merging conserves vertex weight.
    pub fn new(levels: Vec<CoarseLevel>) -> Result<Self, HierarchyError> {
        if levels.is_empty() {
            return Err(HierarchyError::Empty);
        }
        for level in 0..levels.len() - 1 {
            let fine = &levels[level];
            let coarse = &levels[level + 1].graph;
            let mut merged_weight: BTreeMap<VertexId, u64> = BTreeMap::new();
            for (v, w) in fine.graph.vertices() {
                let parent = *fine
                    .parent
                    .get(&v)
                    .ok_or(HierarchyError::MissingParent { level, vertex: v })?;
                if !coarse.contains(parent) {
                    return Err(HierarchyError::UnknownParent {
                        level,
                        vertex: v,
                        parent,
                    });
                }
                *merged_weight.entry(parent).or_insert(0) += w;
            }
            for (parent, expected) in merged_weight {
                let actual = coarse.weight_of(parent).unwrap_or(0);
                if actual != expected {
                    return Err(HierarchyError::WeightMismatch {
                        level,
                        parent,
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(Self { levels })
    }

    /// Number of levels, including the finest.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True if there is only the finest level (nothing to refine).
    pub fn is_flat(&self) -> bool {
        self.levels.len() == 1
    }

    /// Level by index; 0 is the finest.
    pub fn level(&self, index: usize) -> &CoarseLevel {
        &self.levels[index]
    }

    /// The finest graph (the model graph itself).
    pub fn finest(&self) -> &CostGraph {
        &self.levels[0].graph
    }

    /// The coarsest graph.
    pub fn coarsest(&self) -> &CostGraph {
        &self.levels[self.levels.len() - 1].graph
    }
}
