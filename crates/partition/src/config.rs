//! Partitioning configuration and errors.

use simfabric_types::{HostId, VertexId};
use std::collections::BTreeMap;
use thiserror::Error;

/// Configuration shared by the partitioning strategies.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Capacity slack factor. A processor's load may exceed its proportional
    /// share of the total model weight by at most this factor.
    pub slack: f64,

    /// Maximum number of boundary-refinement passes per level.
    pub refinement_passes: usize,

    /// Vertices pinned to a specific processor. Pins are placed first and
    /// never moved by refinement. Pins naming vertices absent from the model
    /// graph are ignored.
    pub pins: BTreeMap<VertexId, HostId>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            slack: 1.05,
            refinement_passes: 4,
            pins: BTreeMap::new(),
        }
    }
}

/// Errors from a partitioning attempt.
#[derive(Debug, Error, PartialEq)]
pub enum PartitionError {
    /// There is nowhere to place anything. Fatal configuration error; the
    /// experiment setup must be fixed before any simulation time advances.
    #[error("hardware graph has no processors")]
    EmptyHardwareGraph,

    /// A capacity slack below 1.0 cannot fit the model at all.
    #[error("invalid slack factor {0}; must be >= 1.0")]
    InvalidSlack(f64),

    /// A pinning constraint cannot be satisfied. Fatal to this attempt; the
    /// caller must resolve the conflict and retry.
    #[error("pin of {vertex} to {host} cannot be satisfied: {reason}")]
    ConstraintConflict {
        vertex: VertexId,
        host: HostId,
        reason: String,
    },
}
