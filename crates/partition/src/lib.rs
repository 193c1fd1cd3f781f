//! Entity placement: graph partitioning and multilevel refinement.
//!
//! This crate turns a hardware graph and a model graph into a
//! [`PartitionMapping`](simfabric_types::PartitionMapping) assigning every
//! model vertex to a processor:
//!
//! - [`GreedyGrowthPartitioner`]: deterministic single-level placement with
//!   capacity slack and pinning constraints, plus an incremental mode that
//!   seeds from a previous mapping to minimize churn.
//! - [`MultilevelRefiner`]: partitions a precomputed coarsening hierarchy at
//!   the coarsest level and walks back to the finest, refining at each level.
//!
//! Strategies are plain structs selected by explicit configuration; there is
//! no runtime strategy discovery.

mod config;
mod greedy;
mod multilevel;
mod refine;

pub use config::{PartitionConfig, PartitionError};
pub use greedy::{GreedyGrowthPartitioner, Partitioner};
pub use multilevel::MultilevelRefiner;
