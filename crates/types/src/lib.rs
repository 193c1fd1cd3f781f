//! Core types for the simfabric placement and migration layer.
//!
//! This crate provides the foundational types used throughout the
//! implementation:
//!
//! - **Identifiers**: [`HostId`], [`VertexId`], [`ObjectId`]
//! - **Cost model**: [`CostGraph`], [`PartitionMapping`], [`CoarseningHierarchy`]
//! - **Topology**: [`Neighbourhood`] (permitted migration targets)
//! - **Entity contract**: [`Entity`], [`ObjectReferrer`]
//! - **Network traits**: message markers for serialization and routing
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod coarsening;
mod entity;
mod graph;
mod identifiers;
mod mapping;
mod neighbourhood;
mod network;

pub use coarsening::{CoarseLevel, CoarseningHierarchy, HierarchyError};
pub use entity::{CallArgs, CallValue, Entity, EntityError, NoPartners, ObjectReferrer, SnapshotError};
pub use graph::{CostGraph, GraphError};
pub use identifiers::{HostId, ObjectId, ObjectIdAllocator, VertexId};
pub use mapping::PartitionMapping;
pub use neighbourhood::Neighbourhood;
pub use network::{NetworkMessage, Request};
