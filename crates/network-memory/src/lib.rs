//! In-memory network with deterministic delivery.
//!
//! All hosts share a [`MemoryHub`]; each host talks to it through a
//! [`MemoryNetwork`] adapter implementing the
//! [`Network`](simfabric_network::Network) trait. Delivery is synchronous and
//! in-process: a request is served on the caller's stack, which makes
//! multi-host protocol tests deterministic without threads.
//!
//! Supports per-pair partitions (requests fail with a timeout, one-way
//! messages are dropped) and full codec round-trips, so tests exercise the
//! same serialization path a socket transport would.

mod adapter;
mod hub;

pub use adapter::MemoryNetwork;
pub use hub::{MemoryHub, MemoryHubConfig, TrafficStats};
