//! Deterministic greedy-growth partitioning.

use crate::config::{PartitionConfig, PartitionError};
use crate::refine;
use simfabric_types::{CostGraph, HostId, PartitionMapping, VertexId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Strategy interface for producing an entity-to-processor assignment.
///
/// `calculate_partition` must be deterministic given identical inputs and
/// identical configuration; reproducible experiments depend on it.
pub trait Partitioner {
    /// Compute a fresh mapping of every model vertex to a hardware vertex.
    fn calculate_partition(
        &self,
        hardware: &CostGraph,
        model: &CostGraph,
    ) -> Result<PartitionMapping, PartitionError>;

    /// Compute a mapping seeded with a previous one, to minimize churn when
    /// re-partitioning for load balancing. Seed assignments naming vertices
    /// or hosts that no longer exist are dropped.
    fn calculate_partition_seeded(
        &self,
        hardware: &CostGraph,
        model: &CostGraph,
        previous: &PartitionMapping,
    ) -> Result<PartitionMapping, PartitionError>;
}

/// Hardware vertices double as processor identities.
pub(crate) fn host_for(v: VertexId) -> HostId {
    HostId(v.0)
}

/// Proportional capacity per processor: its share of the total model weight
/// by hardware weight, times the slack factor. Zero-weight hardware graphs
/// fall back to equal shares.
pub(crate) fn capacities(
    hardware: &CostGraph,
    total_model_weight: u64,
    slack: f64,
) -> BTreeMap<HostId, u64> {
    let total_hw = hardware.total_weight();
    let count = hardware.vertex_count() as f64;
    hardware
        .vertices()
        .map(|(v, w)| {
            let share = if total_hw == 0 {
                1.0 / count
            } else {
                w as f64 / total_hw as f64
            };
            let cap = (total_model_weight as f64 * share * slack).ceil() as u64;
            (host_for(v), cap)
        })
        .collect()
}

/// Capacity-aware greedy placement.
///
/// Vertices are placed in descending weight order (ascending id on ties);
/// each vertex goes to the feasible processor with the strongest attachment
/// to its already-placed neighbours. A boundary-refinement pass cleans up
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct GreedyGrowthPartitioner {
    config: PartitionConfig,
}

impl GreedyGrowthPartitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    fn place(
        &self,
        hardware: &CostGraph,
        model: &CostGraph,
        seed: Option<&PartitionMapping>,
    ) -> Result<PartitionMapping, PartitionError> {
        if hardware.is_empty() {
            return Err(PartitionError::EmptyHardwareGraph);
        }
        if self.config.slack < 1.0 {
            return Err(PartitionError::InvalidSlack(self.config.slack));
        }
        // An empty model partitions to an empty mapping, not an error.
        if model.is_empty() {
            return Ok(PartitionMapping::new());
        }

        let caps = capacities(hardware, model.total_weight(), self.config.slack);
        let mut loads: BTreeMap<HostId, u64> = BTreeMap::new();
        let mut mapping = PartitionMapping::new();

        // Pins first; a pin that cannot fit is a constraint conflict.
        for (&v, &host) in &self.config.pins {
            let Some(w) = model.weight_of(v) else {
                continue;
            };
            let Some(&cap) = caps.get(&host) else {
                return Err(PartitionError::ConstraintConflict {
                    vertex: v,
                    host,
                    reason: "host is not in the hardware graph".into(),
                });
            };
            let load = loads.entry(host).or_insert(0);
            if *load + w > cap {
                return Err(PartitionError::ConstraintConflict {
                    vertex: v,
                    host,
                    reason: format!("pinned load {} exceeds capacity {cap}", *load + w),
                });
            }
            *load += w;
            mapping.assign(v, host);
        }

        // Seed assignments keep their host when still valid and feasible.
        if let Some(previous) = seed {
            for (v, host) in previous.iter() {
                if mapping.host_of(v).is_some() || !model.contains(v) {
                    continue;
                }
                let Some(&cap) = caps.get(&host) else {
                    continue;
                };
                let w = model.weight_of(v).unwrap_or(0);
                let load = loads.entry(host).or_insert(0);
                if *load + w <= cap {
                    *load += w;
                    mapping.assign(v, host);
                }
            }
        }

        // Remaining vertices: heaviest first, ascending id on ties.
        let mut order: Vec<(VertexId, u64)> = model
            .vertices()
            .filter(|(v, _)| mapping.host_of(*v).is_none())
            .collect();
        order.sort_by_key(|&(v, w)| (std::cmp::Reverse(w), v));

        for (v, w) in order {
            let mut attach: BTreeMap<HostId, (u64, usize)> = BTreeMap::new();
            for (n, ew) in model.neighbours(v) {
                if let Some(h) = mapping.host_of(n) {
                    let slot = attach.entry(h).or_insert((0, 0));
                    slot.0 += ew;
                    slot.1 += 1;
                }
            }

            // Strongest attachment wins; ties prefer the majority of placed
            // neighbours, then the lighter host, then the lower id.
            let mut best: Option<(u64, usize, std::cmp::Reverse<u64>, HostId)> = None;
            for (&host, &cap) in &caps {
                let load = loads.get(&host).copied().unwrap_or(0);
                if load + w > cap {
                    continue;
                }
                let (aw, ac) = attach.get(&host).copied().unwrap_or((0, 0));
                let key = (aw, ac, std::cmp::Reverse(load), host);
                let better = match &best {
                    None => true,
                    Some((bw, bc, bl, bh)) => {
                        (aw, ac, std::cmp::Reverse(load), std::cmp::Reverse(host))
                            > (*bw, *bc, *bl, std::cmp::Reverse(*bh))
                    }
                };
                if better {
                    best = Some(key);
                }
            }

            let host = match best {
                Some((_, _, _, host)) => host,
                None => {
                    // All processors full; take the least loaded one. The
                    // slack invariant is already violated by the input sizes.
                    let host = caps
                        .keys()
                        .min_by_key(|h| (loads.get(h).copied().unwrap_or(0), **h))
                        .copied()
                        .expect("hardware graph checked non-empty");
                    warn!(vertex = %v, weight = w, %host, "no feasible processor; overflowing least-loaded");
                    host
                }
            };
            *loads.entry(host).or_insert(0) += w;
            mapping.assign(v, host);
        }

        let gain = refine::refine_mapping(
            model,
            &mut mapping,
            &caps,
            &self.config.pins,
            self.config.refinement_passes,
        );
        debug!(
            vertices = mapping.len(),
            edge_cut = mapping.edge_cut(model),
            refinement_gain = gain,
            "partition computed"
        );
        Ok(mapping)
    }
}

impl Partitioner for GreedyGrowthPartitioner {
    fn calculate_partition(
        &self,
        hardware: &CostGraph,
        model: &CostGraph,
    ) -> Result<PartitionMapping, PartitionError> {
        self.place(hardware, model, None)
    }

    fn calculate_partition_seeded(
        &self,
        hardware: &CostGraph,
        model: &CostGraph,
        previous: &PartitionMapping,
    ) -> Result<PartitionMapping, PartitionError> {
        self.place(hardware, model, Some(previous))
    }
}
