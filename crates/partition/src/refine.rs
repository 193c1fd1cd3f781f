//! Boundary refinement: gain-based single-vertex moves.
//!
//! Shared by the greedy partitioner (post-placement cleanup) and the
//! multilevel refiner (per-level improvement). Pure and deterministic.

use simfabric_types::{CostGraph, HostId, PartitionMapping, VertexId};
use std::collections::BTreeMap;
use tracing::trace;

/// Per-host attachment of one vertex: total edge weight and neighbour count
/// towards already-placed neighbours on that host.
fn attachment(
    graph: &CostGraph,
    mapping: &PartitionMapping,
    v: VertexId,
) -> BTreeMap<HostId, (u64, usize)> {
    let mut attach: BTreeMap<HostId, (u64, usize)> = BTreeMap::new();
    for (n, w) in graph.neighbours(v) {
        if let Some(h) = mapping.host_of(n) {
            let slot = attach.entry(h).or_insert((0, 0));
            slot.0 += w;
            slot.1 += 1;
        }
    }
    attach
}

/// Run up to `passes` improvement passes over the mapping, moving one vertex
/// at a time to the host that most reduces the edge-cut, subject to capacity.
///
/// Tie-break between equal-gain targets: the host holding the majority of the
/// vertex's placed neighbours, then the lowest host id (stability over
/// churn). Pinned vertices are never moved. Returns the total cut reduction.
pub(crate) fn refine_mapping(
    graph: &CostGraph,
    mapping: &mut PartitionMapping,
    capacities: &BTreeMap<HostId, u64>,
    pins: &BTreeMap<VertexId, HostId>,
    passes: usize,
) -> u64 {
    let mut loads = mapping.load_per_host(graph);
    let mut total_gain = 0u64;

    for pass in 0..passes {
        let mut improved = false;
        for (v, w) in graph.vertices() {
            if pins.contains_key(&v) {
                continue;
            }
            let Some(current) = mapping.host_of(v) else {
                continue;
            };
            let attach = attachment(graph, mapping, v);
            let here = attach.get(&current).map(|a| a.0).unwrap_or(0);

            // Only hosts that hold at least one neighbour can reduce the cut.
            let mut best: Option<(u64, usize, HostId)> = None;
            for (&candidate, &(weight, count)) in &attach {
                if candidate == current || weight <= here {
                    continue;
                }
                let load = loads.get(&candidate).copied().unwrap_or(0);
                let cap = capacities.get(&candidate).copied().unwrap_or(0);
                if load + w > cap {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((bw, bc, bh)) => {
                        (weight, count, std::cmp::Reverse(candidate))
                            > (bw, bc, std::cmp::Reverse(bh))
                    }
                };
                if better {
                    best = Some((weight, count, candidate));
                }
            }

            if let Some((weight, _, target)) = best {
                let gain = weight - here;
                trace!(vertex = %v, from = %current, to = %target, gain, "refinement move");
                mapping.assign(v, target);
                *loads.entry(current).or_insert(w) -= w;
                *loads.entry(target).or_insert(0) += w;
                total_gain += gain;
                improved = true;
            }
        }
        if !improved {
            trace!(pass, total_gain, "refinement converged");
            break;
        }
    }
    total_gain
}
