//! Entity-to-processor assignment table.

use crate::{CostGraph, HostId, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Total function from model vertex to processor.
///
/// Produced by the partitioner, consumed by the placement step that actually
/// instantiates entities on hosts. Serializable so a computed placement can be
/// shipped to an experiment runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMapping {
    assignments: BTreeMap<VertexId, HostId>,
}

impl PartitionMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a vertex to a host, replacing any previous assignment.
    pub fn assign(&mut self, v: VertexId, host: HostId) {
        self.assignments.insert(v, host);
    }

    /// Host a vertex is assigned to.
    pub fn host_of(&self, v: VertexId) -> Option<HostId> {
        self.assignments.get(&v).copied()
    }

    /// Remove a vertex from the mapping.
    pub fn remove(&mut self, v: VertexId) -> Option<HostId> {
        self.assignments.remove(&v)
    }

    /// Number of assigned vertices.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// True if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Assignments in ascending vertex order.
    pub fn iter(&self) -> impl Iterator<Item = (VertexId, HostId)> + '_ {
        self.assignments.iter().map(|(v, h)| (*v, *h))
    }

    /// Sum of weights of edges whose endpoints land on different hosts.
    ///
    /// The primary cost metric partitioning minimizes. Edges with an
    /// unassigned endpoint are ignored.
    pub fn edge_cut(&self, graph: &CostGraph) -> u64 {
        graph
            .edges()
            .filter_map(|(a, b, w)| {
                let (ha, hb) = (self.host_of(a)?, self.host_of(b)?);
                (ha != hb).then_some(w)
            })
            .sum()
    }

    /// Total vertex weight assigned to each host.
    pub fn load_per_host(&self, graph: &CostGraph) -> BTreeMap<HostId, u64> {
        let mut loads = BTreeMap::new();
        for (v, h) in self.iter() {
            if let Some(w) = graph.weight_of(v) {
                *loads.entry(h).or_insert(0) += w;
            }
        }
        loads
    }

    /// Number of vertices assigned differently from `other`.
    ///
    /// Vertices present in only one of the two mappings count as changed.
    /// Used to measure churn when re-partitioning for load balancing.
    pub fn churn(&self, other: &PartitionMapping) -> usize {
        let changed = self
            .iter()
            .filter(|(v, h)| other.host_of(*v) != Some(*h))
            .count();
        let removed = other
            .iter()
            .filter(|(v, _)| self.host_of(*v).is_none())
            .count();
        changed + removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: u32) -> VertexId {
        VertexId(n)
    }

    fn triangle() -> CostGraph {
        let mut g = CostGraph::new();
        for i in 0..3 {
            g.add_vertex(v(i), 1);
        }
        g.add_edge(v(0), v(1), 4).unwrap();
        g.add_edge(v(1), v(2), 5).unwrap();
        g.add_edge(v(0), v(2), 6).unwrap();
        g
    }

    #[test]
    fn test_edge_cut_counts_cross_host_edges_once() {
        let g = triangle();
        let mut m = PartitionMapping::new();
        m.assign(v(0), HostId(0));
        m.assign(v(1), HostId(0));
        m.assign(v(2), HostId(1));
        // Edges 1-2 and 0-2 cross the cut.
        assert_eq!(m.edge_cut(&g), 11);
    }

    #[test]
    fn test_load_per_host_sums_vertex_weights() {
        let g = triangle();
        let mut m = PartitionMapping::new();
        m.assign(v(0), HostId(0));
        m.assign(v(1), HostId(0));
        m.assign(v(2), HostId(1));
        let loads = m.load_per_host(&g);
        assert_eq!(loads[&HostId(0)], 2);
        assert_eq!(loads[&HostId(1)], 1);
    }

    #[test]
    fn test_churn_counts_reassignments_and_removals() {
        let mut a = PartitionMapping::new();
        a.assign(v(0), HostId(0));
        a.assign(v(1), HostId(1));
        let mut b = PartitionMapping::new();
        b.assign(v(0), HostId(0));
        b.assign(v(1), HostId(0));
        b.assign(v(2), HostId(1));
        // v1 moved, v2 only in b.
        assert_eq!(a.churn(&b), 2);
    }
}
