//! Multilevel refinement over a precomputed coarsening hierarchy.

use crate::config::{PartitionConfig, PartitionError};
use crate::greedy::{capacities, Partitioner};
use crate::refine;
use simfabric_types::{CoarseningHierarchy, CostGraph, HostId, PartitionMapping};
use std::collections::BTreeMap;
use tracing::debug;

/// Produces a better mapping than single-level partitioning by partitioning
/// the coarsest graph and walking back to the finest, refining the projected
/// assignment at every level.
///
/// Coarsening itself is external; this refiner consumes a validated
/// [`CoarseningHierarchy`]. The wrapped partitioner runs exactly once, on the
/// coarsest graph.
#[derive(Debug, Clone)]
pub struct MultilevelRefiner<P: Partitioner> {
    partitioner: P,
    config: PartitionConfig,
}

impl<P: Partitioner> MultilevelRefiner<P> {
    pub fn new(partitioner: P, config: PartitionConfig) -> Self {
        Self {
            partitioner,
            config,
        }
    }

    /// Partition the coarsest level, then refine level-by-level down to the
    /// finest graph.
    pub fn refine(
        &self,
        hardware: &CostGraph,
        hierarchy: &CoarseningHierarchy,
    ) -> Result<PartitionMapping, PartitionError> {
        let mut mapping = self
            .partitioner
            .calculate_partition(hardware, hierarchy.coarsest())?;

        // Merging conserves weight, so capacities computed against the finest
        // total hold at every level.
        let caps = capacities(
            hardware,
            hierarchy.finest().total_weight(),
            self.config.slack,
        );

        for level in (1..hierarchy.len()).rev() {
            mapping = self.refine_partition(hierarchy, level, &mapping, &caps)?;
        }
        Ok(mapping)
    }

    /// Expand the mapping of level `level` onto level `level - 1` and improve
    /// it with boundary refinement.
    ///
    /// Each fine vertex inherits its coarse parent's processor as a starting
    /// point. Pins apply only at the finest level, where the configured
    /// vertex ids are meaningful.
    pub fn refine_partition(
        &self,
        hierarchy: &CoarseningHierarchy,
        level: usize,
        coarse_mapping: &PartitionMapping,
        caps: &BTreeMap<HostId, u64>,
    ) -> Result<PartitionMapping, PartitionError> {
        let fine = hierarchy.level(level - 1);
        let mut mapping = PartitionMapping::new();
        for (v, _) in fine.graph.vertices() {
            // Hierarchy validation guarantees a parent for every non-coarsest
            // vertex, and the coarse mapping is total.
            let parent = fine.parent[&v];
            let host = coarse_mapping
                .host_of(parent)
                .expect("coarse mapping must be total");
            mapping.assign(v, host);
        }

        let no_pins = BTreeMap::new();
        let pins = if level == 1 { &self.config.pins } else { &no_pins };
        let gain = refine::refine_mapping(
            &fine.graph,
            &mut mapping,
            caps,
            pins,
            self.config.refinement_passes,
        );
        debug!(
            level = level - 1,
            vertices = mapping.len(),
            edge_cut = mapping.edge_cut(&fine.graph),
            refinement_gain = gain,
            "uncoarsened one level"
        );
        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greedy::GreedyGrowthPartitioner;
    use simfabric_types::{CoarseLevel, VertexId};

    fn v(n: u32) -> VertexId {
        VertexId(n)
    }

    fn hardware(n: u32) -> CostGraph {
        let mut hw = CostGraph::new();
        for i in 0..n {
            hw.add_vertex(v(i), 1);
        }
        for i in 1..n {
            hw.add_edge(v(0), v(i), 1).unwrap();
        }
        hw
    }

    /// Two clusters of three vertices, coarsened into one vertex each.
    fn clustered_hierarchy() -> CoarseningHierarchy {
        let mut fine = CostGraph::new();
        for i in 0..6 {
            fine.add_vertex(v(i), 1);
        }
        // Cluster {0,1,2} and {3,4,5}, weak link between them.
        fine.add_edge(v(0), v(1), 8).unwrap();
        fine.add_edge(v(1), v(2), 8).unwrap();
        fine.add_edge(v(0), v(2), 8).unwrap();
        fine.add_edge(v(3), v(4), 8).unwrap();
        fine.add_edge(v(4), v(5), 8).unwrap();
        fine.add_edge(v(3), v(5), 8).unwrap();
        fine.add_edge(v(2), v(3), 1).unwrap();

        let mut coarse = CostGraph::new();
        coarse.add_vertex(v(100), 3);
        coarse.add_vertex(v(101), 3);
        coarse.add_edge(v(100), v(101), 1).unwrap();

        let parent = BTreeMap::from([
            (v(0), v(100)),
            (v(1), v(100)),
            (v(2), v(100)),
            (v(3), v(101)),
            (v(4), v(101)),
            (v(5), v(101)),
        ]);
        CoarseningHierarchy::new(vec![
            CoarseLevel {
                graph: fine,
                parent,
            },
            CoarseLevel {
                graph: coarse,
                parent: BTreeMap::new(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_projection_is_weight_conserving() {
        let hierarchy = clustered_hierarchy();
        let refiner = MultilevelRefiner::new(
            GreedyGrowthPartitioner::default(),
            PartitionConfig::default(),
        );
        let hw = hardware(2);

        let coarse = GreedyGrowthPartitioner::default()
            .calculate_partition(&hw, hierarchy.coarsest())
            .unwrap();
        let fine = refiner.refine(&hw, &hierarchy).unwrap();

        // Each host carries the same weight before and after uncoarsening.
        let coarse_loads = coarse.load_per_host(hierarchy.coarsest());
        let fine_loads = fine.load_per_host(hierarchy.finest());
        assert_eq!(coarse_loads, fine_loads);
    }

    #[test]
    fn test_refined_mapping_is_total_over_finest_graph() {
        let hierarchy = clustered_hierarchy();
        let refiner = MultilevelRefiner::new(
            GreedyGrowthPartitioner::default(),
            PartitionConfig::default(),
        );
        let fine = refiner.refine(&hardware(2), &hierarchy).unwrap();
        assert_eq!(fine.len(), 6);
        // The weak inter-cluster link is the only cut edge.
        assert_eq!(fine.edge_cut(hierarchy.finest()), 1);
    }

    #[test]
    fn test_flat_hierarchy_degenerates_to_plain_partitioning() {
        let mut model = CostGraph::new();
        for i in 0..4 {
            model.add_vertex(v(i), 1);
        }
        model.add_edge(v(0), v(1), 3).unwrap();
        model.add_edge(v(2), v(3), 3).unwrap();
        let hierarchy = CoarseningHierarchy::new(vec![CoarseLevel {
            graph: model.clone(),
            parent: BTreeMap::new(),
        }])
        .unwrap();

        let refiner = MultilevelRefiner::new(
            GreedyGrowthPartitioner::default(),
            PartitionConfig::default(),
        );
        let mapping = refiner.refine(&hardware(2), &hierarchy).unwrap();
        assert_eq!(mapping.len(), 4);
    }
}
