//! End-to-end placement quality checks on a small reference model.

use simfabric_partition::{GreedyGrowthPartitioner, Partitioner};
use simfabric_types::{CostGraph, HostId, PartitionMapping, VertexId};

fn v(n: u32) -> VertexId {
    VertexId(n)
}

/// Classic 6-vertex weighted graph.
fn reference_model() -> CostGraph {
    let mut g = CostGraph::new();
    for i in 0..6 {
        g.add_vertex(v(i), 1);
    }
    for (a, b, w) in [
        (0, 1, 7),
        (0, 2, 9),
        (0, 5, 14),
        (1, 2, 10),
        (1, 3, 15),
        (2, 3, 11),
        (2, 5, 2),
        (3, 4, 6),
        (4, 5, 9),
    ] {
        g.add_edge(v(a), v(b), w).unwrap();
    }
    g
}

fn two_processors() -> CostGraph {
    let mut hw = CostGraph::new();
    hw.add_vertex(v(0), 1);
    hw.add_vertex(v(1), 1);
    hw.add_edge(v(0), v(1), 1).unwrap();
    hw
}

/// Cut of the naive contiguous-id split {0,1,2} | {3,4,5}.
fn naive_split_cut(model: &CostGraph) -> u64 {
    let mut naive = PartitionMapping::new();
    for i in 0..3 {
        naive.assign(v(i), HostId(0));
    }
    for i in 3..6 {
        naive.assign(v(i), HostId(1));
    }
    naive.edge_cut(model)
}

#[test]
fn test_partitioner_beats_contiguous_split() {
    let model = reference_model();
    let mapping = GreedyGrowthPartitioner::default()
        .calculate_partition(&two_processors(), &model)
        .unwrap();

    assert_eq!(mapping.len(), 6);
    assert!(
        mapping.edge_cut(&model) <= naive_split_cut(&model),
        "edge cut {} worse than naive split {}",
        mapping.edge_cut(&model),
        naive_split_cut(&model)
    );
}

#[test]
fn test_partition_balances_within_slack() {
    let model = reference_model();
    let mapping = GreedyGrowthPartitioner::default()
        .calculate_partition(&two_processors(), &model)
        .unwrap();

    // Equal-weight processors, total weight 6, slack 1.05: at most 4 each.
    for (_, load) in mapping.load_per_host(&model) {
        assert!(load <= 4, "processor overloaded: {load}");
    }
}

#[test]
fn test_repartition_after_growth_keeps_old_placement_stable() {
    let mut model = reference_model();
    let p = GreedyGrowthPartitioner::default();
    let before = p.calculate_partition(&two_processors(), &model).unwrap();

    model.add_vertex(v(6), 1);
    model.add_edge(v(6), v(4), 3).unwrap();
    let after = p
        .calculate_partition_seeded(&two_processors(), &model, &before)
        .unwrap();

    assert_eq!(after.len(), 7);
    assert!(
        after.churn(&before) <= 2,
        "seeded repartition churned {} assignments",
        after.churn(&before)
    );
}
