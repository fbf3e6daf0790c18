use std::thread;

use rstest::rstest;
use walkshard::{
    intersect_neighbors, Collective, CollectiveError, CsrGraph, EdgeBatch, EdgeBuffer, EdgeProperties, EdgeSegment,
    EdgeWeight, IngestError, Partitioning, PartitionView, Phase, RandomWalkEngine, ThreadCollective, VertexId,
    WalkConfig, WalkError, WalkMatrix, WalkPolicy, INVALID_VERTEX,
};

const N: usize = 12;

/// A ring over `N` vertices with chords `i -> i + 5`; weight encodes the edge.
fn ring_edges() -> Vec<(VertexId, VertexId, EdgeWeight)> {
    (0..N)
        .flat_map(|i| {
            [
                (i, (i + 1) % N, 1.0 + i as f32),
                (i, (i + 5) % N, 0.5 + i as f32),
            ]
        })
        .collect()
}

/// Every partition ingests an arbitrary slice of the edges, then consolidates.
fn build_partitions(comms: &[ThreadCollective], parts: &Partitioning) -> Vec<CsrGraph> {
    let edges = ring_edges();
    let size = comms.len();
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .map(|comm| {
                let edges = &edges;
                s.spawn(move || {
                    let mine: Vec<_> = edges.iter().skip(comm.rank()).step_by(size).copied().collect();
                    let src: Vec<VertexId> = mine.iter().map(|e| e.0).collect();
                    let dst: Vec<VertexId> = mine.iter().map(|e| e.1).collect();
                    let wgt: Vec<EdgeWeight> = mine.iter().map(|e| e.2).collect();

                    let mut buf = EdgeBuffer::new(3, EdgeProperties::WEIGHTED).unwrap();
                    buf.append(EdgeBatch::new(&src, &dst).with_weight(&wgt)).unwrap();
                    buf.finalize().unwrap();
                    buf.consolidate_and_shuffle(comm, parts, false).unwrap();
                    let seg = buf.into_segment().unwrap();
                    CsrGraph::from_segment(parts.clone(), comm.rank(), &seg).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn run_everywhere(parts_count: usize, policy: WalkPolicy, max_length: usize) -> (Vec<CsrGraph>, Vec<Vec<VertexId>>, Vec<WalkMatrix>) {
    let parts = Partitioning::even(N, parts_count).unwrap();
    let comms = ThreadCollective::group(parts_count);
    let graphs = build_partitions(&comms, &parts);
    let starts: Vec<Vec<VertexId>> = (0..parts_count)
        .map(|r| (0..N).filter(|v| v % parts_count == r).collect())
        .collect();

    let matrices: Vec<WalkMatrix> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(&graphs)
            .zip(&starts)
            .map(|((comm, g), starts)| {
                s.spawn(move || {
                    let config = WalkConfig {
                        max_length,
                        policy,
                        seed: 99,
                    };
                    RandomWalkEngine::new(g, comm, config).unwrap().run(starts).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    (graphs, starts, matrices)
}

fn is_ring_edge(u: VertexId, v: VertexId, w: EdgeWeight) -> bool {
    ring_edges().contains(&(u, v, w))
}

#[rstest]
#[case(2)]
#[case(3)]
fn consolidation_moves_edges_to_their_owner(#[case] parts_count: usize) {
    let parts = Partitioning::even(N, parts_count).unwrap();
    let comms = ThreadCollective::group(parts_count);
    let graphs = build_partitions(&comms, &parts);

    let mut all = Vec::new();
    for (rank, g) in graphs.iter().enumerate() {
        for (s, d, w) in g.edges() {
            assert_eq!(parts.owner_of(s), Some(rank), "edge {s}->{d} stored on the wrong partition");
            all.push((s, d, w.unwrap().to_bits()));
        }
    }
    let mut expected: Vec<_> = ring_edges().into_iter().map(|(s, d, w)| (s, d, w.to_bits())).collect();
    all.sort_unstable();
    expected.sort_unstable();
    assert_eq!(all, expected);
}

#[test]
fn transposed_consolidation_partitions_by_destination() {
    let parts = Partitioning::even(N, 2).unwrap();
    let comms = ThreadCollective::group(2);
    let edges = ring_edges();
    let received: Vec<Vec<VertexId>> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .map(|comm| {
                let (edges, parts) = (&edges, &parts);
                s.spawn(move || {
                    let mut buf = EdgeBuffer::new(8, EdgeProperties::NONE).unwrap();
                    if comm.rank() == 0 {
                        let src: Vec<VertexId> = edges.iter().map(|e| e.0).collect();
                        let dst: Vec<VertexId> = edges.iter().map(|e| e.1).collect();
                        buf.append(EdgeBatch::new(&src, &dst)).unwrap();
                    }
                    buf.finalize().unwrap();
                    buf.consolidate_and_shuffle(comm, parts, true).unwrap();
                    buf.into_segment().unwrap().dst
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (rank, dsts) in received.iter().enumerate() {
        assert_eq!(dsts.len(), N);
        assert!(dsts.iter().all(|&d| parts.owner_of(d) == Some(rank)));
    }
}

#[rstest]
#[case::uniform(2, WalkPolicy::Uniform)]
#[case::biased(3, WalkPolicy::Biased)]
#[case::node2vec(3, WalkPolicy::Node2Vec { p: 0.5, q: 2.0 })]
fn walks_cross_partitions_along_edges(#[case] parts_count: usize, #[case] policy: WalkPolicy) {
    let max_length = 9;
    let (_, starts, matrices) = run_everywhere(parts_count, policy, max_length);

    for (starts, m) in starts.iter().zip(&matrices) {
        assert_eq!(m.rows(), starts.len());
        let weights = m.weights().expect("weighted graph");
        assert_eq!(weights.len(), starts.len() * max_length);
        for (row, &s) in starts.iter().enumerate() {
            let walk = m.walk(row);
            assert_eq!(walk[0], s);
            // Every ring vertex has out-edges, so no walk terminates.
            assert!(walk.iter().all(|&v| v != INVALID_VERTEX));
            let wts = m.walk_weights(row).unwrap();
            for (step, pair) in walk.windows(2).enumerate() {
                assert!(
                    is_ring_edge(pair[0], pair[1], wts[step]),
                    "step {} -> {} (weight {}) is not an edge",
                    pair[0],
                    pair[1],
                    wts[step]
                );
            }
        }
    }
}

#[test]
fn intersection_fetches_remote_adjacency() {
    let parts = Partitioning::even(N, 2).unwrap();
    let comms = ThreadCollective::group(2);
    let graphs = build_partitions(&comms, &parts);
    let results: Vec<Vec<Vec<VertexId>>> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(&graphs)
            .map(|(comm, g)| {
                s.spawn(move || {
                    // Rank 0 owns 0..6 and asks about vertices owned by rank 1; rank 1 asks nothing.
                    let pairs: Vec<(VertexId, VertexId)> = if comm.rank() == 0 { vec![(0, 8), (2, 6)] } else { vec![] };
                    let out = intersect_neighbors(g, comm, &pairs).unwrap();
                    (0..out.len()).map(|i| out.get(i).to_vec()).collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    // N(0) = {1, 5}, N(8) = {1, 9}; N(2) = {3, 7}, N(6) = {7, 11}.
    assert_eq!(results[0], vec![vec![1], vec![7]]);
    assert!(results[1].is_empty());

    // 3 -> {4, 8} and 11 -> {0, 4}; 3 is local to rank 0 and 11 is remote.
    let results: Vec<Vec<Vec<VertexId>>> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(&graphs)
            .map(|(comm, g)| {
                s.spawn(move || {
                    let out = intersect_neighbors(g, comm, &[(3, 11)]).unwrap();
                    vec![out.get(0).to_vec()]
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results, vec![vec![vec![4]], vec![vec![4]]]);
    assert!(graphs[0].is_local(3) && !graphs[0].is_local(11));
}

#[test]
fn out_of_range_edge_fails_consolidation_on_every_partition() {
    let parts = Partitioning::even(4, 2).unwrap();
    let comms = ThreadCollective::group(2);
    let results: Vec<(IngestError, Phase)> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .map(|comm| {
                let parts = &parts;
                s.spawn(move || {
                    let mut buf = EdgeBuffer::new(4, EdgeProperties::NONE).unwrap();
                    if comm.rank() == 0 {
                        buf.append(EdgeBatch::new(&[1, 9], &[2, 0])).unwrap();
                    } else {
                        buf.append(EdgeBatch::new(&[3], &[0])).unwrap();
                    }
                    buf.finalize().unwrap();
                    let err = buf.consolidate_and_shuffle(comm, parts, false).unwrap_err();
                    (err, buf.phase())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0].0, IngestError::VertexOutOfRange { vertex: 9, vertex_count: 4 });
    assert_eq!(results[0].0.to_string(), "edge endpoint 9 is outside the vertex space of size 4");
    assert_eq!(
        results[1].0,
        IngestError::Collective(CollectiveError::PeerFailed { rank: 0 })
    );
    assert!(results.iter().all(|(_, phase)| *phase == Phase::Finalized));
}

/// Rank 0 owns 0..3 and rank 1 owns 3..6; 0 -> 3 -> 1 crosses twice and
/// 2 -> 5 ends on a vertex without out-edges.
fn dead_end_partitions(parts: &Partitioning) -> Vec<CsrGraph> {
    let seg = EdgeSegment {
        src: vec![0, 3, 2],
        dst: vec![3, 1, 5],
        weight: Some(vec![1.0, 2.0, 3.0]),
        ..EdgeSegment::default()
    };
    (0..parts.len())
        .map(|rank| CsrGraph::from_segment(parts.clone(), rank, &seg).unwrap())
        .collect()
}

#[rstest]
#[case::uniform(WalkPolicy::Uniform)]
#[case::biased(WalkPolicy::Biased)]
#[case::node2vec(WalkPolicy::Node2Vec { p: 1.0, q: 1.0 })]
fn walks_end_on_the_partition_that_owns_the_dead_end(#[case] policy: WalkPolicy) {
    let parts = Partitioning::new(vec![3, 6]).unwrap();
    let graphs = dead_end_partitions(&parts);
    let comms = ThreadCollective::group(2);
    let starts: [Vec<VertexId>; 2] = [vec![0, 2, 1], vec![5, 3]];
    let config = WalkConfig {
        max_length: 4,
        policy,
        seed: 5,
    };

    let matrices: Vec<WalkMatrix> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(&graphs)
            .zip(&starts)
            .map(|((comm, g), starts)| {
                s.spawn(move || RandomWalkEngine::new(g, comm, config).unwrap().run(starts).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    const X: VertexId = INVALID_VERTEX;
    assert_eq!(
        matrices[0].vertices(),
        &[0, 3, 1, X, X, 2, 5, X, X, X, 1, X, X, X, X]
    );
    assert_eq!(
        matrices[0].weights().unwrap(),
        &[1.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
    );
    assert_eq!(matrices[1].vertices(), &[5, X, X, X, X, 3, 1, X, X, X]);
    assert_eq!(
        matrices[1].weights().unwrap(),
        &[0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0]
    );
}

#[test]
fn bad_start_on_one_partition_fails_the_run_everywhere() {
    let parts = Partitioning::even(N, 2).unwrap();
    let comms = ThreadCollective::group(2);
    let graphs = build_partitions(&comms, &parts);
    let errors: Vec<WalkError> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(&graphs)
            .map(|(comm, g)| {
                s.spawn(move || {
                    let starts: Vec<VertexId> = if comm.rank() == 1 { vec![7, 99] } else { vec![0] };
                    let config = WalkConfig {
                        max_length: 3,
                        ..WalkConfig::default()
                    };
                    RandomWalkEngine::new(g, comm, config).unwrap().run(&starts).unwrap_err()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(errors[0], WalkError::Collective(CollectiveError::PeerFailed { rank: 1 }));
    assert_eq!(errors[1], WalkError::VertexOutOfRange { vertex: 99, vertex_count: N });
}

#[test]
fn unsorted_pairs_on_one_partition_fail_the_intersection_everywhere() {
    let parts = Partitioning::even(N, 2).unwrap();
    let comms = ThreadCollective::group(2);
    let graphs = build_partitions(&comms, &parts);
    let errors: Vec<WalkError> = thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(&graphs)
            .map(|(comm, g)| {
                s.spawn(move || {
                    let pairs: Vec<(VertexId, VertexId)> =
                        if comm.rank() == 0 { vec![(4, 1), (0, 8)] } else { vec![(7, 2)] };
                    intersect_neighbors(g, comm, &pairs).unwrap_err()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(errors[0], WalkError::UnsortedPairs { index: 1 });
    assert_eq!(errors[1], WalkError::Collective(CollectiveError::PeerFailed { rank: 0 }));
}
