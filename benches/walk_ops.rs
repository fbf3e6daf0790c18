//! Benchmarks for edge ingestion and walk generation under each policy.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand::SeedableRng;
use std::hint::black_box;
use walkshard::{
    CsrGraph, EdgeBatch, EdgeBuffer, EdgeProperties, RandomWalkEngine, SoloCollective, VertexId, WalkConfig,
    WalkPolicy,
};

type Edge = (VertexId, VertexId, f32);

/// Ring with a chord `i -> i + n / 3`; every vertex has out-degree 2.
fn ring_edges(n: usize) -> Vec<Edge> {
    (0..n)
        .flat_map(|i| [(i, (i + 1) % n, 1.0), (i, (i + n / 3) % n, 2.0)])
        .collect()
}

/// `degree` out-edges per vertex with targets skewed toward low ids
/// (`n * u^3` for uniform `u`), giving a few very high in-degree hubs.
fn skewed_edges(n: usize, degree: usize, seed: u64) -> Vec<Edge> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .flat_map(|u| std::iter::repeat(u).take(degree))
        .map(|u| {
            let x: f64 = rng.random();
            let v = ((x * x * x) * n as f64) as VertexId;
            (u, v.min(n - 1), rng.random_range(0.5f32..4.0))
        })
        .collect()
}

fn to_csr(n: usize, edges: &[Edge]) -> CsrGraph {
    CsrGraph::from_weighted_edges(n, edges).expect("bench graph is valid")
}

fn bench_walk_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk_generation");

    for n in [1_000usize, 10_000] {
        let graphs = [
            ("ring", to_csr(n, &ring_edges(n))),
            ("skewed_d8", to_csr(n, &skewed_edges(n, 8, 123))),
        ];
        let starts: Vec<VertexId> = (0..n).cycle().take(2 * n).collect();

        for (name, g) in &graphs {
            for (label, policy) in [
                ("uniform", WalkPolicy::Uniform),
                ("biased", WalkPolicy::Biased),
                ("node2vec", WalkPolicy::Node2Vec { p: 0.5, q: 2.0 }),
            ] {
                // Keep total work bounded.
                let cfg = WalkConfig {
                    max_length: 40,
                    policy,
                    seed: 123,
                };
                let engine = RandomWalkEngine::new(g, &SoloCollective, cfg).expect("valid config");
                group.bench_with_input(BenchmarkId::new(format!("{name}/{label}"), n), &n, |b, _| {
                    b.iter(|| {
                        let walks = engine.run(black_box(&starts)).expect("walks");
                        black_box(walks);
                    })
                });
            }
        }
    }

    group.finish();
}

fn bench_ingestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_ingestion");
    let edges = 200_000usize;
    let src: Vec<VertexId> = (0..edges).map(|i| i % 10_007).collect();
    let dst: Vec<VertexId> = (0..edges).map(|i| (i * 7) % 10_007).collect();
    let wgt: Vec<f32> = (0..edges).map(|i| (i % 13) as f32).collect();

    for producers in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("append_finalize", producers), &producers, |b, &producers| {
            b.iter(|| {
                let mut buf = EdgeBuffer::new(1 << 16, EdgeProperties::WEIGHTED).expect("capacity");
                let chunk = edges / producers;
                std::thread::scope(|s| {
                    for p in 0..producers {
                        let (buf, src, dst, wgt) = (&buf, &src, &dst, &wgt);
                        s.spawn(move || {
                            for at in (p * chunk..(p + 1) * chunk).step_by(1024) {
                                let end = (at + 1024).min((p + 1) * chunk);
                                buf.append(
                                    EdgeBatch::new(&src[at..end], &dst[at..end]).with_weight(&wgt[at..end]),
                                )
                                .expect("append");
                            }
                        });
                    }
                });
                buf.finalize().expect("finalize");
                black_box(buf.len());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_walk_generation, bench_ingestion);
criterion_main!(benches);
