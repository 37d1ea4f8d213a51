use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use policy_graph::{detect_cycles, parse_relations, CycleScan, GraphBuilder};
use std::hint::black_box;

/// `g, role_0, role_1`, `g, role_1, role_2`, ... with one `p` rule per role.
fn build_chain_policy(depth: usize) -> String {
    let mut policy = String::new();
    for index in 0..depth {
        policy.push_str(&format!("p, role_{index}, data_{index}, read\n"));
        policy.push_str(&format!("g, role_{index}, role_{}\n", index + 1));
    }
    policy
}

/// Many users, each a member of one of a handful of roles.
fn build_fan_out_policy(users: usize) -> String {
    let mut policy = String::new();
    for role in 0..8 {
        policy.push_str(&format!("p, role_{role}, data_{role}, write\n"));
    }
    for user in 0..users {
        policy.push_str(&format!("g, user_{user}, role_{}\n", user % 8));
    }
    policy
}

/// Roles inheriting in a closed ring.
fn build_ring_policy(size: usize) -> String {
    (0..size)
        .map(|index| format!("g, role_{index}, role_{}\n", (index + 1) % size))
        .collect()
}

fn bench_graph_builder(c: &mut Criterion) {
    let builder = GraphBuilder::new();
    let mut group = c.benchmark_group("graph_builder_build");

    for &size in &[16usize, 128, 1024] {
        let chain = build_chain_policy(size);
        group.bench_with_input(BenchmarkId::new("chain", size), &chain, |b, policy| {
            b.iter(|| black_box(builder.build(policy)));
        });

        let fan_out = build_fan_out_policy(size);
        group.bench_with_input(BenchmarkId::new("fan_out", size), &fan_out, |b, policy| {
            b.iter(|| black_box(builder.build(policy)));
        });
    }

    group.finish();
}

fn bench_cycle_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_cycles");

    for &size in &[16usize, 128, 1024] {
        let relations = parse_relations(&build_ring_policy(size)).relations;
        for (label, scan) in [("per_start", CycleScan::PerStart), ("shared", CycleScan::Shared)] {
            group.bench_with_input(BenchmarkId::new(label, size), &relations, |b, relations| {
                b.iter(|| black_box(detect_cycles(relations, scan)));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_graph_builder, bench_cycle_scan);
criterion_main!(benches);
