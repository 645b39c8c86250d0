//! Exit draining benchmarks.
//!
//! Run: cargo bench --bench drain_bench

#![allow(clippy::unwrap_used)]

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use guildhall_core::{Address, Organization, OrganizationBuilder, Ragequit, fair_share};
use std::hint::black_box;

fn organization_with_assets(count: usize) -> (Organization, Ragequit, Address) {
    let built = OrganizationBuilder::new("bench")
        .max_external_tokens(count as u128)
        .build()
        .unwrap();
    let mut org = built.organization;
    let alice = Address::derive("alice");
    org.add_member(alice, 100, 0).unwrap();
    org.add_member(Address::derive("bob"), 900, 0).unwrap();
    for index in 0..count {
        let asset = Address::derive(&format!("asset:{index}"));
        org.register_token(asset).unwrap();
        org.fund(asset, 1_000_000).unwrap();
    }
    (org, built.ragequit, alice)
}

fn bench_fair_share(c: &mut Criterion) {
    c.bench_function("fair_share", |b| {
        b.iter(|| fair_share(black_box(1_000_000_000), black_box(40), black_box(1_000)));
    });
    c.bench_function("fair_share_overflow_path", |b| {
        b.iter(|| fair_share(black_box(u128::MAX / 3), black_box(7), black_box(1_000)));
    });
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain_exit");

    for count in [10usize, 100, 200] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("full", count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let (mut org, ragequit, alice) = organization_with_assets(count);
                    ragequit.start_exit(&mut org, alice, 40, 0).unwrap();
                    (org, ragequit, alice)
                },
                |(mut org, ragequit, alice)| {
                    ragequit
                        .drain_exit(&mut org, alice, count as u64)
                        .unwrap()
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fair_share, bench_drain);
criterion_main!(benches);
