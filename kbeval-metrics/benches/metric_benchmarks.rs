//! Benchmarks for per-query metric computation and aggregation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kbeval_metrics::{Aggregator, MetricInput, MetricSet, QueryOutcome};
use std::time::Duration;

fn sample_input(relevant: u32, retrieved: u32) -> MetricInput<u32> {
    let ground_truth = vec![
        (0..relevant).collect(),
        (relevant / 2..relevant + relevant / 2).collect(),
    ];
    let retrieved = (0..retrieved).map(|i| (i * 7) % (relevant * 3)).collect();
    MetricInput::new(ground_truth, retrieved)
}

fn bench_standard_set(c: &mut Criterion) {
    let set: MetricSet<u32> = MetricSet::standard(10);
    let input = sample_input(20, 50);

    c.bench_function("standard_metric_set", |b| {
        b.iter(|| set.compute(black_box(&input)))
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let outcomes: Vec<_> = (0..1_000)
        .map(|i| {
            QueryOutcome::evaluate(
                &sample_input(10 + i % 10, 30),
                10,
                Duration::from_millis(u64::from(i % 50)),
            )
        })
        .collect();
    let aggregator = Aggregator::default();

    c.bench_function("aggregate_1000_queries", |b| {
        b.iter(|| aggregator.aggregate(black_box(&outcomes)))
    });
}

criterion_group!(benches, bench_standard_set, bench_aggregate);
criterion_main!(benches);
