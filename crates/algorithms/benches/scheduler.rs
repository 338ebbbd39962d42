//! Benchmarks for dispatch: serial sweep vs worker pool, and tile size

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gridwork_algorithms::prelude::*;
use ndarray::Array2;

fn layer(title: &str, size: usize, value: f64) -> Domain {
    Domain::from_array(title, 0.0, 0.0, &Array2::from_elem((size, size), value), 1.0, None).unwrap()
}

fn bench_local_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_sum");
    let spec = local_sum([layer("a", 512, 1.0), layer("b", 512, 2.0)]).unwrap();

    for workers in [1usize, 2, 4, 8].iter() {
        let config = if *workers == 1 {
            EngineConfig::serial()
        } else {
            EngineConfig::pool(*workers)
        };
        group.bench_with_input(BenchmarkId::new("workers", workers), workers, |b, _| {
            b.iter(|| run(black_box(&spec), &config).unwrap())
        });
    }

    for granularity in [8usize, 32, 128].iter() {
        let config = EngineConfig::default().with_granularity(*granularity);
        group.bench_with_input(BenchmarkId::new("granularity", granularity), granularity, |b, _| {
            b.iter(|| run(black_box(&spec), &config).unwrap())
        });
    }

    group.finish();
}

fn bench_cost_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("cost_distance");
    group.sample_size(10);

    for size in [64usize, 128].iter() {
        let mut sources = Array2::from_elem((*size, *size), 1.0);
        sources[(size / 2, size / 2)] = 0.0;
        let sources = Domain::from_array("sources", 0.0, 0.0, &sources, 1.0, None).unwrap();
        let spec = cost_distance(sources, layer("costs", *size, 1.0), CostDistanceParams::default()).unwrap();
        let config = EngineConfig::default().with_granularity(16);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| run(black_box(&spec), &config).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_local_sum, bench_cost_distance);
criterion_main!(benches);
