//! Benchmarks for focal operations

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gridwork_algorithms::prelude::*;
use ndarray::Array2;

fn create_dem(size: usize) -> Domain {
    // Create a varied surface (combination of planes and noise-like pattern)
    let data = Array2::from_shape_fn((size, size), |(row, col)| {
        let base = (row + col) as f64;
        let variation = ((row * 7 + col * 13) % 100) as f64 / 10.0;
        base + variation
    });
    Domain::from_array("dem", 0.0, 0.0, &data, 1.0, None).unwrap()
}

fn bench_focal_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("focal_mean");
    let config = EngineConfig::default().with_granularity(64);

    for size in [128, 256, 512].iter() {
        let dem = create_dem(*size);
        let cell = focal_statistics(dem.clone(), FocalParams::default()).unwrap();
        let bulk = focal_mean_bulk(dem, 1).unwrap();

        group.bench_with_input(BenchmarkId::new("cell", size), size, |b, _| {
            b.iter(|| run(black_box(&cell), &config).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("bulk", size), size, |b, _| {
            b.iter(|| run(black_box(&bulk), &config).unwrap())
        });
    }

    group.finish();
}

fn bench_hillshade(c: &mut Criterion) {
    let mut group = c.benchmark_group("hillshade");
    let config = EngineConfig::default().with_granularity(64);

    for size in [256, 512].iter() {
        let spec = hillshade(create_dem(*size), HillshadeParams::default()).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| run(black_box(&spec), &config).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_focal_mean, bench_hillshade);
criterion_main!(benches);
