//! End-to-end runs through decomposition, scheduling and reassembly

use approx::assert_relative_eq;
use gridwork_algorithms::prelude::*;
use gridwork_core::io::{read_domain, write_domain};
use gridwork_parallel::Decomposition;
use ndarray::Array2;

fn grid(title: &str, data: Array2<f64>) -> Domain {
    Domain::from_array(title, 0.0, 0.0, &data, 1.0, None).unwrap()
}

fn layer_of(output: RunOutput) -> Array2<f64> {
    output.into_domain().unwrap().to_array().unwrap()
}

#[test]
fn local_sum_serial_and_pool() {
    let a = grid("a", Array2::from_elem((4, 4), 1.0));
    let b = grid("b", Array2::from_elem((4, 4), 2.0));
    let spec = local_sum([a, b]).unwrap();

    for config in [EngineConfig::serial().with_granularity(2), EngineConfig::pool(2).with_granularity(2)] {
        let (output, report) = run_with_report(&spec, &config).unwrap();
        assert_eq!(report.tasks, 2);
        assert!(report.is_complete());
        let out = layer_of(output);
        assert_eq!(out.dim(), (4, 4));
        assert!(out.iter().all(|&v| v == 3.0));
    }
}

#[test]
fn focal_mean_row_and_column() {
    let ones = grid("ones", Array2::ones((10, 10)));
    let spec = focal_statistics(ones, FocalParams::default()).unwrap();
    let config = EngineConfig::serial().with_granularity(4);

    let rows = layer_of(run(&spec, &config).unwrap());
    let cols = layer_of(run(&spec.clone().with_decomposition(Decomposition::Column), &config).unwrap());
    assert!(rows.iter().all(|&v| v == 1.0));
    assert_eq!(rows, cols);
}

#[test]
fn serial_and_pool_are_bit_identical() {
    let data = Array2::from_shape_fn((37, 23), |(r, c)| ((r * 31 + c * 17) % 29) as f64 * 0.37 - 3.0);
    let dem = grid("dem", data);
    let specs = [
        focal_statistics(dem.clone(), FocalParams { radius: 2, ..FocalParams::default() }).unwrap(),
        hillshade(dem.clone(), HillshadeParams::default()).unwrap(),
        local_sin(dem.clone()).unwrap(),
    ];
    for spec in &specs {
        let serial = layer_of(run(spec, &EngineConfig::serial().with_granularity(5)).unwrap());
        let pool = layer_of(run(spec, &EngineConfig::pool(4).with_granularity(5)).unwrap());
        for (a, b) in serial.iter().zip(pool.iter()) {
            assert!(a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()), "{} != {}", a, b);
        }
    }
}

fn cost_inputs() -> (Domain, Domain) {
    let mut sources = Array2::from_elem((20, 20), 1.0);
    sources[(10, 10)] = 0.0;
    (grid("sources", sources), grid("costs", Array2::ones((20, 20))))
}

#[test]
fn cost_distance_tiled_matches_single_tile() {
    let (sources, costs) = cost_inputs();
    let spec = cost_distance(sources, costs, CostDistanceParams::default()).unwrap();

    let whole = layer_of(run(&spec, &EngineConfig::serial().with_granularity(20)).unwrap());
    let (tiled, report) = run_with_report(&spec, &EngineConfig::serial().with_granularity(5)).unwrap();
    let tiled = layer_of(tiled);

    assert_eq!(report.tasks, 4);
    assert!(report.requeues > 0);
    assert_relative_eq!(whole[(10, 10)], 0.0);
    assert_relative_eq!(whole[(0, 10)], 10.0, epsilon = 1e-9);
    for (a, b) in whole.iter().zip(tiled.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn cost_distance_pool_terminates() {
    let (sources, costs) = cost_inputs();
    let spec = cost_distance(sources, costs, CostDistanceParams::default()).unwrap();
    let config = EngineConfig::pool(2).with_granularity(5);
    let (output, report) = run_with_report(&spec, &config).unwrap();

    assert!(report.is_complete());
    // Every group ends with idle_rounds idle executions
    assert!(report.executions >= report.tasks * config.idle_rounds as usize);
    let out = layer_of(output);
    assert_eq!(out[(10, 10)], 0.0);
    assert_relative_eq!(out[(11, 10)], 1.0, epsilon = 1e-9);
}

#[test]
fn cost_distance_far_source_reports_unset_cells() {
    let mut sources = Array2::from_elem((60, 3), 1.0);
    sources[(59, 0)] = 0.0;
    let spec = cost_distance(grid("sources", sources), grid("costs", Array2::ones((60, 3))), CostDistanceParams::default())
        .unwrap();

    // 30 tiles: the top ones go idle long before the front arrives
    let (short, report) = run_with_report(&spec, &EngineConfig::serial().with_granularity(2)).unwrap();
    let short = layer_of(short);
    assert!(short[(0, 0)].is_infinite());
    assert!(report.unset_cells > 0);
    assert_eq!(report.unset_cells, short.iter().filter(|v| v.is_infinite()).count());

    let patient = EngineConfig::serial().with_granularity(2).with_idle_rounds(40);
    let (full, report) = run_with_report(&spec, &patient).unwrap();
    assert_eq!(report.unset_cells, 0);
    assert_relative_eq!(layer_of(full)[(0, 0)], 59.0, epsilon = 1e-9);
}

#[test]
fn zonal_sees_the_whole_domain() {
    let values = grid("values", Array2::from_shape_fn((6, 2), |(r, _)| r as f64));
    let zones = grid("zones", Array2::from_shape_fn((6, 2), |(_, c)| c as f64 + 1.0));
    let spec = zonal_statistics(values, zones, ZonalStatistic::Sum).unwrap();
    let out = layer_of(run(&spec, &EngineConfig::pool(3).with_granularity(1)).unwrap());
    assert!(out.iter().all(|&v| v == 15.0));
}

#[test]
fn ascii_round_trip_through_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("dem.asc");
    let data = Array2::from_shape_fn((8, 6), |(r, c)| (r * 6 + c) as f64);
    write_domain(&input, &grid("dem", data.clone()), 3).unwrap();

    let dem = read_domain(&input).unwrap();
    let spec = dem.plus(&dem).unwrap();
    let result = run(&spec, &EngineConfig::pool(2).with_granularity(3)).unwrap().into_domain().unwrap();

    let output = dir.path().join("double.asc");
    write_domain(&output, &result, 3).unwrap();
    let back = read_domain(&output).unwrap().to_array().unwrap();
    for (a, b) in back.iter().zip(data.iter()) {
        assert_relative_eq!(*a, 2.0 * b, epsilon = 1e-9);
    }
}
