//! Global operations: every tile sees the whole domain
//!
//! - Minimum distance (and index of the nearest point) from each cell to a
//!   point layer, Euclidean or Manhattan
//! - Sum of a layer, returned as a scalar

use gridwork_core::{Domain, Error, Point, Result};
use gridwork_parallel::{CellContext, OpClass, OperationSpec};

/// Distance metric between a cell and a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

impl DistanceMetric {
    fn distance(&self, (y, x): (f64, f64), point: &Point) -> f64 {
        let (dy, dx) = (y - point.y, x - point.x);
        match self {
            DistanceMetric::Euclidean => (dy * dy + dx * dx).sqrt(),
            DistanceMetric::Manhattan => dy.abs() + dx.abs(),
        }
    }
}

/// Point layer re-framed on the grid's extent and cell size, so both
/// layers decompose into the same tiles
fn conform_points(grid: &Domain, points: &Domain) -> Result<Domain> {
    let cell_size = grid
        .cell_size()
        .ok_or_else(|| Error::invalid_input(format!("'{}' has no cell size", grid.title()), "none"))?;
    let list = points
        .points()
        .ok_or_else(|| Error::invalid_input(format!("'{}' is not a point layer", points.title()), "grid"))?;
    Domain::from_points(points.title(), grid.extent(), list.snapshot(), Some(cell_size))
}

/// Index and distance of the point nearest to a cell target, located by its lower corner
fn nearest(ctx: &CellContext<'_>, metric: DistanceMetric) -> Result<Option<(usize, f64)>> {
    let (row, col) = ctx
        .cell()
        .ok_or_else(|| Error::Operation("distance operations need a grid output".into()))?;
    let output = ctx.output;
    let location = output.cell_to_map(row - output.row_offset(), col - output.col_offset())?;
    let points = ctx
        .input(1)?
        .points()
        .ok_or_else(|| Error::Operation("second layer must hold points".into()))?
        .read();

    Ok(points
        .iter()
        .map(|p| metric.distance(location, p))
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
            Some((_, bd)) if bd <= d => best,
            _ => Some((i, d)),
        }))
}

fn distance_operation(name: &str, grid: Domain, points: Domain, metric: DistanceMetric, index: bool) -> Result<OperationSpec> {
    let points = conform_points(&grid, &points)?;
    OperationSpec::builder(name, OpClass::Global)
        .layers([grid, points])
        .cell_fn(move |ctx| {
            Ok(match (nearest(ctx, metric)?, index) {
                (Some((i, _)), true) => i as f64,
                (Some((_, d)), false) => d,
                (None, true) => -1.0,
                (None, false) => f64::INFINITY,
            })
        })
        .build()
}

/// Distance from each cell of `grid` to the nearest point of `points`.
///
/// Cells are located by their lower corner. Without points every cell
/// gets `+inf`.
pub fn min_distance(grid: Domain, points: Domain, metric: DistanceMetric) -> Result<OperationSpec> {
    let name = match metric {
        DistanceMetric::Euclidean => "GlobalMinDistance",
        DistanceMetric::Manhattan => "GlobalMinMHDistance",
    };
    distance_operation(name, grid, points, metric, false)
}

/// Index (in the point list) of the nearest point, -1 without points.
///
/// The first point wins ties.
pub fn min_distance_index(grid: Domain, points: Domain, metric: DistanceMetric) -> Result<OperationSpec> {
    let name = match metric {
        DistanceMetric::Euclidean => "GlobalMinDistanceIndex",
        DistanceMetric::Manhattan => "GlobalMinMHDistanceIndex",
    };
    distance_operation(name, grid, points, metric, true)
}

/// Sum of all valid cells of a layer, as a scalar result
pub fn global_sum(layer: Domain) -> Result<OperationSpec> {
    OperationSpec::builder("GlobalSum", OpClass::Global)
        .layer(layer)
        .bulk_fn(|group| {
            group.output().copy_region_from(group.input(0)?)?;
            Ok(())
        })
        .scalar_output(|domain| {
            let view = domain
                .grid()
                .ok_or_else(|| Error::Operation(format!("'{}' is not a grid", domain.title())))?;
            Ok(view.iter().filter(|&v| !domain.is_nodata(v)).sum())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gridwork_core::extent::Extent;
    use gridwork_parallel::{EngineConfig, run};
    use ndarray::Array2;

    fn grid(rows: usize, cols: usize) -> Domain {
        Domain::from_array("grid", 0.0, 0.0, &Array2::zeros((rows, cols)), 1.0, None).unwrap()
    }

    fn points(list: Vec<Point>) -> Domain {
        // Deliberately not aligned with the grid
        let extent = Extent::new(-5.0, -5.0, 20.0, 20.0).unwrap();
        Domain::from_points("pts", extent, list, None).unwrap()
    }

    fn compute(spec: &OperationSpec) -> Array2<f64> {
        let config = EngineConfig::pool(3).with_granularity(2);
        run(spec, &config).unwrap().into_domain().unwrap().to_array().unwrap()
    }

    #[test]
    fn test_min_distance_euclidean() {
        let pts = points(vec![Point::new(0.0, 0.0, 1.0), Point::new(4.0, 5.0, 2.0)]);
        let out = compute(&min_distance(grid(6, 6), pts, DistanceMetric::Euclidean).unwrap());
        assert_relative_eq!(out[(0, 0)], 0.0);
        assert_relative_eq!(out[(1, 1)], std::f64::consts::SQRT_2, epsilon = 1e-12);
        // Cell (5, 4) has its corner at (y=5, x=4)
        assert_relative_eq!(out[(5, 4)], 0.0);
        assert_relative_eq!(out[(3, 3)], (4.0f64 + 1.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_min_distance_manhattan_and_index() {
        let pts = points(vec![Point::new(0.0, 0.0, 1.0), Point::new(4.0, 5.0, 2.0)]);
        let dist = compute(&min_distance(grid(6, 6), pts.clone(), DistanceMetric::Manhattan).unwrap());
        assert_eq!(dist[(1, 1)], 2.0);
        let index = compute(&min_distance_index(grid(6, 6), pts, DistanceMetric::Manhattan).unwrap());
        assert_eq!(index[(0, 1)], 0.0);
        assert_eq!(index[(5, 5)], 1.0);
    }

    #[test]
    fn test_no_points() {
        let dist = compute(&min_distance(grid(3, 3), points(vec![]), DistanceMetric::Euclidean).unwrap());
        assert!(dist.iter().all(|v| v.is_infinite()));
        let index = compute(&min_distance_index(grid(3, 3), points(vec![]), DistanceMetric::Euclidean).unwrap());
        assert!(index.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_global_sum_scalar() {
        let mut data = Array2::from_shape_fn((7, 3), |(r, c)| (r * 3 + c) as f64);
        data[(0, 0)] = -1.0;
        let layer = Domain::from_array("v", 0.0, 0.0, &data, 1.0, Some(-1.0)).unwrap();
        let config = EngineConfig::pool(2).with_granularity(2);
        let output = run(&global_sum(layer).unwrap(), &config).unwrap();
        assert_relative_eq!(output.scalar().unwrap(), (0..21).sum::<usize>() as f64);
    }

    #[test]
    fn test_requires_point_layer() {
        assert!(min_distance(grid(2, 2), grid(2, 2), DistanceMetric::Euclidean).is_err());
    }
}
