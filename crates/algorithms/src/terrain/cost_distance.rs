//! Cost-distance analysis
//!
//! Computes the accumulated cost of traveling from source cells across a cost
//! surface using Dijkstra's algorithm with 8-connectivity.
//!
//! Each tile runs its own Dijkstra and is re-queued until it stops
//! improving. Distances cross tile boundaries through the one-cell ring
//! around each tile: every round reads the ring from the shared output
//! grid and restarts the search from ring cells whose distance dropped
//! since the tile last looked.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, PoisonError};

use gridwork_core::raster::steps::MOVES;
use gridwork_core::{CellWindow, Domain, Error, Partition, Result};
use gridwork_parallel::{IterativeKernel, OpClass, OperationSpec, Round, TaskGroup};
use tracing::trace;

/// Parameters for cost distance
#[derive(Debug, Clone, Default)]
pub struct CostDistanceParams {
    /// Extra cost value marking impassable cells.
    /// NaN, negative and nodata costs are always impassable.
    pub barrier: Option<f64>,
}

/// State in the priority queue (min-heap via Reverse ordering).
#[derive(Debug, Clone, PartialEq)]
struct State {
    cost: f64,
    row: usize,
    col: usize,
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other.cost.total_cmp(&self.cost)
    }
}

/// Iterative cost-distance kernel.
///
/// Source cells are cells of the first input equal to 0; the second input
/// holds the cost of crossing each cell per map unit.
#[derive(Debug, Default)]
pub struct CostDistance {
    params: CostDistanceParams,
    /// Ring distances last seen by each task group
    rings: Mutex<HashMap<usize, Vec<f64>>>,
}

impl CostDistance {
    pub fn new(params: CostDistanceParams) -> Self {
        Self {
            params,
            rings: Mutex::new(HashMap::new()),
        }
    }

    fn passable(&self, costs: &Partition, value: f64) -> bool {
        !costs.is_nodata(value) && value >= 0.0 && self.params.barrier != Some(value)
    }
}

/// Cells of `outer` that are not in `core`, row-major
fn ring_cells(outer: CellWindow, core: CellWindow) -> Vec<(usize, usize)> {
    outer.cells().filter(|&(r, c)| !core.contains(r, c)).collect()
}

impl IterativeKernel for CostDistance {
    fn step(&self, group: &TaskGroup, round: Round) -> Result<usize> {
        let output = group.output();
        let sources = group.input(0)?;
        let costs = group.input(1)?;
        let cell_size = costs
            .cell_size()
            .ok_or_else(|| Error::Operation(format!("'{}' has no cell size", costs.title())))?;
        let core = output.core();
        let ring = ring_cells(costs.data_window(), core);
        let mut heap = BinaryHeap::new();

        if round == Round::Initial {
            for (r, c) in core.cells() {
                let seed = sources.value_at(r, c)?;
                if seed == 0.0 && !sources.is_nodata(seed) && self.passable(costs, costs.value_at(r, c)?) {
                    output.set_at(r, c, 0.0)?;
                    heap.push(State { cost: 0.0, row: r, col: c });
                }
            }
        }

        // Restart from ring cells a neighbouring tile improved
        {
            let mut rings = self.rings.lock().unwrap_or_else(PoisonError::into_inner);
            if round == Round::Initial {
                rings.insert(group.index(), vec![f64::INFINITY; ring.len()]);
            }
            let seen = rings
                .entry(group.index())
                .or_insert_with(|| vec![f64::INFINITY; ring.len()]);
            for (last, &(r, c)) in seen.iter_mut().zip(&ring) {
                if let Some(d) = output.parent_value(r, c)
                    && d < *last
                {
                    *last = d;
                    heap.push(State { cost: d, row: r, col: c });
                }
            }
        }

        let mut improved = 0;
        while let Some(State { cost, row, col }) = heap.pop() {
            // Skip if we already found a better path
            if core.contains(row, col) && cost > output.value_at(row, col)? {
                continue;
            }
            let cost_here = costs.value_at(row, col)?;
            if !self.passable(costs, cost_here) {
                continue;
            }

            for &(dr, dc, step_dist) in &MOVES {
                let (Some(nr), Some(nc)) = (row.checked_add_signed(dr), col.checked_add_signed(dc)) else {
                    continue;
                };
                if !core.contains(nr, nc) {
                    continue;
                }
                let cost_neighbor = costs.value_at(nr, nc)?;
                if !self.passable(costs, cost_neighbor) {
                    continue;
                }

                // Average cost * distance
                let new_cost = cost + (cost_here + cost_neighbor) / 2.0 * step_dist * cell_size;
                if new_cost < output.value_at(nr, nc)? {
                    output.set_at(nr, nc, new_cost)?;
                    improved += 1;
                    heap.push(State { cost: new_cost, row: nr, col: nc });
                }
            }
        }

        trace!("Task group {}: {} cells improved ({:?})", group.index(), improved, round);
        Ok(improved)
    }
}

/// Accumulated cost distance from the zero cells of `sources` across `costs`.
///
/// The cost to traverse between two cells is the average of their cost
/// values multiplied by the distance between their centres (one cell size
/// for cardinal moves, √2 cell sizes for diagonal ones). Source cells get
/// 0; cells no source can reach stay at `+inf`.
pub fn cost_distance(sources: Domain, costs: Domain, params: CostDistanceParams) -> Result<OperationSpec> {
    if sources.shape() != costs.shape() {
        let (er, ec) = sources.shape().unwrap_or_default();
        let (ar, ac) = costs.shape().unwrap_or_default();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    let cell_size = costs
        .cell_size()
        .ok_or_else(|| Error::invalid_input(format!("'{}' has no cell size", costs.title()), "none"))?;

    OperationSpec::builder("CostDistance", OpClass::Focal)
        .layers([sources, costs])
        .buffer_size(cell_size)
        .initial_value(f64::INFINITY)
        .iterative(CostDistance::new(params))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gridwork_parallel::{EngineConfig, run};
    use ndarray::Array2;
    use std::f64::consts::SQRT_2;

    fn domain(title: &str, data: Array2<f64>) -> Domain {
        Domain::from_array(title, 0.0, 0.0, &data, 1.0, None).unwrap()
    }

    fn sources(rows: usize, cols: usize, seeds: &[(usize, usize)]) -> Domain {
        let mut data = Array2::from_elem((rows, cols), 1.0);
        for &s in seeds {
            data[s] = 0.0;
        }
        domain("sources", data)
    }

    fn compute(sources: Domain, costs: Domain, params: CostDistanceParams, granularity: usize) -> Array2<f64> {
        let config = EngineConfig::serial().with_granularity(granularity);
        run(&cost_distance(sources, costs, params).unwrap(), &config)
            .unwrap()
            .into_domain()
            .unwrap()
            .to_array()
            .unwrap()
    }

    #[test]
    fn test_cost_distance_basic() {
        let out = compute(
            sources(10, 10, &[(0, 0)]),
            domain("costs", Array2::ones((10, 10))),
            CostDistanceParams::default(),
            10,
        );
        assert_relative_eq!(out[(0, 0)], 0.0);
        assert_relative_eq!(out[(0, 1)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(out[(1, 1)], SQRT_2, epsilon = 1e-10);
        assert_relative_eq!(out[(9, 9)], 9.0 * SQRT_2, epsilon = 1e-10);
    }

    #[test]
    fn test_propagates_across_tiles() {
        let costs = domain("costs", Array2::from_elem((9, 4), 2.0));
        let out = compute(sources(9, 4, &[(8, 0)]), costs, CostDistanceParams::default(), 2);
        // Straight down column 0: 8 cardinal steps of cost 2
        assert_relative_eq!(out[(0, 0)], 16.0, epsilon = 1e-10);
        assert_relative_eq!(out[(5, 3)], 3.0 * 2.0 * SQRT_2, epsilon = 1e-10);
    }

    #[test]
    fn test_cost_distance_barrier() {
        let mut cost = Array2::ones((5, 5));
        // Create a barrier wall
        for row in 0..5 {
            cost[(row, 2)] = f64::NAN;
        }
        let out = compute(sources(5, 5, &[(2, 0)]), domain("costs", cost), CostDistanceParams::default(), 2);
        assert!(out[(2, 4)].is_infinite(), "Cell beyond barrier should be unreachable, got {}", out[(2, 4)]);
        assert!(out[(2, 2)].is_infinite());
        assert_relative_eq!(out[(2, 1)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_barrier_value() {
        let mut cost = Array2::ones((3, 3));
        cost[(0, 1)] = 99.0;
        cost[(1, 1)] = 99.0;
        cost[(2, 1)] = 99.0;
        let params = CostDistanceParams { barrier: Some(99.0) };
        let out = compute(sources(3, 3, &[(1, 0)]), domain("costs", cost), params, 1);
        assert!(out[(1, 2)].is_infinite());
    }

    #[test]
    fn test_no_sources_leaves_infinity() {
        let out = compute(sources(4, 4, &[]), domain("costs", Array2::ones((4, 4))), CostDistanceParams::default(), 2);
        assert!(out.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn test_shape_mismatch() {
        let result = cost_distance(sources(4, 4, &[]), domain("costs", Array2::ones((4, 5))), CostDistanceParams::default());
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_ring_cells() {
        let ring = ring_cells(CellWindow::new(1, 0, 4, 3), CellWindow::new(2, 0, 2, 3));
        assert_eq!(ring, vec![(1, 0), (1, 1), (1, 2), (4, 0), (4, 1), (4, 2)]);
    }
}
