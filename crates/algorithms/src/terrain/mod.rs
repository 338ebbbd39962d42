//! Terrain analysis operations
//!
//! - Aspect: direction of steepest descent
//! - Hillshade: shaded relief visualization
//! - Cost distance: accumulated travel cost from source cells, computed
//!   iteratively across tiles

mod aspect;
mod cost_distance;
mod hillshade;

pub use aspect::{AspectOutput, aspect};
pub use cost_distance::{CostDistance, CostDistanceParams, cost_distance};
pub use hillshade::{HillshadeParams, hillshade};

use gridwork_core::{Error, Result};
use gridwork_parallel::CellContext;

/// Horn (1981) gradients of the 3x3 window around the target cell.
///
/// Returns `None` when the window is clipped by the domain edge or holds
/// nodata. Rows grow northward, so `dz_dy` is the north gradient.
pub(crate) fn horn_gradient(ctx: &CellContext<'_>) -> Result<Option<(f64, f64)>> {
    let (row, col) = ctx
        .cell()
        .ok_or_else(|| Error::Operation("terrain operations need a grid output".into()))?;
    let input = ctx.input(0)?;
    let cell_size = input
        .cell_size()
        .ok_or_else(|| Error::Operation(format!("'{}' has no cell size", input.title())))?;
    let window = input.window_around(row, col, 1)?;
    if !window.is_complete(1) {
        return Ok(None);
    }

    // w[i][j]: i runs south to north, j west to east
    let mut w = [[0.0; 3]; 3];
    for (i, line) in w.iter_mut().enumerate() {
        for (j, cell) in line.iter_mut().enumerate() {
            let v = window.view.get(i, j)?;
            if input.is_nodata(v) {
                return Ok(None);
            }
            *cell = v;
        }
    }

    let eight_cell_size = 8.0 * cell_size;
    let dz_dx = ((w[0][2] + 2.0 * w[1][2] + w[2][2]) - (w[0][0] + 2.0 * w[1][0] + w[2][0])) / eight_cell_size;
    let dz_dy = ((w[2][0] + 2.0 * w[2][1] + w[2][2]) - (w[0][0] + 2.0 * w[0][1] + w[0][2])) / eight_cell_size;
    Ok(Some((dz_dx, dz_dy)))
}
