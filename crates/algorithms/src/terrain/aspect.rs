//! Aspect calculation from DEMs
//!
//! Calculates the direction of the steepest slope using the Horn (1981) method.

use super::horn_gradient;
use gridwork_core::{Domain, Error, Result};
use gridwork_parallel::{OpClass, OperationSpec};
use std::f64::consts::PI;

/// Threshold for considering a surface flat
const FLAT_THRESHOLD: f64 = 1e-10;

/// Output format for aspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectOutput {
    /// Degrees (0-360, 0=North, clockwise)
    #[default]
    Degrees,
    /// Radians (0-2π)
    Radians,
    /// Compass direction (N, NE, E, SE, S, SW, W, NW) as 1-8
    Compass,
}

/// Compass bearing of the steepest descent, in radians clockwise from north.
///
/// `None` for flat cells.
pub(crate) fn descent_bearing(dz_dx: f64, dz_dy: f64) -> Option<f64> {
    if dz_dx.abs() < FLAT_THRESHOLD && dz_dy.abs() < FLAT_THRESHOLD {
        return None;
    }
    // Descent direction in (east, north) space is the negated gradient
    let bearing = (-dz_dx).atan2(-dz_dy);
    Some(if bearing < 0.0 { bearing + 2.0 * PI } else { bearing })
}

fn compass(deg: f64) -> f64 {
    match deg {
        d if !(22.5..337.5).contains(&d) => 1.0,
        d if d < 67.5 => 2.0,
        d if d < 112.5 => 3.0,
        d if d < 157.5 => 4.0,
        d if d < 202.5 => 5.0,
        d if d < 247.5 => 6.0,
        d if d < 292.5 => 7.0,
        _ => 8.0,
    }
}

/// Aspect of a DEM.
///
/// Aspect is measured clockwise from north:
/// - 0° (or 360°) = North
/// - 90° = East
/// - 180° = South
/// - 270° = West
///
/// Flat cells get -1. Cells whose 3x3 window leaves the domain or holds
/// nodata get the DEM's nodata value (NaN without one).
pub fn aspect(dem: Domain, output_format: AspectOutput) -> Result<OperationSpec> {
    let cell_size = dem
        .cell_size()
        .ok_or_else(|| Error::invalid_input(format!("'{}' has no cell size", dem.title()), "none"))?;

    OperationSpec::builder("FocalAspect", OpClass::Focal)
        .layer(dem)
        .buffer_size(cell_size)
        .cell_fn(move |ctx| {
            let Some((dz_dx, dz_dy)) = horn_gradient(ctx)? else {
                return Ok(ctx.output.nodata().unwrap_or(f64::NAN));
            };
            let Some(bearing) = descent_bearing(dz_dx, dz_dy) else {
                return Ok(-1.0);
            };
            Ok(match output_format {
                AspectOutput::Degrees => bearing.to_degrees(),
                AspectOutput::Radians => bearing,
                AspectOutput::Compass => compass(bearing.to_degrees()),
            })
        })
        .build()
}
