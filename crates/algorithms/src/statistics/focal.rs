//! Focal (moving window) statistics
//!
//! Computes statistics within a moving window centered on each cell.
//! Supports: Mean, Sum, Min, Max, Majority.
//!
//! The window is clipped to the data a partition holds; its halo is sized
//! so that interior tile boundaries see the same neighbourhood as an
//! undecomposed run.

use gridwork_core::{Domain, Error, Neighborhood, Partition, Result};
use gridwork_parallel::{CellContext, OpClass, OperationSpec, TaskGroup};
use ndarray::{Array2, s};
use std::collections::HashMap;

/// Available focal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocalStatistic {
    /// Arithmetic mean
    Mean,
    /// Sum of values
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Value held by more than half of the window, if any
    Majority,
}

impl FocalStatistic {
    fn operation_name(&self) -> &'static str {
        match self {
            FocalStatistic::Mean => "FocalMean",
            FocalStatistic::Sum => "FocalSum",
            FocalStatistic::Min => "FocalMinimum",
            FocalStatistic::Max => "FocalMaximum",
            FocalStatistic::Majority => "FocalMajority",
        }
    }
}

impl std::str::FromStr for FocalStatistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(FocalStatistic::Mean),
            "sum" => Ok(FocalStatistic::Sum),
            "min" | "minimum" => Ok(FocalStatistic::Min),
            "max" | "maximum" => Ok(FocalStatistic::Max),
            "majority" => Ok(FocalStatistic::Majority),
            other => Err(Error::InvalidParameter {
                name: "statistic",
                value: other.to_string(),
                reason: "expected mean, sum, min, max or majority".to_string(),
            }),
        }
    }
}

/// Parameters for focal statistics
#[derive(Debug, Clone)]
pub struct FocalParams {
    /// Window radius in cells (window size = 2*radius + 1)
    pub radius: usize,
    /// Statistic to compute
    pub statistic: FocalStatistic,
    /// Whether to use circular window (default: false = square)
    pub circular: bool,
}

impl Default for FocalParams {
    fn default() -> Self {
        Self {
            radius: 1,
            statistic: FocalStatistic::Mean,
            circular: false,
        }
    }
}

impl FocalParams {
    fn neighborhood(&self) -> Neighborhood {
        if self.circular {
            Neighborhood::Circle(self.radius)
        } else {
            Neighborhood::Square(self.radius)
        }
    }
}

fn require_cell_size(layer: &Domain) -> Result<f64> {
    layer
        .cell_size()
        .ok_or_else(|| Error::invalid_input(format!("'{}' has no cell size", layer.title()), "none"))
}

/// Focal statistics of one layer.
///
/// The operation's buffer is `radius` cells. Nodata cells are skipped;
/// a window without valid cells yields nodata (NaN when the layer has none).
pub fn focal_statistics(layer: Domain, params: FocalParams) -> Result<OperationSpec> {
    if params.radius == 0 {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: "0".into(),
            reason: "focal radius must be > 0".into(),
        });
    }
    let buffer = params.radius as f64 * require_cell_size(&layer)?;
    let offsets = params.neighborhood().offsets();
    let statistic = params.statistic;

    OperationSpec::builder(statistic.operation_name(), OpClass::Focal)
        .layer(layer)
        .buffer_size(buffer)
        .cell_fn(move |ctx| focal_cell(ctx, &offsets, statistic))
        .build()
}

fn focal_cell(ctx: &CellContext<'_>, offsets: &[(isize, isize)], statistic: FocalStatistic) -> Result<f64> {
    let (row, col) = ctx
        .cell()
        .ok_or_else(|| Error::Operation("focal statistics need a grid output".into()))?;
    let input = ctx.input(0)?;
    let window = input.window_around(row, col, ctx.radius)?;
    let (cr, cc) = window.center;

    let mut values = Vec::with_capacity(offsets.len());
    let mut covered = 0;
    for &(dr, dc) in offsets {
        let (Some(r), Some(c)) = (cr.checked_add_signed(dr), cc.checked_add_signed(dc)) else {
            continue;
        };
        if let Some(v) = window.view.value(r, c) {
            covered += 1;
            if !input.is_nodata(v) {
                values.push(v);
            }
        }
    }

    let nodata = ctx.output.nodata().unwrap_or(f64::NAN);
    if values.is_empty() {
        return Ok(nodata);
    }
    Ok(match statistic {
        FocalStatistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
        FocalStatistic::Sum => values.iter().sum(),
        FocalStatistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        FocalStatistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        FocalStatistic::Majority => majority(&values, covered).unwrap_or(ctx.output.nodata().unwrap_or(-1.0)),
    })
}

/// Value occurring in more than half of `covered` cells
fn majority(values: &[f64], covered: usize) -> Option<f64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for &v in values {
        *counts.entry(v.to_bits()).or_default() += 1;
    }
    counts
        .into_iter()
        .find(|&(_, n)| 2 * n > covered)
        .map(|(bits, _)| f64::from_bits(bits))
}

/// Focal mean computed per tile on an ndarray copy of the input partition.
///
/// Produces the same values as [`focal_statistics`] with a square window.
pub fn focal_mean_bulk(layer: Domain, radius: usize) -> Result<OperationSpec> {
    if radius == 0 {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: "0".into(),
            reason: "focal radius must be > 0".into(),
        });
    }
    let buffer = radius as f64 * require_cell_size(&layer)?;
    OperationSpec::builder("FocalMean_np", OpClass::Focal)
        .layer(layer)
        .buffer_size(buffer)
        .bulk_fn(move |group| mean_tile(group, radius))
        .build()
}

fn mean_tile(group: &TaskGroup, radius: usize) -> Result<()> {
    let output = group.output();
    let input: &Partition = group.input(0)?;
    let out_view = output
        .grid()
        .ok_or_else(|| Error::Operation(format!("'{}' is not a grid", output.title())))?;
    let data = input
        .grid()
        .ok_or_else(|| Error::Operation(format!("'{}' is not a grid", input.title())))?
        .to_array();
    let (rows, cols) = data.dim();
    let nodata = output.nodata().unwrap_or(f64::NAN);
    let core = output.core();

    let mut result = Array2::from_elem((core.rows, core.cols), nodata);
    for ((i, j), cell) in result.indexed_iter_mut() {
        let r = core.row + i - input.row_offset();
        let c = core.col + j - input.col_offset();
        let block = data.slice(s![
            r.saturating_sub(radius)..(r + radius + 1).min(rows),
            c.saturating_sub(radius)..(c + radius + 1).min(cols)
        ]);
        let (sum, n) = block
            .iter()
            .filter(|&&v| !input.is_nodata(v))
            .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
        if n > 0 {
            *cell = sum / n as f64;
        }
    }
    out_view.assign(&result)
}
