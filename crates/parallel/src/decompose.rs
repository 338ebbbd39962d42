//! Decomposition of domains into row or column strips with clipped halos

use gridwork_core::extent::{BufferedExtent, Extent};
use gridwork_core::{CellWindow, Domain, Error, Result, SpatialExtent};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Tolerance applied before rounding a buffer up to whole cells
const HALO_TOLERANCE: f64 = 1e-9;

/// Halo size of an operation, in map units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Buffer {
    Finite(f64),
    /// Every tile sees the entire domain (zonal and global operations)
    WholeDomain,
}

impl Buffer {
    pub const NONE: Buffer = Buffer::Finite(0.0);

    /// Negative sizes are the "infinite" sentinel
    pub fn from_map_units(size: f64) -> Self {
        if size < 0.0 {
            Buffer::WholeDomain
        } else {
            Buffer::Finite(size)
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Buffer::Finite(b) if *b == 0.0)
    }

    /// Halo width in cells along an axis of `extent_cells` cells
    pub fn halo_cells(&self, cell_size: f64, extent_cells: usize) -> usize {
        match self {
            Buffer::Finite(b) if *b > 0.0 => ((b / cell_size) - HALO_TOLERANCE).ceil().max(0.0) as usize,
            Buffer::Finite(_) => 0,
            Buffer::WholeDomain => extent_cells,
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::NONE
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Buffer::Finite(b) => write!(f, "{}", b),
            Buffer::WholeDomain => write!(f, "whole domain"),
        }
    }
}

/// One strip along the decomposed axis: core range and clipped halo range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strip {
    pub start: usize,
    pub len: usize,
    pub halo_start: usize,
    pub halo_len: usize,
}

impl Strip {
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn halo_end(&self) -> usize {
        self.halo_start + self.halo_len
    }
}

/// Iterator over the strips covering `total` cells in steps of `granularity`
#[derive(Debug, Clone)]
pub struct StripIterator {
    total: usize,
    granularity: usize,
    halo: usize,
    current: usize,
}

impl StripIterator {
    /// `granularity` must be at least one
    pub fn new(total: usize, granularity: usize, halo: usize) -> Self {
        Self {
            total,
            granularity: granularity.max(1),
            halo,
            current: 0,
        }
    }

    /// Number of strips: `ceil(total / granularity)`
    pub fn count_for(total: usize, granularity: usize) -> usize {
        total.div_ceil(granularity.max(1))
    }
}

impl Iterator for StripIterator {
    type Item = Strip;

    fn next(&mut self) -> Option<Strip> {
        if self.current >= self.total {
            return None;
        }
        let start = self.current;
        let end = (start + self.granularity).min(self.total);
        // Clamped sides are not compensated on the opposite side
        let halo_start = start.saturating_sub(self.halo);
        let halo_end = end.saturating_add(self.halo).min(self.total);
        self.current = end;
        Some(Strip {
            start,
            len: end - start,
            halo_start,
            halo_len: halo_end - halo_start,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Rows,
    Columns,
}

/// Signature of a user-supplied decomposition
pub type DecomposeFn = dyn Fn(&Domain, Buffer, usize) -> Result<Vec<SpatialExtent>> + Send + Sync;

/// Strategy used to cut every layer of an operation into tiles
#[derive(Clone, Default)]
pub enum Decomposition {
    #[default]
    Row,
    Column,
    Custom(Arc<DecomposeFn>),
}

impl Decomposition {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Domain, Buffer, usize) -> Result<Vec<SpatialExtent>> + Send + Sync + 'static,
    {
        Decomposition::Custom(Arc::new(f))
    }

    pub fn decompose(&self, domain: &Domain, buffer: Buffer, granularity: usize) -> Result<Vec<SpatialExtent>> {
        match self {
            Decomposition::Row => decompose_rows(domain, buffer, granularity),
            Decomposition::Column => decompose_columns(domain, buffer, granularity),
            Decomposition::Custom(f) => f(domain, buffer, granularity),
        }
    }
}

impl fmt::Debug for Decomposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decomposition::Row => write!(f, "Row"),
            Decomposition::Column => write!(f, "Column"),
            Decomposition::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl FromStr for Decomposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "row" | "rows" => Ok(Decomposition::Row),
            "column" | "columns" | "col" => Ok(Decomposition::Column),
            other => Err(Error::InvalidParameter {
                name: "decomposition",
                value: other.to_string(),
                reason: "expected 'row' or 'column'".to_string(),
            }),
        }
    }
}

/// Horizontal strips of `granularity` rows spanning the full width
pub fn decompose_rows(domain: &Domain, buffer: Buffer, granularity: usize) -> Result<Vec<SpatialExtent>> {
    decompose_along(domain, buffer, granularity, Axis::Rows)
}

/// Vertical strips of `granularity` columns spanning the full height
pub fn decompose_columns(domain: &Domain, buffer: Buffer, granularity: usize) -> Result<Vec<SpatialExtent>> {
    decompose_along(domain, buffer, granularity, Axis::Columns)
}

fn decompose_along(domain: &Domain, buffer: Buffer, granularity: usize, axis: Axis) -> Result<Vec<SpatialExtent>> {
    if granularity == 0 {
        return Err(Error::invalid_input("decomposition granularity must be at least 1", granularity));
    }
    if domain.data_kind().is_none() {
        return Err(Error::NotSupported(format!(
            "decomposition of domain '{}' without grid or point data",
            domain.title()
        )));
    }
    let (rows, cols) = domain.shape().ok_or_else(|| {
        Error::AssertionFailed(format!("row/column count of domain '{}' is not set", domain.title()))
    })?;
    let cs = domain
        .cell_size()
        .ok_or_else(|| Error::AssertionFailed(format!("cell size of domain '{}' is not set", domain.title())))?;

    let total = match axis {
        Axis::Rows => rows,
        Axis::Columns => cols,
    };
    let halo = buffer.halo_cells(cs, total);

    StripIterator::new(total, granularity, halo)
        .map(|strip| {
            let (core, padded) = match axis {
                Axis::Rows => (
                    CellWindow::new(strip.start, 0, strip.len, cols),
                    CellWindow::new(strip.halo_start, 0, strip.halo_len, cols),
                ),
                Axis::Columns => (
                    CellWindow::new(0, strip.start, rows, strip.len),
                    CellWindow::new(0, strip.halo_start, rows, strip.halo_len),
                ),
            };
            let geometry = |w: CellWindow| match axis {
                Axis::Rows => Extent::new(domain.y() + w.row as f64 * cs, domain.x(), w.rows as f64 * cs, domain.width()),
                Axis::Columns => Extent::new(domain.y(), domain.x() + w.col as f64 * cs, domain.height(), w.cols as f64 * cs),
            };
            Ok(SpatialExtent::tile(
                geometry(core)?,
                cs,
                domain.nodata(),
                core,
                BufferedExtent {
                    extent: geometry(padded)?,
                    window: padded,
                },
            ))
        })
        .collect()
}
