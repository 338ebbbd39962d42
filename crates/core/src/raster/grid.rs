//! Shared grid storage and windowed views
//!
//! A [`SharedGrid`] is the backing array of a domain. Every cell is an
//! atomically accessed `f64`, so tiles processed on different workers can
//! write their own cells while neighbours read boundary values without a
//! lock and without ever observing a torn value.

use crate::error::{Error, Result};
use crate::raster::CellWindow;
use ndarray::Array2;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-size 2D array of `f64` cells shared between workers.
pub struct SharedGrid {
    cells: Box<[AtomicU64]>,
    rows: usize,
    cols: usize,
}

impl SharedGrid {
    /// Create a grid filled with zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Create a grid filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        let bits = value.to_bits();
        let cells = (0..rows * cols).map(|_| AtomicU64::new(bits)).collect();
        Self { cells, rows, cols }
    }

    /// Copy an ndarray into new shared storage
    pub fn from_array(data: &Array2<f64>) -> Self {
        let (rows, cols) = data.dim();
        let cells = data.iter().map(|v| AtomicU64::new(v.to_bits())).collect();
        Self { cells, rows, cols }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn index(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        let idx = self.index(row, col)?;
        Ok(f64::from_bits(self.cells[idx].load(Ordering::Relaxed)))
    }

    /// Set value at (row, col)
    pub fn set(&self, row: usize, col: usize, value: f64) -> Result<()> {
        let idx = self.index(row, col)?;
        self.cells[idx].store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Snapshot of the whole grid
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| {
            f64::from_bits(self.cells[r * self.cols + c].load(Ordering::Relaxed))
        })
    }
}

impl fmt::Debug for SharedGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedGrid")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

/// A window onto a [`SharedGrid`].
///
/// Views never copy: writes through any view are visible through every
/// other view of the same grid. Indices passed to a view are relative to
/// its window.
#[derive(Debug, Clone)]
pub struct GridView {
    grid: Arc<SharedGrid>,
    window: CellWindow,
}

impl GridView {
    /// View over the whole grid
    pub fn whole(grid: Arc<SharedGrid>) -> Self {
        let window = CellWindow::whole(grid.rows(), grid.cols());
        Self { grid, window }
    }

    /// View over `window` (in grid index space)
    pub fn new(grid: Arc<SharedGrid>, window: CellWindow) -> Result<Self> {
        let full = CellWindow::whole(grid.rows(), grid.cols());
        if !full.contains_window(&window) {
            return Err(Error::IndexOutOfBounds {
                row: window.row_end().saturating_sub(1),
                col: window.col_end().saturating_sub(1),
                rows: grid.rows(),
                cols: grid.cols(),
            });
        }
        Ok(Self { grid, window })
    }

    /// Copy an array into fresh storage and view all of it
    pub fn from_array(data: &Array2<f64>) -> Self {
        Self::whole(Arc::new(SharedGrid::from_array(data)))
    }

    pub fn rows(&self) -> usize {
        self.window.rows
    }

    pub fn cols(&self) -> usize {
        self.window.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.window.rows, self.window.cols)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Window of this view in the backing grid's index space
    pub fn window(&self) -> CellWindow {
        self.window
    }

    /// Backing storage
    pub fn grid(&self) -> &Arc<SharedGrid> {
        &self.grid
    }

    /// Whether both views write to the same storage
    pub fn shares_storage(&self, other: &GridView) -> bool {
        Arc::ptr_eq(&self.grid, &other.grid)
    }

    fn check(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.window.rows || col >= self.window.cols {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.window.rows,
                cols: self.window.cols,
            });
        }
        Ok(())
    }

    /// Get value at (row, col) relative to the view
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.check(row, col)?;
        self.grid.get(self.window.row + row, self.window.col + col)
    }

    /// Set value at (row, col) relative to the view
    pub fn set(&self, row: usize, col: usize, value: f64) -> Result<()> {
        self.check(row, col)?;
        self.grid.set(self.window.row + row, self.window.col + col, value)
    }

    /// Value at (row, col), `None` outside the view
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.get(row, col).ok()
    }

    /// Sub-view; `window` is relative to this view
    pub fn slice(&self, window: CellWindow) -> Result<GridView> {
        let own = CellWindow::whole(self.window.rows, self.window.cols);
        if !own.contains_window(&window) {
            return Err(Error::IndexOutOfBounds {
                row: window.row_end().saturating_sub(1),
                col: window.col_end().saturating_sub(1),
                rows: self.window.rows,
                cols: self.window.cols,
            });
        }
        Ok(GridView {
            grid: Arc::clone(&self.grid),
            window: CellWindow::new(
                self.window.row + window.row,
                self.window.col + window.col,
                window.rows,
                window.cols,
            ),
        })
    }

    /// Copy of the viewed cells
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn(self.shape(), |(r, c)| {
            self.grid
                .get(self.window.row + r, self.window.col + c)
                .unwrap_or(f64::NAN)
        })
    }

    /// Overwrite every viewed cell from an array of the same shape
    pub fn assign(&self, data: &Array2<f64>) -> Result<()> {
        let (ar, ac) = data.dim();
        if (ar, ac) != self.shape() {
            return Err(Error::SizeMismatch {
                er: self.window.rows,
                ec: self.window.cols,
                ar,
                ac,
            });
        }
        for ((r, c), &v) in data.indexed_iter() {
            self.set(r, c, v)?;
        }
        Ok(())
    }

    pub fn fill(&self, value: f64) {
        for (r, c) in self.window.cells() {
            // cells() stays inside the window, which lies inside the grid
            let _ = self.grid.set(r, c, value);
        }
    }

    /// Values in row-major order
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.window
            .cells()
            .map(move |(r, c)| self.grid.get(r, c).unwrap_or(f64::NAN))
    }

    /// Basic statistics (min, max, mean, count of valid cells)
    ///
    /// NaN and `nodata` cells are not counted as valid.
    pub fn statistics(&self, nodata: Option<f64>) -> GridStatistics {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for value in self.iter() {
            if value.is_nan() || nodata == Some(value) {
                continue;
            }
            min = Some(min.map_or(value, |m| m.min(value)));
            max = Some(max.map_or(value, |m| m.max(value)));
            sum += value;
            count += 1;
        }

        GridStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a grid view
#[derive(Debug, Clone)]
pub struct GridStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}
