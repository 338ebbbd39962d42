//! Partitions: one tile of a domain, aware of where it sits in its parent

use crate::error::{Error, Result};
use crate::extent::SpatialExtent;
use crate::raster::{CellWindow, GridView, SharedGrid};
use std::ops::Deref;
use std::sync::Weak;
use std::sync::atomic::{AtomicI64, Ordering};

/// Non-owning link from a partition back to the domain it was cut from.
///
/// Only used to read neighbouring cells of the shared grid; the partition
/// never keeps its parent alive.
#[derive(Debug, Clone)]
pub struct ParentRef {
    title: String,
    shape: Option<(usize, usize)>,
    grid: Option<Weak<SharedGrid>>,
}

impl ParentRef {
    pub fn new(title: impl Into<String>, shape: Option<(usize, usize)>, grid: Option<Weak<SharedGrid>>) -> Self {
        Self {
            title: title.into(),
            shape,
            grid,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// Current value of a parent cell, `None` if the parent is gone or the cell is outside it
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        let grid = self.grid.as_ref()?.upgrade()?;
        grid.get(row, col).ok()
    }
}

/// Neighbourhood of one cell, clipped to the data a partition holds
#[derive(Debug, Clone)]
pub struct FocalWindow {
    pub view: GridView,
    /// Position of the centre cell inside `view`
    pub center: (usize, usize),
}

impl FocalWindow {
    /// Whether the window is the full `(2r+1) x (2r+1)` square
    pub fn is_complete(&self, radius: usize) -> bool {
        self.view.shape() == (2 * radius + 1, 2 * radius + 1)
    }
}

/// One tile of a domain.
///
/// Cell coordinates taken by `value_at`/`set_at` are absolute, i.e. in the
/// parent domain's index space; the partition translates them through its
/// row/col offset.
#[derive(Debug)]
pub struct Partition {
    title: String,
    extent: SpatialExtent,
    row_offset: usize,
    col_offset: usize,
    core: CellWindow,
    parent: Option<ParentRef>,
    convergence: AtomicI64,
}

impl Partition {
    /// Wrap a tile extent. `row_offset`/`col_offset` locate its data in the parent.
    pub fn new(
        title: impl Into<String>,
        extent: SpatialExtent,
        row_offset: usize,
        col_offset: usize,
        core: CellWindow,
        parent: Option<ParentRef>,
    ) -> Self {
        Self {
            title: title.into(),
            extent,
            row_offset,
            col_offset,
            core,
            parent,
            convergence: AtomicI64::new(0),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn spatial(&self) -> &SpatialExtent {
        &self.extent
    }

    pub fn row_offset(&self) -> usize {
        self.row_offset
    }

    pub fn col_offset(&self) -> usize {
        self.col_offset
    }

    /// Unbuffered cells of the tile, in parent index space
    pub fn core(&self) -> CellWindow {
        self.core
    }

    /// Cells held by the partition (halo included), in parent index space
    pub fn data_window(&self) -> CellWindow {
        let (rows, cols) = self.extent.shape().unwrap_or((self.core.rows, self.core.cols));
        CellWindow::new(self.row_offset, self.col_offset, rows, cols)
    }

    pub fn parent(&self) -> Option<&ParentRef> {
        self.parent.as_ref()
    }

    fn grid_view(&self) -> Result<&GridView> {
        self.extent
            .grid()
            .ok_or_else(|| Error::NotSupported(format!("cell access on non-grid partition '{}'", self.title)))
    }

    fn local(&self, row: usize, col: usize) -> Result<(usize, usize)> {
        let window = self.data_window();
        if !window.contains(row, col) {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: window.row_end(),
                cols: window.col_end(),
            });
        }
        Ok((row - self.row_offset, col - self.col_offset))
    }

    /// Value at absolute (row, col)
    pub fn value_at(&self, row: usize, col: usize) -> Result<f64> {
        let (r, c) = self.local(row, col)?;
        self.grid_view()?.get(r, c)
    }

    /// Write at absolute (row, col)
    pub fn set_at(&self, row: usize, col: usize, value: f64) -> Result<()> {
        let (r, c) = self.local(row, col)?;
        self.grid_view()?.set(r, c, value)
    }

    /// Read an absolute cell of the parent domain, possibly owned by another tile.
    ///
    /// The read is relaxed: a concurrently written neighbour may be seen
    /// before or after its latest update.
    pub fn parent_value(&self, row: usize, col: usize) -> Option<f64> {
        self.parent.as_ref()?.value(row, col)
    }

    /// Square neighbourhood of `radius` cells around absolute (row, col),
    /// clipped to the partition's data.
    pub fn window_around(&self, row: usize, col: usize, radius: usize) -> Result<FocalWindow> {
        let (r, c) = self.local(row, col)?;
        let view = self.grid_view()?;
        let r0 = r.saturating_sub(radius);
        let c0 = c.saturating_sub(radius);
        let r1 = (r + radius + 1).min(view.rows());
        let c1 = (c + radius + 1).min(view.cols());
        Ok(FocalWindow {
            view: view.slice(CellWindow::new(r0, c0, r1 - r0, c1 - c0))?,
            center: (r - r0, c - c0),
        })
    }

    /// Copy the cells both partitions hold from `other` into `self`.
    ///
    /// Returns the number of cells copied; disjoint partitions copy nothing.
    pub fn copy_region_from(&self, other: &Partition) -> Result<usize> {
        let Some(overlap) = self.data_window().intersect(&other.data_window()) else {
            return Ok(0);
        };
        for (row, col) in overlap.cells() {
            self.set_at(row, col, other.value_at(row, col)?)?;
        }
        Ok(overlap.len())
    }

    /// Signed convergence counter of the iterative protocol
    pub fn convergence(&self) -> i64 {
        self.convergence.load(Ordering::Acquire)
    }

    pub fn set_convergence(&self, value: i64) {
        self.convergence.store(value, Ordering::Release);
    }
}

impl Deref for Partition {
    type Target = SpatialExtent;

    fn deref(&self) -> &SpatialExtent {
        &self.extent
    }
}
