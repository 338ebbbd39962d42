//! Spatial extents: rectangles in map space plus their backing data
//!
//! Geometry follows the grid convention used throughout the engine: row
//! `r` of a grid whose extent starts at `y` covers `[y + r*cs, y + (r+1)*cs)`
//! and column `c` covers `[x + c*cs, x + (c+1)*cs)`.

use crate::error::{Error, Result};
use crate::point::{Point, PointList};
use crate::raster::{CellWindow, GridView};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Relative tolerance when checking cell counts against map size
const SIZE_TOLERANCE: f64 = 1e-9;

/// Rectangle `(y, x, h, w)` in map units; height and width are positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub y: f64,
    pub x: f64,
    pub h: f64,
    pub w: f64,
}

impl Extent {
    pub fn new(y: f64, x: f64, h: f64, w: f64) -> Result<Self> {
        if !h.is_finite() || h <= 0.0 {
            return Err(Error::invalid_input("extent height must be positive", h));
        }
        if !w.is_finite() || w <= 0.0 {
            return Err(Error::invalid_input("extent width must be positive", w));
        }
        Ok(Self { y, x, h, w })
    }

    /// Half-open containment: lower bounds inclusive, upper bounds exclusive
    pub fn contains(&self, y: f64, x: f64) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }

    pub fn y_end(&self) -> f64 {
        self.y + self.h
    }

    pub fn x_end(&self) -> f64 {
        self.x + self.w
    }
}

/// The halo-padded version of an extent: geometry and matching cell window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedExtent {
    pub extent: Extent,
    pub window: CellWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Grid,
    Points,
}

/// Backing data of an extent
#[derive(Debug, Clone)]
pub enum LayerData {
    Grid(GridView),
    Points(PointList),
}

impl LayerData {
    pub fn kind(&self) -> DataKind {
        match self {
            LayerData::Grid(_) => DataKind::Grid,
            LayerData::Points(_) => DataKind::Points,
        }
    }
}

/// A rectangle in map space with an optional halo and backing data.
///
/// The geometry is fixed after construction apart from the informational
/// height/width correction made when data is attached. Data is mutated in
/// place through its views.
#[derive(Debug, Clone)]
pub struct SpatialExtent {
    extent: Extent,
    origin_t: f64,
    duration: f64,
    cell_size: Option<f64>,
    nodata: Option<f64>,
    shape: Option<(usize, usize)>,
    window: Option<CellWindow>,
    buffered: Option<BufferedExtent>,
    data: Option<LayerData>,
}

impl SpatialExtent {
    pub fn new(y: f64, x: f64, h: f64, w: f64) -> Result<Self> {
        Ok(Self::from_extent(Extent::new(y, x, h, w)?))
    }

    pub fn from_extent(extent: Extent) -> Self {
        Self {
            extent,
            origin_t: 0.0,
            duration: 0.0,
            cell_size: None,
            nodata: None,
            shape: None,
            window: None,
            buffered: None,
            data: None,
        }
    }

    // Geometry

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn y(&self) -> f64 {
        self.extent.y
    }

    pub fn x(&self) -> f64 {
        self.extent.x
    }

    pub fn height(&self) -> f64 {
        self.extent.h
    }

    pub fn width(&self) -> f64 {
        self.extent.w
    }

    pub fn origin_t(&self) -> f64 {
        self.origin_t
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_time(&mut self, origin_t: f64, duration: f64) {
        self.origin_t = origin_t;
        self.duration = duration;
    }

    pub fn cell_size(&self) -> Option<f64> {
        self.cell_size
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// Whether `value` is NaN or equals the nodata value
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata == Some(value)
    }

    /// (rows, cols) of the backing data (halo included), once known
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    pub fn rows(&self) -> Option<usize> {
        self.shape.map(|(r, _)| r)
    }

    pub fn cols(&self) -> Option<usize> {
        self.shape.map(|(_, c)| c)
    }

    /// Position of the unbuffered cells in the parent's index space
    pub fn window(&self) -> Option<CellWindow> {
        self.window
    }

    pub fn buffered(&self) -> Option<&BufferedExtent> {
        self.buffered.as_ref()
    }

    /// Geometry covered by the backing data: the buffered extent when set
    pub fn halo_extent(&self) -> Extent {
        self.buffered.map_or(self.extent, |b| b.extent)
    }

    /// Geometry and descriptors of a tile cut from a parent domain.
    ///
    /// Used by decomposers; `window` is the tile core and `buffered` its
    /// halo-padded counterpart, both in the parent's index space.
    pub fn tile(
        extent: Extent,
        cell_size: f64,
        nodata: Option<f64>,
        window: CellWindow,
        buffered: BufferedExtent,
    ) -> Self {
        Self {
            cell_size: Some(cell_size),
            nodata,
            shape: Some((buffered.window.rows, buffered.window.cols)),
            window: Some(window),
            buffered: Some(buffered),
            ..Self::from_extent(extent)
        }
    }

    // Data

    pub fn data(&self) -> Option<&LayerData> {
        self.data.as_ref()
    }

    pub fn data_kind(&self) -> Option<DataKind> {
        self.data.as_ref().map(LayerData::kind)
    }

    pub fn grid(&self) -> Option<&GridView> {
        match &self.data {
            Some(LayerData::Grid(view)) => Some(view),
            _ => None,
        }
    }

    pub fn points(&self) -> Option<&PointList> {
        match &self.data {
            Some(LayerData::Points(list)) => Some(list),
            _ => None,
        }
    }

    /// Copy `data` into new storage and attach it as a grid.
    pub fn set_array(&mut self, data: &Array2<f64>, cell_size: f64, nodata: Option<f64>) -> Result<()> {
        if data.is_empty() {
            return Err(Error::invalid_input("grid data must not be empty", format!("{:?}", data.dim())));
        }
        self.set_grid(GridView::from_array(data), cell_size, nodata)
    }

    /// Attach an existing view as this extent's grid (no copy).
    pub fn set_grid(&mut self, view: GridView, cell_size: f64, nodata: Option<f64>) -> Result<()> {
        check_cell_size(cell_size)?;
        if view.is_empty() {
            return Err(Error::invalid_input("grid data must not be empty", format!("{:?}", view.shape())));
        }
        self.cell_size = Some(cell_size);
        self.nodata = nodata;
        self.data = Some(LayerData::Grid(view));
        self.reset_dimensions();
        Ok(())
    }

    /// Attach a point list. Shape is only known once a cell size is set.
    pub fn set_points(&mut self, points: PointList) {
        self.data = Some(LayerData::Points(points));
        if let Some(cs) = self.cell_size {
            self.shape = Some(point_shape(&self.halo_extent(), cs));
        }
    }

    /// Set the cell size used to decompose point data
    pub fn set_cell_size(&mut self, cell_size: f64) -> Result<()> {
        check_cell_size(cell_size)?;
        self.cell_size = Some(cell_size);
        match self.data_kind() {
            Some(DataKind::Grid) => self.reset_dimensions(),
            _ => self.shape = Some(point_shape(&self.halo_extent(), cell_size)),
        }
        Ok(())
    }

    /// Derive rows/cols from the grid and keep height/width consistent with them.
    fn reset_dimensions(&mut self) {
        let (Some(view), Some(cs)) = (self.grid(), self.cell_size) else {
            return;
        };
        let (rows, cols) = view.shape();
        self.shape = Some((rows, cols));

        let h = rows as f64 * cs;
        let w = cols as f64 * cs;
        let target = match self.buffered.as_mut() {
            Some(b) => &mut b.extent,
            None => &mut self.extent,
        };
        if !approx_eq(target.h, h) {
            info!("Updating height from {} to {}", target.h, h);
            target.h = h;
        }
        if !approx_eq(target.w, w) {
            info!("Updating width from {} to {}", target.w, w);
            target.w = w;
        }
    }

    /// View onto the grid; `window` is relative to the backing data.
    pub fn slice(&self, window: CellWindow) -> Result<GridView> {
        match &self.data {
            Some(LayerData::Grid(view)) => view.slice(window),
            Some(LayerData::Points(_)) => Err(Error::NotSupported("slice of a point list".into())),
            None => Err(Error::NotSupported("slice of an extent without data".into())),
        }
    }

    /// Half-open containment test against the core or the halo geometry
    pub fn is_inside_bounds(&self, point: &Point, use_halo: bool) -> bool {
        let extent = if use_halo { self.halo_extent() } else { self.extent };
        extent.contains(point.y, point.x)
    }

    /// Points of this extent that lie in its core, excluding the halo
    pub fn points_without_halo(&self) -> Result<Vec<Point>> {
        let list = self
            .points()
            .ok_or_else(|| Error::NotSupported("points_without_halo on a grid".into()))?;
        Ok(list
            .read()
            .iter()
            .filter(|p| self.is_inside_bounds(p, false))
            .cloned()
            .collect())
    }

    /// Map coordinates (y, x) of the lower corner of a cell of the backing data
    pub fn cell_to_map(&self, row: usize, col: usize) -> Result<(f64, f64)> {
        let cs = self.require_cell_size()?;
        let origin = self.halo_extent();
        Ok((origin.y + cs * row as f64, origin.x + cs * col as f64))
    }

    /// Cell of the backing data containing map coordinates (y, x)
    pub fn map_to_cell(&self, y: f64, x: f64) -> Option<(usize, usize)> {
        let cs = self.cell_size?;
        let origin = self.halo_extent();
        if !origin.contains(y, x) {
            return None;
        }
        let row = ((y - origin.y) / cs).floor() as usize;
        let col = ((x - origin.x) / cs).floor() as usize;
        match self.grid() {
            Some(view) if row >= view.rows() || col >= view.cols() => None,
            _ => Some((row, col)),
        }
    }

    fn require_cell_size(&self) -> Result<f64> {
        self.cell_size
            .ok_or_else(|| Error::AssertionFailed("cell size is not set".into()))
    }
}

fn check_cell_size(cell_size: f64) -> Result<()> {
    if !cell_size.is_finite() || cell_size <= 0.0 {
        return Err(Error::invalid_input("cell size must be a positive number", cell_size));
    }
    Ok(())
}

fn point_shape(extent: &Extent, cell_size: f64) -> (usize, usize) {
    let rows = (extent.h / cell_size - SIZE_TOLERANCE).ceil().max(1.0) as usize;
    let cols = (extent.w / cell_size - SIZE_TOLERANCE).ceil().max(1.0) as usize;
    (rows, cols)
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= SIZE_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}
