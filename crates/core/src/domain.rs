//! Domains: named datasets covering a whole study area

use crate::error::{Error, Result};
use crate::extent::{DataKind, Extent, LayerData, SpatialExtent};
use crate::partition::{ParentRef, Partition};
use crate::point::{Point, PointList};
use crate::raster::{CellWindow, GridView, SharedGrid};
use ndarray::Array2;
use std::ops::Deref;
use std::sync::Arc;
use tracing::warn;

/// A named layer owning the full dataset of one variable.
#[derive(Debug, Clone)]
pub struct Domain {
    title: String,
    extent: SpatialExtent,
}

impl Domain {
    pub fn new(title: impl Into<String>, extent: SpatialExtent) -> Self {
        Self {
            title: title.into(),
            extent,
        }
    }

    /// Grid domain whose lower corner is (`y`, `x`); size follows the array shape.
    pub fn from_array(
        title: impl Into<String>,
        y: f64,
        x: f64,
        data: &Array2<f64>,
        cell_size: f64,
        nodata: Option<f64>,
    ) -> Result<Self> {
        let (rows, cols) = data.dim();
        let h = rows.max(1) as f64 * cell_size;
        let w = cols.max(1) as f64 * cell_size;
        let mut extent = SpatialExtent::new(y, x, h, w)?;
        extent.set_array(data, cell_size, nodata)?;
        Ok(Self::new(title, extent))
    }

    /// Point domain; a cell size is needed before it can be decomposed.
    pub fn from_points(
        title: impl Into<String>,
        extent: Extent,
        points: Vec<Point>,
        cell_size: Option<f64>,
    ) -> Result<Self> {
        let title = title.into();
        let outside = points.iter().filter(|p| !extent.contains(p.y, p.x)).count();
        if outside > 0 {
            warn!("{} of {} points lie outside the extent of '{}'", outside, points.len(), title);
        }
        let mut spatial = SpatialExtent::from_extent(extent);
        spatial.set_points(PointList::new(points));
        if let Some(cs) = cell_size {
            spatial.set_cell_size(cs)?;
        }
        Ok(Self::new(title, spatial))
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn spatial(&self) -> &SpatialExtent {
        &self.extent
    }

    pub fn spatial_mut(&mut self) -> &mut SpatialExtent {
        &mut self.extent
    }

    fn require_grid(&self) -> Result<&GridView> {
        self.extent
            .grid()
            .ok_or_else(|| Error::NotSupported(format!("domain '{}' does not hold a grid", self.title)))
    }

    /// Copy of the grid values
    pub fn to_array(&self) -> Result<Array2<f64>> {
        Ok(self.require_grid()?.to_array())
    }

    /// Same geometry, zero-filled grid (or a copy of the point list), new title.
    pub fn duplicate(&self, title: impl Into<String>) -> Result<Domain> {
        let mut extent = SpatialExtent::from_extent(self.extent.extent());
        extent.set_time(self.extent.origin_t(), self.extent.duration());
        match self.extent.data() {
            Some(LayerData::Grid(view)) => {
                let cs = self.require_cell_size()?;
                let (rows, cols) = view.shape();
                let zeros = GridView::whole(Arc::new(SharedGrid::zeros(rows, cols)));
                extent.set_grid(zeros, cs, self.extent.nodata())?;
            }
            Some(LayerData::Points(list)) => {
                extent.set_nodata(self.extent.nodata());
                extent.set_points(list.deep_copy());
                if let Some(cs) = self.extent.cell_size() {
                    extent.set_cell_size(cs)?;
                }
            }
            None => {
                return Err(Error::NotSupported(format!("duplicate of domain '{}' without data", self.title)));
            }
        }
        Ok(Domain::new(title, extent))
    }

    fn require_cell_size(&self) -> Result<f64> {
        self.extent
            .cell_size()
            .ok_or_else(|| Error::AssertionFailed(format!("cell size of '{}' is not set", self.title)))
    }

    fn parent_ref(&self) -> ParentRef {
        let grid = self.extent.grid().map(|view| Arc::downgrade(view.grid()));
        ParentRef::new(self.title.clone(), self.extent.shape(), grid)
    }

    /// Cut the domain along tile extents produced by a decomposer.
    ///
    /// Grid tiles are views onto this domain's storage covering the
    /// buffered window. Point tiles are filtered copies holding the points
    /// inside the buffered geometry; a tile whose halo spans the whole
    /// domain receives every point.
    pub fn to_partitions(&self, tiles: &[SpatialExtent]) -> Result<Vec<Partition>> {
        let parent = self.parent_ref();
        let full = self.extent.shape().map(|(r, c)| CellWindow::whole(r, c));
        let mut partitions = Vec::with_capacity(tiles.len());

        for (index, tile) in tiles.iter().enumerate() {
            let (Some(core), Some(buffered)) = (tile.window(), tile.buffered()) else {
                return Err(Error::AssertionFailed(format!(
                    "tile {} of '{}' has no cell window",
                    index, self.title
                )));
            };
            let data_window = buffered.window;
            let mut extent = tile.clone();
            extent.set_time(self.extent.origin_t(), self.extent.duration());

            match self.extent.data_kind() {
                Some(DataKind::Grid) => {
                    let cs = self.require_cell_size()?;
                    let view = self.extent.slice(data_window)?;
                    extent.set_grid(view, cs, self.extent.nodata())?;
                }
                Some(DataKind::Points) => {
                    let list = self.extent.points().map(PointList::snapshot).unwrap_or_default();
                    let points = if full == Some(data_window) {
                        list
                    } else {
                        list.into_iter().filter(|p| tile.is_inside_bounds(p, true)).collect()
                    };
                    extent.set_points(PointList::new(points));
                }
                None => {
                    return Err(Error::NotSupported(format!("partitioning domain '{}' without data", self.title)));
                }
            }

            partitions.push(Partition::new(
                format!("{} partition {}", self.title, index),
                extent,
                data_window.row,
                data_window.col,
                core,
                Some(parent.clone()),
            ));
        }
        Ok(partitions)
    }
}

impl Deref for Domain {
    type Target = SpatialExtent;

    fn deref(&self) -> &SpatialExtent {
        &self.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::BufferedExtent;

    fn row_tile(domain: &Domain, core: CellWindow, data: CellWindow) -> SpatialExtent {
        let cs = domain.cell_size().unwrap();
        let geometry = |w: CellWindow| {
            Extent::new(domain.y() + w.row as f64 * cs, domain.x(), w.rows as f64 * cs, domain.width()).unwrap()
        };
        SpatialExtent::tile(
            geometry(core),
            cs,
            domain.nodata(),
            core,
            BufferedExtent { extent: geometry(data), window: data },
        )
    }

    #[test]
    fn test_duplicate_is_zeroed_copy() {
        let ones = Array2::from_elem((3, 4), 1.0);
        let domain = Domain::from_array("ones", 10.0, 20.0, &ones, 2.0, Some(-1.0)).unwrap();
        let dup = domain.duplicate("copy").unwrap();
        assert_eq!(dup.title(), "copy");
        assert_eq!(dup.shape(), Some((3, 4)));
        assert_eq!(dup.cell_size(), Some(2.0));
        assert_eq!(dup.nodata(), Some(-1.0));
        assert_eq!(dup.extent(), domain.extent());
        assert!(dup.to_array().unwrap().iter().all(|&v| v == 0.0));
        assert!(!dup.grid().unwrap().shares_storage(domain.grid().unwrap()));
    }

    #[test]
    fn test_grid_partitions_are_views() {
        let domain = Domain::from_array("d", 0.0, 0.0, &Array2::zeros((6, 3)), 1.0, None).unwrap();
        let tiles = vec![
            row_tile(&domain, CellWindow::new(0, 0, 3, 3), CellWindow::new(0, 0, 4, 3)),
            row_tile(&domain, CellWindow::new(3, 0, 3, 3), CellWindow::new(2, 0, 4, 3)),
        ];
        let parts = domain.to_partitions(&tiles).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].row_offset(), 2);
        assert_eq!(parts[1].shape(), Some((4, 3)));
        assert_eq!(parts[1].core(), CellWindow::new(3, 0, 3, 3));
        assert_eq!(parts[1].parent().unwrap().title(), "d");

        parts[1].set_at(5, 2, 9.0).unwrap();
        assert_eq!(domain.to_array().unwrap()[(5, 2)], 9.0);
    }

    #[test]
    fn test_point_partitions_filter_by_halo() {
        let extent = Extent::new(0.0, 0.0, 4.0, 2.0).unwrap();
        let points = vec![Point::new(0.5, 0.5, 1.0), Point::new(0.5, 2.5, 2.0), Point::new(1.5, 3.5, 3.0)];
        let domain = Domain::from_points("pts", extent, points, Some(1.0)).unwrap();
        let tiles = vec![
            row_tile(&domain, CellWindow::new(0, 0, 2, 2), CellWindow::new(0, 0, 3, 2)),
            row_tile(&domain, CellWindow::new(2, 0, 2, 2), CellWindow::new(1, 0, 3, 2)),
        ];
        let parts = domain.to_partitions(&tiles).unwrap();
        assert_eq!(parts[0].points().unwrap().len(), 2);
        assert_eq!(parts[1].points().unwrap().len(), 2);
        assert_eq!(parts[1].points_without_halo().unwrap().len(), 2);
        assert_eq!(parts[0].points_without_halo().unwrap().len(), 1);
    }

    #[test]
    fn test_partitions_require_data() {
        let domain = Domain::new("empty", SpatialExtent::new(0.0, 0.0, 1.0, 1.0).unwrap());
        assert!(matches!(domain.duplicate("x"), Err(Error::NotSupported(_))));
    }
}
