//! # gridwork core
//!
//! Spatial data model for the gridwork map-algebra engine.
//!
//! This crate provides:
//! - [`SpatialExtent`]: a rectangle in map space with optional halo and backing data
//! - [`Domain`]: a named dataset (grid or point list) covering a study area
//! - [`Partition`]: one tile of a domain, addressed in its parent's cell space
//! - [`SharedGrid`]/[`GridView`]: grid storage shared between workers
//! - I/O for ASCII grids, GeoTIFF and JSON point lists

pub mod domain;
pub mod error;
pub mod extent;
pub mod io;
pub mod partition;
pub mod point;
pub mod raster;

pub use domain::Domain;
pub use error::{Error, Result};
pub use extent::{BufferedExtent, DataKind, Extent, LayerData, SpatialExtent};
pub use partition::{FocalWindow, ParentRef, Partition};
pub use point::{AttributeValue, Point, PointList};
pub use raster::{CellWindow, GridView, Neighborhood, SharedGrid};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::domain::Domain;
    pub use crate::error::{Error, Result};
    pub use crate::extent::{DataKind, Extent, SpatialExtent};
    pub use crate::partition::Partition;
    pub use crate::point::{Point, PointList};
    pub use crate::raster::{CellWindow, GridView};
}
