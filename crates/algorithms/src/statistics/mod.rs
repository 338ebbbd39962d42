//! Statistical operations over raster layers
//!
//! - **focal**: Moving window (focal) statistics
//! - **zonal**: Statistics by zones

pub mod focal;
pub mod zonal;

pub use focal::{FocalParams, FocalStatistic, focal_mean_bulk, focal_statistics};
pub use zonal::{ZonalStatistic, zonal_statistics};
