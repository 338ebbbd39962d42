//! Reading and writing domains
//!
//! [`read_domain`] and [`write_domain`] pick the format from the file
//! extension: `.asc`/`.txt` ASCII grid, `.tif`/`.tiff` GeoTIFF, `.json`
//! point list.

mod ascii;
mod geotiff;
mod points;

pub use ascii::{format_ascii_grid, parse_ascii_grid, read_ascii_grid, write_ascii_grid};
pub use geotiff::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
pub use points::{format_points, parse_points, read_points, write_points};

use crate::domain::Domain;
use crate::error::{Error, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    AsciiGrid,
    GeoTiff,
    PointJson,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "asc" | "txt" => Ok(Format::AsciiGrid),
            "tif" | "tiff" => Ok(Format::GeoTiff),
            "json" => Ok(Format::PointJson),
            _ => Err(Error::NotSupported(format!("file extension '{}' of {}", ext, path.display()))),
        }
    }
}

/// Read a domain, titled after the file stem
pub fn read_domain<P: AsRef<Path>>(path: P) -> Result<Domain> {
    let path = path.as_ref();
    let title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string();
    match Format::from_path(path)? {
        Format::AsciiGrid => read_ascii_grid(path, &title),
        Format::GeoTiff => read_geotiff(path, &title),
        Format::PointJson => read_points(path, &title),
    }
}

/// Write a domain; `precision` is the decimal count used by text grids
pub fn write_domain<P: AsRef<Path>>(path: P, domain: &Domain, precision: usize) -> Result<()> {
    let path = path.as_ref();
    match Format::from_path(path)? {
        Format::AsciiGrid => write_ascii_grid(domain, path, precision),
        Format::GeoTiff => write_geotiff(domain, path),
        Format::PointJson => write_points(domain, path),
    }
}
