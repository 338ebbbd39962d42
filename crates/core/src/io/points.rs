//! JSON point-list documents
//!
//! ```json
//! {"extent": {"y": 0, "x": 0, "h": 10, "w": 10}, "cell_size": 1.0,
//!  "points": [{"x": 1.5, "y": 2.5, "v": 3.0}]}
//! ```

use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::point::Point;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct PointDocument {
    extent: Extent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cell_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nodata: Option<f64>,
    points: Vec<Point>,
}

pub fn parse_points(text: &str, title: &str) -> Result<Domain> {
    let doc: PointDocument = serde_json::from_str(text)?;
    let extent = Extent::new(doc.extent.y, doc.extent.x, doc.extent.h, doc.extent.w)?;
    let mut domain = Domain::from_points(title, extent, doc.points, doc.cell_size)?;
    domain.spatial_mut().set_nodata(doc.nodata);
    Ok(domain)
}

/// Read a point-list domain from a JSON file
pub fn read_points<P: AsRef<Path>>(path: P, title: &str) -> Result<Domain> {
    parse_points(&fs::read_to_string(path.as_ref())?, title)
}

pub fn format_points(domain: &Domain) -> Result<String> {
    let points = domain
        .points()
        .ok_or_else(|| Error::NotSupported(format!("point output of non-point domain '{}'", domain.title())))?;
    let doc = PointDocument {
        extent: domain.extent(),
        cell_size: domain.cell_size(),
        nodata: domain.nodata(),
        points: points.snapshot(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Write a point-list domain as JSON
pub fn write_points<P: AsRef<Path>>(domain: &Domain, path: P) -> Result<()> {
    fs::write(path.as_ref(), format_points(domain)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let text = r#"{"extent": {"y": 0, "x": 0, "h": 4, "w": 4}, "cell_size": 1.0,
            "points": [{"x": 1.0, "y": 1.0, "v": 2.0}, {"x": 3.5, "y": 0.5}]}"#;
        let domain = parse_points(text, "wells").unwrap();
        assert_eq!(domain.points().unwrap().len(), 2);
        assert_eq!(domain.shape(), Some((4, 4)));

        let again = parse_points(&format_points(&domain).unwrap(), "wells").unwrap();
        assert_eq!(again.points().unwrap().snapshot(), domain.points().unwrap().snapshot());
    }

    #[test]
    fn test_rejects_degenerate_extent() {
        let text = r#"{"extent": {"y": 0, "x": 0, "h": 0, "w": 4}, "points": []}"#;
        assert!(matches!(parse_points(text, "bad"), Err(Error::InvalidInput { .. })));
    }
}
