//! ESRI ASCII grid reading/writing
//!
//! Six-line header (`ncols`, `nrows`, `xllcorner`, `yllcorner`,
//! `cellsize`, `NODATA_value`) followed by rows of whitespace-separated
//! values. `NODATA_value` is optional on input; `xllcenter`/`yllcenter`
//! are accepted and shifted by half a cell.

use crate::domain::Domain;
use crate::error::{Error, Result};
use ndarray::Array2;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    x: Option<f64>,
    y: Option<f64>,
    centered: bool,
    cell_size: Option<f64>,
    nodata: Option<f64>,
}

fn parse_number<T: std::str::FromStr>(value: &str, line: usize, key: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| Error::Parse {
        line,
        message: format!("invalid value '{}' for {}", value, key),
    })
}

fn missing(key: &str) -> Error {
    Error::Parse {
        line: 0,
        message: format!("missing header field {}", key),
    }
}

/// Parse ASCII grid text into a grid domain
pub fn parse_ascii_grid(text: &str, title: &str) -> Result<Domain> {
    let mut header = Header::default();
    let mut lines = text.lines().enumerate().peekable();

    while let Some((idx, line)) = lines.peek().copied() {
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else {
            lines.next();
            continue;
        };
        if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
            break;
        }
        let value = parts.next().ok_or_else(|| Error::Parse {
            line: idx + 1,
            message: format!("header field {} has no value", key),
        })?;
        let line_no = idx + 1;
        match key.to_ascii_lowercase().as_str() {
            "ncols" => header.ncols = Some(parse_number(value, line_no, key)?),
            "nrows" => header.nrows = Some(parse_number(value, line_no, key)?),
            "xllcorner" => header.x = Some(parse_number(value, line_no, key)?),
            "yllcorner" => header.y = Some(parse_number(value, line_no, key)?),
            "xllcenter" => {
                header.x = Some(parse_number(value, line_no, key)?);
                header.centered = true;
            }
            "yllcenter" => {
                header.y = Some(parse_number(value, line_no, key)?);
                header.centered = true;
            }
            "cellsize" => header.cell_size = Some(parse_number(value, line_no, key)?),
            "nodata_value" => header.nodata = Some(parse_number(value, line_no, key)?),
            _ => {
                return Err(Error::Parse {
                    line: line_no,
                    message: format!("unknown header field {}", key),
                });
            }
        }
        lines.next();
    }

    let ncols = header.ncols.ok_or_else(|| missing("ncols"))?;
    let nrows = header.nrows.ok_or_else(|| missing("nrows"))?;
    let cell_size = header.cell_size.ok_or_else(|| missing("cellsize"))?;
    let mut x = header.x.ok_or_else(|| missing("xllcorner"))?;
    let mut y = header.y.ok_or_else(|| missing("yllcorner"))?;
    if header.centered {
        x -= cell_size / 2.0;
        y -= cell_size / 2.0;
    }

    let mut values = Vec::with_capacity(nrows * ncols);
    for (idx, line) in lines {
        for token in line.split_whitespace() {
            values.push(parse_number::<f64>(token, idx + 1, "cell value")?);
        }
    }
    if values.len() != nrows * ncols {
        return Err(Error::Parse {
            line: 0,
            message: format!("expected {} values ({}x{}), found {}", nrows * ncols, nrows, ncols, values.len()),
        });
    }

    let data = Array2::from_shape_vec((nrows, ncols), values).map_err(|e| Error::Other(e.to_string()))?;
    Domain::from_array(title, y, x, &data, cell_size, header.nodata)
}

/// Read an ASCII grid file
pub fn read_ascii_grid<P: AsRef<Path>>(path: P, title: &str) -> Result<Domain> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_ascii_grid(&text, title)
}

/// Render a grid domain as ASCII grid text with `precision` decimals
pub fn format_ascii_grid(domain: &Domain, precision: usize) -> Result<String> {
    let grid = domain
        .grid()
        .ok_or_else(|| Error::NotSupported(format!("ASCII grid output of non-grid domain '{}'", domain.title())))?;
    let cell_size = domain
        .cell_size()
        .ok_or_else(|| Error::AssertionFailed("cell size is not set".into()))?;
    let (rows, cols) = grid.shape();

    let mut out = String::with_capacity(rows * cols * (precision + 4) + 128);
    out.push_str(&format!("ncols {}\n", cols));
    out.push_str(&format!("nrows {}\n", rows));
    out.push_str(&format!("xllcorner {}\n", domain.x()));
    out.push_str(&format!("yllcorner {}\n", domain.y()));
    out.push_str(&format!("cellsize {}\n", cell_size));
    if let Some(nodata) = domain.nodata() {
        out.push_str(&format!("NODATA_value {}\n", nodata));
    }

    let nodata = domain.nodata();
    for r in 0..rows {
        let line: Vec<String> = (0..cols)
            .map(|c| {
                let v = grid.get(r, c).unwrap_or(f64::NAN);
                match nodata {
                    Some(nd) if v.is_nan() || v == nd => format!("{}", nd),
                    _ => format!("{:.*}", precision, v),
                }
            })
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    Ok(out)
}

/// Write a grid domain as an ASCII grid file
pub fn write_ascii_grid<P: AsRef<Path>>(domain: &Domain, path: P, precision: usize) -> Result<()> {
    let text = format_ascii_grid(domain, precision)?;
    let mut file = fs::File::create(path.as_ref())?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = "ncols 3\nnrows 2\nxllcorner 10.0\nyllcorner 20.0\ncellsize 5\nNODATA_value -9999\n1 2 3\n4 -9999 6\n";

    #[test]
    fn test_parse_sample() {
        let domain = parse_ascii_grid(SAMPLE, "sample").unwrap();
        assert_eq!(domain.shape(), Some((2, 3)));
        assert_relative_eq!(domain.x(), 10.0);
        assert_relative_eq!(domain.y(), 20.0);
        assert_relative_eq!(domain.height(), 10.0);
        assert_relative_eq!(domain.width(), 15.0);
        assert_eq!(domain.nodata(), Some(-9999.0));
        assert_eq!(domain.to_array().unwrap()[(1, 2)], 6.0);
    }

    #[test]
    fn test_format_uses_precision() {
        let domain = parse_ascii_grid(SAMPLE, "sample").unwrap();
        let text = format_ascii_grid(&domain, 2).unwrap();
        assert!(text.contains("1.00 2.00 3.00\n"));
        assert!(text.contains("4.00 -9999 6.00\n"));
    }

    #[test]
    fn test_value_count_mismatch() {
        let text = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
        assert!(matches!(parse_ascii_grid(text, "bad"), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_missing_header() {
        let text = "ncols 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n";
        assert!(matches!(parse_ascii_grid(text, "bad"), Err(Error::Parse { .. })));
    }
}
