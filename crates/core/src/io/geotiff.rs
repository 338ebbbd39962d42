//! Single-band GeoTIFF reading/writing through the `tiff` crate
//!
//! Only the georeferencing the engine needs is handled: pixel scale,
//! tiepoint and the GDAL nodata tag. Data is written as 32-bit float.

use crate::domain::Domain;
use crate::error::{Error, Result};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray32Float;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// Read a GeoTIFF file into a grid domain titled `title`
pub fn read_geotiff<P: AsRef<Path>>(path: P, title: &str) -> Result<Domain> {
    let file = File::open(path.as_ref())?;
    decode_geotiff(file, title)
}

/// Read a GeoTIFF held in memory
pub fn read_geotiff_from_buffer(data: &[u8], title: &str) -> Result<Domain> {
    decode_geotiff(Cursor::new(data), title)
}

fn tiff_err(context: &str) -> impl Fn(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{}: {}", context, e))
}

fn decode_geotiff<R: Read + Seek>(reader: R, title: &str) -> Result<Domain> {
    let mut decoder = Decoder::new(reader).map_err(tiff_err("TIFF decode error"))?;
    let (width, height) = decoder.dimensions().map_err(tiff_err("Cannot read dimensions"))?;
    let rows = height as usize;
    let cols = width as usize;

    let values: Vec<f64> = match decoder.read_image().map_err(tiff_err("Cannot read image data"))? {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => return Err(Error::NotSupported("TIFF pixel format".to_string())),
    };

    // Multi-band images interleave samples; keep the first band
    let samples = if rows * cols > 0 { values.len() / (rows * cols) } else { 0 };
    if samples == 0 {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: values.len(),
            ac: 1,
        });
    }
    let band: Vec<f64> = values.into_iter().step_by(samples).take(rows * cols).collect();
    let data = Array2::from_shape_vec((rows, cols), band).map_err(|e| Error::Other(e.to_string()))?;

    let (origin_x, origin_y, cell_size) = read_georeference(&mut decoder).unwrap_or((0.0, rows as f64, 1.0));
    let nodata = decoder
        .get_tag_ascii_string(Tag::Unknown(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());

    // The extent origin is the lower-left corner of the image
    Domain::from_array(title, origin_y - rows as f64 * cell_size, origin_x, &data, cell_size, nodata)
}

/// (origin_x, origin_y of the upper-left corner, cell size)
fn read_georeference<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<(f64, f64, f64)> {
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 || scale[0] <= 0.0 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some((origin_x, origin_y, scale[0]))
}

/// Write a grid domain to a GeoTIFF file
pub fn write_geotiff<P: AsRef<Path>>(domain: &Domain, path: P) -> Result<()> {
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(domain, file)
}

/// Write a grid domain to an in-memory GeoTIFF
pub fn write_geotiff_to_buffer(domain: &Domain) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(domain, Cursor::new(&mut buf))?;
    Ok(buf)
}

fn encode_geotiff<W: Write + Seek>(domain: &Domain, writer: W) -> Result<()> {
    let grid = domain
        .grid()
        .ok_or_else(|| Error::NotSupported(format!("GeoTIFF output of non-grid domain '{}'", domain.title())))?;
    let cell_size = domain
        .cell_size()
        .ok_or_else(|| Error::AssertionFailed("cell size is not set".into()))?;
    let (rows, cols) = grid.shape();
    let data: Vec<f32> = grid.iter().map(|v| v as f32).collect();

    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err("TIFF encoder error"))?;
    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err("Cannot create TIFF image"))?;

    let scale = [cell_size, cell_size, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, domain.x(), domain.y() + domain.height(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err("Cannot write tiepoint tag"))?;

    // Version 1.1.0 with GTModelTypeGeoKey=Projected, GTRasterTypeGeoKey=PixelIsArea
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
        .map_err(tiff_err("Cannot write geokey tag"))?;

    if let Some(nodata) = domain.nodata() {
        image
            .encoder()
            .write_tag(Tag::Unknown(GDAL_NODATA), nodata.to_string().as_str())
            .map_err(tiff_err("Cannot write nodata tag"))?;
    }

    image.write_data(&data).map_err(tiff_err("Cannot write image data"))?;
    Ok(())
}
