//! Hillshade (shaded relief) calculation
//!
//! Creates a shaded relief visualization from a DEM based on
//! illumination angle and direction.

use super::aspect::descent_bearing;
use super::horn_gradient;
use gridwork_core::{Domain, Error, Result};
use gridwork_parallel::{OpClass, OperationSpec};

/// Parameters for hillshade calculation
#[derive(Debug, Clone)]
pub struct HillshadeParams {
    /// Sun azimuth in degrees (0 = North, clockwise)
    pub azimuth: f64,
    /// Sun altitude in degrees above horizon (0-90)
    pub altitude: f64,
    /// Z-factor for vertical exaggeration
    pub z_factor: f64,
    /// Output range: false = 0-255, true = 0.0-1.0
    pub normalized: bool,
}

impl Default for HillshadeParams {
    fn default() -> Self {
        Self {
            azimuth: 315.0,
            altitude: 45.0,
            z_factor: 1.0,
            normalized: false,
        }
    }
}

/// Hillshade of a DEM.
///
/// shade = cos(zenith)·cos(slope) + sin(zenith)·sin(slope)·cos(azimuth − aspect),
/// with azimuth and aspect both as compass bearings. Cells whose 3x3
/// window leaves the domain or holds nodata get the DEM's nodata value
/// (NaN without one).
pub fn hillshade(dem: Domain, params: HillshadeParams) -> Result<OperationSpec> {
    if !(0.0..=90.0).contains(&params.altitude) {
        return Err(Error::InvalidParameter {
            name: "altitude",
            value: params.altitude.to_string(),
            reason: "sun altitude must be within 0-90 degrees".into(),
        });
    }
    let cell_size = dem
        .cell_size()
        .ok_or_else(|| Error::invalid_input(format!("'{}' has no cell size", dem.title()), "none"))?;

    let azimuth_rad = params.azimuth.to_radians();
    let zenith_rad = (90.0 - params.altitude).to_radians();
    let (sin_zenith, cos_zenith) = zenith_rad.sin_cos();

    OperationSpec::builder("HillShade", OpClass::Focal)
        .layer(dem)
        .buffer_size(cell_size)
        .cell_fn(move |ctx| {
            let Some((dz_dx, dz_dy)) = horn_gradient(ctx)? else {
                return Ok(ctx.output.nodata().unwrap_or(f64::NAN));
            };
            let (dz_dx, dz_dy) = (dz_dx * params.z_factor, dz_dy * params.z_factor);
            let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
            let aspect_rad = descent_bearing(dz_dx, dz_dy).unwrap_or(0.0);

            let shade = cos_zenith * slope_rad.cos() + sin_zenith * slope_rad.sin() * (azimuth_rad - aspect_rad).cos();
            let shade = shade.clamp(0.0, 1.0);
            Ok(if params.normalized { shade } else { (shade * 255.0).round() })
        })
        .build()
}
