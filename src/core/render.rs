use crate::io::geometry::{transform_envelope, wgs84_wkt};
use crate::io::raster::read_raster;
use crate::types::{
    BoundingBox, GeoTransform, IndexError, IndexResult, Raster, RasterGrid,
};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::PathBuf;

/// Color ramps for index visualisation.
///
/// Each ramp is a set of evenly spaced RGB control points; lookup linearly
/// interpolates between the two nearest points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Colormap {
    /// Red through yellow to green, the usual vegetation-index ramp
    RdYlGn,
    Viridis,
    Spectral,
    Gray,
}

impl Colormap {
    fn control_points(&self) -> &'static [[u8; 3]] {
        match self {
            Colormap::RdYlGn => &[
                [165, 0, 38],
                [215, 48, 39],
                [244, 109, 67],
                [253, 174, 97],
                [254, 224, 139],
                [217, 239, 139],
                [166, 217, 106],
                [102, 189, 99],
                [26, 152, 80],
                [0, 104, 55],
            ],
            Colormap::Viridis => &[
                [68, 1, 84],
                [72, 40, 120],
                [62, 74, 137],
                [49, 104, 142],
                [38, 130, 142],
                [31, 158, 137],
                [53, 183, 121],
                [109, 205, 89],
                [180, 222, 44],
                [253, 231, 37],
            ],
            Colormap::Spectral => &[
                [158, 1, 66],
                [213, 62, 79],
                [244, 109, 67],
                [253, 174, 97],
                [254, 224, 139],
                [255, 255, 191],
                [230, 245, 152],
                [171, 221, 164],
                [102, 194, 165],
                [50, 136, 189],
                [94, 79, 162],
            ],
            Colormap::Gray => &[[0, 0, 0], [255, 255, 255]],
        }
    }

    /// Interpolated color for a normalized position t in [0, 1]
    pub fn sample(&self, t: f32) -> [u8; 3] {
        let points = self.control_points();
        let t = num_traits::clamp(t, 0.0, 1.0);
        let scaled = t * (points.len() - 1) as f32;
        let i = (scaled.floor() as usize).min(points.len() - 2);
        let frac = scaled - i as f32;

        let lo = points[i];
        let hi = points[i + 1];
        [
            (lo[0] as f32 + frac * (hi[0] as f32 - lo[0] as f32)).round() as u8,
            (lo[1] as f32 + frac * (hi[1] as f32 - lo[1] as f32)).round() as u8,
            (lo[2] as f32 + frac * (hi[2] as f32 - lo[2] as f32)).round() as u8,
        ]
    }
}

/// Parameters for on-demand map rendering
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Decimation factor; `None` renders at full resolution.
    ///
    /// Decimation is block-mean over valid pixels (an all-nodata block stays
    /// nodata), a rendering-only optimization never written back to disk.
    pub resample: Option<usize>,
    /// Rescale to the 2nd-98th percentile of valid pixels before mapping;
    /// off uses the natural [-1, 1] index range
    pub percentile_stretch: bool,
    pub colormap: Colormap,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            resample: None,
            percentile_stretch: true,
            colormap: Colormap::RdYlGn,
        }
    }
}

/// A rendered map layer: PNG bytes plus the geographic bounds to pin it to
#[derive(Debug, Clone)]
pub struct MapOverlay {
    pub png: Vec<u8>,
    pub bounds: BoundingBox,
}

/// Render processed index rasters into map overlays, one per input path.
///
/// Order-preserving; each item fails independently (an unreadable file
/// yields a render error for that entry without stopping the rest).
pub fn render_products(
    paths: &[PathBuf],
    params: &RenderParams,
) -> Vec<IndexResult<MapOverlay>> {
    log::info!("🎨 Rendering {} products", paths.len());
    paths
        .par_iter()
        .map(|path| {
            let raster = read_raster(path)
                .map_err(|e| IndexError::Render(format!("{}: {}", path.display(), e)))?;
            render_raster(&raster, params)
        })
        .collect()
}

/// Render a single raster into a map overlay
pub fn render_raster(raster: &Raster, params: &RenderParams) -> IndexResult<MapOverlay> {
    let decimated = match params.resample {
        Some(factor) if factor > 1 => Some(decimate(raster, factor)?),
        _ => None,
    };
    let working = decimated.as_ref().unwrap_or(raster);

    let mut valid: Vec<f32> = working
        .data
        .iter()
        .copied()
        .filter(|&v| !working.is_nodata(v))
        .collect();

    let (lo, hi) = if params.percentile_stretch && !valid.is_empty() {
        percentile_range(&mut valid, 2.0, 98.0)
    } else {
        (-1.0, 1.0)
    };
    let span = hi - lo;

    let (height, width) = working.data.dim();
    let mut pixels = vec![0u8; width * height * 4];
    for (i, &value) in working.data.iter().enumerate() {
        if working.is_nodata(value) {
            continue; // stays fully transparent
        }
        let t = if span.abs() <= f32::EPSILON {
            0.5
        } else {
            (value - lo) / span
        };
        let [r, g, b] = params.colormap.sample(t);
        pixels[i * 4] = r;
        pixels[i * 4 + 1] = g;
        pixels[i * 4 + 2] = b;
        pixels[i * 4 + 3] = 255;
    }

    let img = RgbaImage::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| IndexError::Render("Pixel buffer does not match dimensions".to_string()))?;
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
        .map_err(|e| IndexError::Render(format!("PNG encoding failed: {}", e)))?;

    Ok(MapOverlay {
        png,
        bounds: geographic_bounds(working)?,
    })
}

/// Block-mean decimation by an integer factor
fn decimate(raster: &Raster, factor: usize) -> IndexResult<Raster> {
    let (rows, cols) = raster.data.dim();
    let out_rows = rows / factor;
    let out_cols = cols / factor;
    if out_rows == 0 || out_cols == 0 {
        return Err(IndexError::Render(format!(
            "Resample factor {} too large for {}x{} raster",
            factor, rows, cols
        )));
    }

    log::debug!(
        "Decimating {}x{} raster by {} -> {}x{}",
        rows,
        cols,
        factor,
        out_rows,
        out_cols
    );

    let mut output = RasterGrid::from_elem((out_rows, out_cols), f32::NAN);
    for out_row in 0..out_rows {
        for out_col in 0..out_cols {
            let mut sum = 0.0f64;
            let mut count = 0usize;
            for in_row in out_row * factor..((out_row + 1) * factor).min(rows) {
                for in_col in out_col * factor..((out_col + 1) * factor).min(cols) {
                    let v = raster.data[[in_row, in_col]];
                    if !raster.is_nodata(v) {
                        sum += v as f64;
                        count += 1;
                    }
                }
            }
            if count > 0 {
                output[[out_row, out_col]] = (sum / count as f64) as f32;
            }
        }
    }

    let transform = GeoTransform {
        pixel_width: raster.transform.pixel_width * factor as f64,
        pixel_height: raster.transform.pixel_height * factor as f64,
        ..raster.transform
    };

    Ok(Raster {
        data: output,
        transform,
        crs_wkt: raster.crs_wkt.clone(),
        nodata: Some(f64::NAN),
    })
}

/// Percentile range over valid pixel values (sorts the slice in place)
fn percentile_range(values: &mut [f32], lo_pct: f32, hi_pct: f32) -> (f32, f32) {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).expect("no NaN in valid values"));
    let last = values.len() - 1;
    let lo_idx = ((lo_pct / 100.0) * last as f32).round() as usize;
    let hi_idx = ((hi_pct / 100.0) * last as f32).round() as usize;
    (values[lo_idx], values[hi_idx.min(last)])
}

/// Raster extent reprojected to WGS84 for map-widget overlay.
///
/// A raster with no CRS is taken to be in geographic coordinates already.
fn geographic_bounds(raster: &Raster) -> IndexResult<BoundingBox> {
    let extent = raster.extent();
    let (min_lon, min_lat, max_lon, max_lat) = if raster.crs_wkt.trim().is_empty() {
        extent
    } else {
        transform_envelope(extent, &raster.crs_wkt, &wgs84_wkt()?)
            .map_err(|e| IndexError::Render(format!("Cannot derive geographic bounds: {}", e)))?
    };

    Ok(BoundingBox {
        min_lon,
        max_lon,
        min_lat,
        max_lat,
    })
}
