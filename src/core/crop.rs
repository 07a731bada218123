use crate::io::geometry::transform_envelope;
use crate::types::{AreaOfInterest, GeoTransform, IndexError, IndexResult, Raster};
use ndarray::s;

/// Clip a raster to an area of interest.
///
/// The AOI envelope is reprojected into the raster's CRS, intersected with
/// the raster extent in pixel space, and the window is sliced out with a
/// transform recomputed from the window origin. The nodata value is carried
/// over unchanged. Fails when the envelope does not reproject cleanly or the
/// intersection is empty, so the caller can skip the item instead of writing
/// corrupt output.
pub fn crop(raster: &Raster, aoi: &AreaOfInterest) -> IndexResult<Raster> {
    let envelope = transform_envelope(
        (aoi.min_x, aoi.min_y, aoi.max_x, aoi.max_y),
        &aoi.crs_wkt,
        &raster.crs_wkt,
    )
    .map_err(|e| IndexError::Crop(format!("AOI does not reproject to raster CRS: {}", e)))?;

    let window = pixel_window(raster, envelope)?;
    let (row0, row1, col0, col1) = window;

    log::debug!(
        "Cropping to pixel window rows {}..{}, cols {}..{}",
        row0,
        row1,
        col0,
        col1
    );

    let data = raster.data.slice(s![row0..row1, col0..col1]).to_owned();

    let (origin_x, origin_y) = raster.transform.pixel_to_world(col0 as f64, row0 as f64);
    let transform = GeoTransform {
        top_left_x: origin_x,
        top_left_y: origin_y,
        ..raster.transform
    };

    Ok(Raster {
        data,
        transform,
        crs_wkt: raster.crs_wkt.clone(),
        nodata: raster.nodata,
    })
}

/// Intersect an envelope (raster CRS) with the raster extent in pixel space.
///
/// Uses floor for the window start and ceil for the end, so every pixel the
/// envelope touches is kept, then clamps to the grid.
fn pixel_window(
    raster: &Raster,
    envelope: (f64, f64, f64, f64),
) -> IndexResult<(usize, usize, usize, usize)> {
    let (min_x, min_y, max_x, max_y) = envelope;
    let (width, height) = (raster.width(), raster.height());

    let (c0, r0) = raster.transform.world_to_pixel(min_x, max_y);
    let (c1, r1) = raster.transform.world_to_pixel(max_x, min_y);

    let col_start = c0.min(c1).floor().max(0.0) as usize;
    let col_end = (c0.max(c1).ceil() as isize).min(width as isize).max(0) as usize;
    let row_start = r0.min(r1).floor().max(0.0) as usize;
    let row_end = (r0.max(r1).ceil() as isize).min(height as isize).max(0) as usize;

    if col_start >= col_end || row_start >= row_end {
        return Err(IndexError::Crop(format!(
            "AOI does not intersect raster extent ({}x{} grid)",
            width, height
        )));
    }

    Ok((row_start, row_end, col_start, col_end))
}
