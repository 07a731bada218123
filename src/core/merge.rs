use crate::io::raster::{read_raster, write_raster};
use crate::types::{GeoTransform, IndexError, IndexKind, IndexResult, Raster, RasterGrid};
use std::path::{Path, PathBuf};

/// Mosaic several index rasters into one raster covering their union extent.
///
/// All inputs must share a CRS; mismatches fail with a merge error rather
/// than silently reprojecting (reprojection before merge is the caller's
/// responsibility). The target grid uses the finest pixel size among the
/// inputs. Overlap policy: the last-listed input wins at any pixel covered
/// by several inputs, except that nodata pixels never overwrite valid data
/// already placed by an earlier input.
pub fn merge_rasters(inputs: &[Raster]) -> IndexResult<Raster> {
    let first = inputs
        .first()
        .ok_or_else(|| IndexError::Merge("No rasters to merge".to_string()))?;

    for (i, input) in inputs.iter().enumerate() {
        if input.crs_wkt.trim() != first.crs_wkt.trim() {
            return Err(IndexError::Merge(format!(
                "Input {} has a different CRS than input 0; reproject before merging",
                i
            )));
        }
    }

    if inputs.len() == 1 {
        log::debug!("Single input, merge is a copy");
        return Ok(first.clone());
    }

    // Finest common resolution among the inputs
    let pixel_width = inputs
        .iter()
        .map(|r| r.transform.pixel_width.abs())
        .fold(f64::INFINITY, f64::min);
    let pixel_height = inputs
        .iter()
        .map(|r| r.transform.pixel_height.abs())
        .fold(f64::INFINITY, f64::min);
    if pixel_width <= 0.0 || pixel_height <= 0.0 {
        return Err(IndexError::Merge("Input has a degenerate pixel size".to_string()));
    }

    // Union extent
    let mut union = inputs[0].extent();
    for input in &inputs[1..] {
        let e = input.extent();
        union = (
            union.0.min(e.0),
            union.1.min(e.1),
            union.2.max(e.2),
            union.3.max(e.3),
        );
    }
    let (min_x, min_y, max_x, max_y) = union;

    let width = (((max_x - min_x) / pixel_width) - 1e-9).ceil().max(1.0) as usize;
    let height = (((max_y - min_y) / pixel_height) - 1e-9).ceil().max(1.0) as usize;

    log::info!(
        "🔗 Merging {} rasters into {}x{} target grid",
        inputs.len(),
        width,
        height
    );

    let transform = GeoTransform {
        top_left_x: min_x,
        pixel_width,
        rotation_x: 0.0,
        top_left_y: max_y,
        rotation_y: 0.0,
        pixel_height: -pixel_height,
    };

    let mut merged = RasterGrid::from_elem((height, width), f32::NAN);

    // Place each input in listed order; later inputs overwrite earlier ones
    for input in inputs {
        let (in_min_x, in_min_y, in_max_x, in_max_y) = input.extent();

        let col_start = (((in_min_x - min_x) / pixel_width).floor().max(0.0)) as usize;
        let col_end = ((((in_max_x - min_x) / pixel_width).ceil()) as isize)
            .clamp(0, width as isize) as usize;
        let row_start = (((max_y - in_max_y) / pixel_height).floor().max(0.0)) as usize;
        let row_end = ((((max_y - in_min_y) / pixel_height).ceil()) as isize)
            .clamp(0, height as isize) as usize;

        let (in_height, in_width) = input.data.dim();
        for row in row_start..row_end {
            let y = max_y - (row as f64 + 0.5) * pixel_height;
            for col in col_start..col_end {
                let x = min_x + (col as f64 + 0.5) * pixel_width;

                // Nearest-neighbor sample from the input grid
                let (in_col, in_row) = input.transform.world_to_pixel(x, y);
                let (in_col, in_row) = (in_col.floor(), in_row.floor());
                if in_col < 0.0 || in_row < 0.0 {
                    continue;
                }
                let (in_col, in_row) = (in_col as usize, in_row as usize);
                if in_col >= in_width || in_row >= in_height {
                    continue;
                }

                let value = input.data[[in_row, in_col]];
                if !input.is_nodata(value) {
                    merged[[row, col]] = value;
                }
            }
        }
    }

    Ok(Raster {
        data: merged,
        transform,
        crs_wkt: first.crs_wkt.clone(),
        nodata: Some(f64::NAN),
    })
}

/// Mosaic processed product directories into one merged product.
///
/// For every index kind present in **all** inputs, the per-scene index
/// rasters are merged in the listed order and written to
/// `<output_root>/<merged_id>/<kind>.tif`. Returns the written paths.
pub fn merge_products(
    product_dirs: &[PathBuf],
    output_root: &Path,
    merged_id: &str,
) -> IndexResult<Vec<PathBuf>> {
    if product_dirs.len() < 2 {
        return Err(IndexError::Merge(
            "Merging requires at least two product directories".to_string(),
        ));
    }

    let common_kinds: Vec<IndexKind> = IndexKind::ALL
        .into_iter()
        .filter(|kind| {
            product_dirs
                .iter()
                .all(|dir| dir.join(format!("{}.tif", kind.file_stem())).is_file())
        })
        .collect();

    if common_kinds.is_empty() {
        return Err(IndexError::Merge(
            "No index kind is present in every input product".to_string(),
        ));
    }

    log::info!(
        "🔗 Merging {} products into {} ({} index kinds)",
        product_dirs.len(),
        merged_id,
        common_kinds.len()
    );

    let mut written = Vec::with_capacity(common_kinds.len());
    for kind in common_kinds {
        let mut rasters = Vec::with_capacity(product_dirs.len());
        for dir in product_dirs {
            rasters.push(read_raster(dir.join(format!("{}.tif", kind.file_stem())))?);
        }

        let merged = merge_rasters(&rasters)?;
        let out_path = output_root
            .join(merged_id)
            .join(format!("{}.tif", kind.file_stem()));
        write_raster(&out_path, &merged)?;
        log::info!("✅ Merged {} -> {}", kind, out_path.display());
        written.push(out_path);
    }

    Ok(written)
}
