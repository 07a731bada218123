use crate::types::{GeoTransform, IndexError, IndexResult, Raster, RasterGrid};
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use std::path::{Path, PathBuf};

/// Read a single-band raster file into memory.
///
/// Captures the grid as f32 together with the georeferencing that downstream
/// cropping and merging depend on: CRS (WKT), affine transform, and the
/// band's nodata value.
pub fn read_raster<P: AsRef<Path>>(path: P) -> IndexResult<Raster> {
    let path = path.as_ref();
    log::debug!("Reading raster: {}", path.display());

    let dataset = Dataset::open(path)?;
    let geo_transform = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();

    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value();
    let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

    let grid = RasterGrid::from_shape_vec((height, width), band_data.data)
        .map_err(|e| IndexError::Invalid(format!("Failed to reshape raster data: {}", e)))?;

    Ok(Raster {
        data: grid,
        transform: GeoTransform::from_gdal(&geo_transform),
        crs_wkt: dataset.projection(),
        nodata,
    })
}

/// Write a raster as GeoTIFF, preserving CRS, transform, and nodata.
///
/// The write is atomic per output file: the dataset is created at a `.tmp`
/// sibling path and renamed into place only after it is fully written and
/// closed, so a crash mid-write never leaves a partial product behind.
pub fn write_raster<P: AsRef<Path>>(path: P, raster: &Raster) -> IndexResult<()> {
    let path = path.as_ref();
    log::debug!("Writing raster: {}", path.display());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let staging = staging_path(path);
    {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = raster.data.dim();

        let mut dataset = driver.create_with_band_type::<f32, _>(
            &staging,
            width as isize,
            height as isize,
            1,
        )?;

        dataset.set_geo_transform(&raster.transform.to_gdal())?;
        if !raster.crs_wkt.is_empty() {
            dataset.set_projection(&raster.crs_wkt)?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        rasterband.set_no_data_value(raster.nodata)?;

        let flat_data: Vec<f32> = raster.data.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
    }

    std::fs::rename(&staging, path)?;
    Ok(())
}

/// Sibling path the dataset is staged at before the final rename
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
