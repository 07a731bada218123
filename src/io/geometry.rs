use crate::types::{AreaOfInterest, BoundingBox, IndexError, IndexResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use std::path::PathBuf;

/// Crop-area input as it arrives from the caller.
///
/// Precedence: when `shapefile` is set it **overrides** the bounding box,
/// even if both are supplied. The bbox fields are only consulted when no
/// shapefile path is given.
#[derive(Debug, Clone, Default)]
pub struct AoiSpec {
    pub bbox: Option<BoundingBox>,
    pub shapefile: Option<PathBuf>,
}

/// Resolve the crop-area input into a single envelope in a known CRS.
///
/// Bounding boxes are taken as WGS84 degrees; shapefiles carry their own
/// layer CRS (WGS84 assumed when the layer has none). Fails with a geometry
/// error when neither input is usable, the shapefile cannot be parsed, or it
/// contains zero geometries.
pub fn resolve_aoi(spec: &AoiSpec) -> IndexResult<AreaOfInterest> {
    if let Some(path) = &spec.shapefile {
        log::info!("Resolving AOI from shapefile: {}", path.display());
        return resolve_shapefile(path);
    }

    let bbox = spec.bbox.ok_or_else(|| {
        IndexError::Geometry("No bounding box or shapefile supplied".to_string())
    })?;

    if bbox.min_lon >= bbox.max_lon || bbox.min_lat >= bbox.max_lat {
        return Err(IndexError::Geometry(format!(
            "Degenerate bounding box: lon [{}, {}], lat [{}, {}]",
            bbox.min_lon, bbox.max_lon, bbox.min_lat, bbox.max_lat
        )));
    }

    log::info!(
        "Resolving AOI from bounding box: lon [{}, {}], lat [{}, {}]",
        bbox.min_lon,
        bbox.max_lon,
        bbox.min_lat,
        bbox.max_lat
    );

    Ok(AreaOfInterest {
        min_x: bbox.min_lon,
        min_y: bbox.min_lat,
        max_x: bbox.max_lon,
        max_y: bbox.max_lat,
        crs_wkt: wgs84_wkt()?,
    })
}

fn resolve_shapefile(path: &PathBuf) -> IndexResult<AreaOfInterest> {
    let dataset = Dataset::open(path)
        .map_err(|e| IndexError::Geometry(format!("Cannot open {}: {}", path.display(), e)))?;
    let mut layer = dataset
        .layer(0)
        .map_err(|e| IndexError::Geometry(format!("No layer in {}: {}", path.display(), e)))?;

    let crs_wkt = match layer.spatial_ref() {
        Some(sref) => sref
            .to_wkt()
            .map_err(|e| IndexError::Geometry(format!("Unreadable layer CRS: {}", e)))?,
        None => {
            log::warn!(
                "Shapefile {} has no CRS, assuming WGS84",
                path.display()
            );
            wgs84_wkt()?
        }
    };

    let mut envelope: Option<(f64, f64, f64, f64)> = None;
    for feature in layer.features() {
        let geom = match feature.geometry() {
            Some(g) => g,
            None => continue,
        };
        let env = geom.envelope();
        envelope = Some(match envelope {
            None => (env.MinX, env.MinY, env.MaxX, env.MaxY),
            Some((min_x, min_y, max_x, max_y)) => (
                min_x.min(env.MinX),
                min_y.min(env.MinY),
                max_x.max(env.MaxX),
                max_y.max(env.MaxY),
            ),
        });
    }

    let (min_x, min_y, max_x, max_y) = envelope.ok_or_else(|| {
        IndexError::Geometry(format!("Shapefile {} contains no geometries", path.display()))
    })?;

    log::debug!(
        "Shapefile envelope: x [{}, {}], y [{}, {}]",
        min_x,
        max_x,
        min_y,
        max_y
    );

    Ok(AreaOfInterest {
        min_x,
        min_y,
        max_x,
        max_y,
        crs_wkt,
    })
}

/// WKT of WGS84 with traditional (lon, lat) axis order pinned
pub fn wgs84_wkt() -> IndexResult<String> {
    let sref = SpatialRef::from_epsg(4326)
        .map_err(|e| IndexError::Geometry(format!("Cannot build WGS84: {}", e)))?;
    sref.to_wkt()
        .map_err(|e| IndexError::Geometry(format!("Cannot export WGS84 WKT: {}", e)))
}

/// Points sampled along each envelope edge before reprojection, so curved
/// edges in the target CRS cannot under-cover the true extent
const EDGE_SAMPLES: usize = 21;

/// Reproject an envelope between two WKT-described reference systems.
///
/// The envelope edges are densified before transformation and the result is
/// the axis-aligned hull of all transformed samples.
pub fn transform_envelope(
    envelope: (f64, f64, f64, f64),
    src_wkt: &str,
    dst_wkt: &str,
) -> IndexResult<(f64, f64, f64, f64)> {
    if src_wkt == dst_wkt {
        return Ok(envelope);
    }

    let src = spatial_ref_from_wkt(src_wkt)?;
    let dst = spatial_ref_from_wkt(dst_wkt)?;
    let transform = CoordTransform::new(&src, &dst)
        .map_err(|e| IndexError::Geometry(format!("Cannot build CRS transform: {}", e)))?;

    let (min_x, min_y, max_x, max_y) = envelope;
    let mut xs = Vec::with_capacity(EDGE_SAMPLES * 4);
    let mut ys = Vec::with_capacity(EDGE_SAMPLES * 4);
    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
        let x = min_x + t * (max_x - min_x);
        let y = min_y + t * (max_y - min_y);
        xs.extend_from_slice(&[x, x, min_x, max_x]);
        ys.extend_from_slice(&[min_y, max_y, y, y]);
    }
    let mut zs = vec![0.0; xs.len()];

    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|e| IndexError::Geometry(format!("CRS transform failed: {}", e)))?;

    let mut out = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        out.0 = out.0.min(x);
        out.1 = out.1.min(y);
        out.2 = out.2.max(x);
        out.3 = out.3.max(y);
    }

    if !out.0.is_finite() || !out.2.is_finite() {
        return Err(IndexError::Geometry(
            "Envelope does not reproject to finite coordinates".to_string(),
        ));
    }

    Ok(out)
}

fn spatial_ref_from_wkt(wkt: &str) -> IndexResult<SpatialRef> {
    let sref = SpatialRef::from_wkt(wkt)
        .map_err(|e| IndexError::Geometry(format!("Bad CRS WKT: {}", e)))?;
    sref.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(sref)
}
