use crate::io::raster::read_raster;
use crate::types::{
    IndexError, IndexKind, IndexRaster, IndexResult, Raster, RasterGrid, Scene,
};
use ndarray::Zip;

/// Compute a spectral index for one scene from its band files.
///
/// Both contributing bands are masked by their own nodata values first; a
/// pixel that is nodata in either band, or whose band sum is zero, is nodata
/// (NaN) in the output. No clamping is applied beyond the natural [-1, 1]
/// range of the normalized-difference formula.
pub fn compute_index(kind: IndexKind, scene: &Scene) -> IndexResult<IndexRaster> {
    let (a_role, b_role) = kind.band_pair();

    let a_path = scene
        .band_path(a_role)
        .ok_or_else(|| IndexError::MissingBand {
            scene: scene.id.clone(),
            role: a_role,
            kind,
        })?;
    let b_path = scene
        .band_path(b_role)
        .ok_or_else(|| IndexError::MissingBand {
            scene: scene.id.clone(),
            role: b_role,
            kind,
        })?;

    log::debug!(
        "Scene {}: computing {} from {} and {}",
        scene.id,
        kind,
        a_path.display(),
        b_path.display()
    );

    let a = read_raster(a_path)?;
    let b = read_raster(b_path)?;

    let grid = normalized_difference(&a, &b)?;

    Ok(IndexRaster {
        kind,
        raster: Raster {
            data: grid,
            transform: a.transform,
            crs_wkt: a.crs_wkt,
            nodata: Some(f64::NAN),
        },
    })
}

/// Safe normalized difference (a - b) / (a + b) over two band rasters
pub fn normalized_difference(a: &Raster, b: &Raster) -> IndexResult<RasterGrid> {
    if a.data.dim() != b.data.dim() {
        return Err(IndexError::Invalid(format!(
            "Band grids differ in shape: {:?} vs {:?}",
            a.data.dim(),
            b.data.dim()
        )));
    }

    let mut out = RasterGrid::from_elem(a.data.dim(), f32::NAN);
    Zip::from(&mut out)
        .and(&a.data)
        .and(&b.data)
        .for_each(|o, &av, &bv| {
            if a.is_nodata(av) || b.is_nodata(bv) {
                return;
            }
            let sum = av + bv;
            if sum == 0.0 {
                return;
            }
            *o = (av - bv) / sum;
        });

    Ok(out)
}
