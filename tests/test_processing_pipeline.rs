use approx::assert_relative_eq;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use verdine::io::geometry::wgs84_wkt;
use verdine::{
    compute_index, crop, merge_products, normalized_difference, process_scenes,
    read_raster, render_products, resolve_aoi, write_raster, AoiSpec, BoundingBox,
    CancelToken, GeoTransform, IndexKind, ProcessParams, ProductLocator, Raster,
    SensorFamily,
};

const PIXEL: f64 = 0.01;
const SIZE: usize = 20;
const NODATA: f64 = -9999.0;

/// Write one synthetic Landsat ARD scene directory with constant-valued
/// bands. `band_values` holds (suffix, value) pairs; a `None` value marks a
/// nodata pixel punched into the band at (0, 0).
fn write_landsat_scene(
    root: &Path,
    scene_id: &str,
    origin_lon: f64,
    bands: &[(&str, f32, bool)],
) -> PathBuf {
    let scene_dir = root.join(scene_id);
    std::fs::create_dir_all(&scene_dir).expect("Failed to create scene dir");

    for &(suffix, value, punch_nodata) in bands {
        let mut data = Array2::<f32>::from_elem((SIZE, SIZE), value);
        if punch_nodata {
            data[[0, 0]] = NODATA as f32;
        }
        let raster = Raster {
            data,
            transform: GeoTransform {
                top_left_x: origin_lon,
                pixel_width: PIXEL,
                rotation_x: 0.0,
                top_left_y: 40.0,
                rotation_y: 0.0,
                pixel_height: -PIXEL,
            },
            crs_wkt: wgs84_wkt().expect("Failed to build WGS84 WKT"),
            nodata: Some(NODATA),
        };
        let path = scene_dir.join(format!("{}_{}.TIF", scene_id, suffix));
        write_raster(&path, &raster).expect("Failed to write band");
    }

    scene_dir
}

fn complete_bands(red: f32, nir: f32, swir1: f32, swir2: f32) -> Vec<(&'static str, f32, bool)> {
    vec![
        ("SR_B4", red, false),
        ("SR_B5", nir, false),
        ("SR_B6", swir1, false),
        ("SR_B7", swir2, false),
    ]
}

#[test]
fn test_full_pipeline_with_missing_band_scene() {
    let raw = tempfile::tempdir().expect("Failed to create raw dir");
    let processed = tempfile::tempdir().expect("Failed to create processed dir");

    // Complete scene with one nodata pixel punched into the red band
    let mut bands_a = complete_bands(0.1, 0.8, 0.3, 0.2);
    bands_a[0].2 = true;
    write_landsat_scene(
        raw.path(),
        "LC08_CU_003008_20210710_20210719_02",
        -105.0,
        &bands_a,
    );
    // Second complete scene
    write_landsat_scene(
        raw.path(),
        "LC08_CU_003009_20210710_20210719_02",
        -104.9,
        &complete_bands(0.2, 0.6, 0.2, 0.1),
    );
    // Scene with no NIR band: every index is uncomputable
    write_landsat_scene(
        raw.path(),
        "LC08_CU_003010_20210710_20210719_02",
        -104.8,
        &[("SR_B4", 0.2, false), ("SR_B6", 0.3, false), ("SR_B7", 0.2, false)],
    );

    let locator = ProductLocator::new(raw.path(), SensorFamily::Landsat8);
    let scenes = locator.locate_all().expect("Failed to locate scenes");
    assert_eq!(scenes.len(), 3);

    let summary = process_scenes(&scenes, processed.path(), &ProcessParams::default());
    println!("Summary: {}", summary);

    assert_eq!(summary.succeeded.len(), 2);
    assert_eq!(summary.failed.len(), 0);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].id, "LC08_CU_003010_20210710_20210719_02");
    assert!(summary.skipped[0].reason.contains("NIR"));

    // The skipped scene must not leave a product directory behind
    assert!(!processed
        .path()
        .join("LC08_CU_003010_20210710_20210719_02")
        .exists());

    // Spot-check the first scene's products
    let scene_a = processed.path().join("LC08_CU_003008_20210710_20210719_02");
    let ndvi = read_raster(scene_a.join("ndvi.tif")).expect("Failed to read NDVI");
    let ndmi = read_raster(scene_a.join("ndmi.tif")).expect("Failed to read NDMI");
    let nbr = read_raster(scene_a.join("nbr.tif")).expect("Failed to read NBR");

    assert_eq!(ndvi.data.dim(), (SIZE, SIZE));
    assert_relative_eq!(ndvi.data[[5, 5]], (0.8 - 0.1) / (0.8 + 0.1), epsilon = 1e-5);
    assert_relative_eq!(ndmi.data[[5, 5]], (0.8 - 0.3) / (0.8 + 0.3), epsilon = 1e-5);
    assert_relative_eq!(nbr.data[[5, 5]], (0.8 - 0.2) / (0.8 + 0.2), epsilon = 1e-5);

    // Nodata in the red band propagates into NDVI
    assert!(ndvi.data[[0, 0]].is_nan());
    // Index values stay in the normalized-difference range
    for &v in ndvi.data.iter().filter(|v| !v.is_nan()) {
        assert!((-1.0..=1.0).contains(&v));
    }
}

#[test]
fn test_crop_equivalence_with_band_level_crop() {
    let raw = tempfile::tempdir().expect("Failed to create raw dir");
    let processed = tempfile::tempdir().expect("Failed to create processed dir");

    let scene_id = "LC08_CU_003008_20210710_20210719_02";
    write_landsat_scene(raw.path(), scene_id, -105.0, &complete_bands(0.15, 0.75, 0.3, 0.2));

    let aoi = resolve_aoi(&AoiSpec {
        bbox: Some(BoundingBox {
            min_lon: -104.95,
            max_lon: -104.85,
            min_lat: 39.85,
            max_lat: 39.95,
        }),
        shapefile: None,
    })
    .expect("Failed to resolve AOI");

    let scenes = ProductLocator::new(raw.path(), SensorFamily::Landsat8)
        .locate_all()
        .expect("Failed to locate scenes");

    let params = ProcessParams {
        indices: vec![IndexKind::Ndvi],
        aoi: Some(aoi.clone()),
        ..Default::default()
    };
    let summary = process_scenes(&scenes, processed.path(), &params);
    assert_eq!(summary.succeeded.len(), 1);

    let cropped_output = read_raster(processed.path().join(scene_id).join("ndvi.tif"))
        .expect("Failed to read cropped NDVI");
    assert!(cropped_output.width() < SIZE);
    assert!(cropped_output.height() < SIZE);

    // Cropping bands first and computing over the window must match
    let scene = &scenes[0];
    let red = read_raster(scene.band_path(verdine::BandRole::Red).unwrap()).unwrap();
    let nir = read_raster(scene.band_path(verdine::BandRole::Nir).unwrap()).unwrap();
    let red_cropped = crop(&red, &aoi).expect("Failed to crop red band");
    let nir_cropped = crop(&nir, &aoi).expect("Failed to crop NIR band");
    let expected = normalized_difference(&nir_cropped, &red_cropped).unwrap();

    assert_eq!(cropped_output.data.dim(), expected.dim());
    for (a, b) in cropped_output.data.iter().zip(expected.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-6);
    }
}

#[test]
fn test_merge_of_processed_products() {
    let raw = tempfile::tempdir().expect("Failed to create raw dir");
    let processed = tempfile::tempdir().expect("Failed to create processed dir");

    // Two scenes overlapping by 10 of 20 columns
    let id_a = "LC08_CU_003008_20210710_20210719_02";
    let id_b = "LC08_CU_003009_20210710_20210719_02";
    write_landsat_scene(raw.path(), id_a, -105.0, &complete_bands(0.1, 0.8, 0.3, 0.2));
    write_landsat_scene(raw.path(), id_b, -104.9, &complete_bands(0.2, 0.6, 0.2, 0.1));

    let scenes = ProductLocator::new(raw.path(), SensorFamily::Landsat8)
        .locate_all()
        .expect("Failed to locate scenes");
    let summary = process_scenes(&scenes, processed.path(), &ProcessParams::default());
    assert_eq!(summary.succeeded.len(), 2);

    let written = merge_products(
        &[processed.path().join(id_a), processed.path().join(id_b)],
        processed.path(),
        "merged_20210710",
    )
    .expect("Failed to merge products");
    assert_eq!(written.len(), 3);

    let merged = read_raster(processed.path().join("merged_20210710").join("ndvi.tif"))
        .expect("Failed to read merged NDVI");

    // Union of [-105.0, -104.8] and [-104.9, -104.7] at 0.01 degrees
    assert_eq!(merged.data.dim(), (20, 30));

    let ndvi_a = (0.8 - 0.1) / (0.8 + 0.1);
    let ndvi_b: f32 = (0.6 - 0.2) / (0.6 + 0.2);
    assert_relative_eq!(merged.data[[10, 5]], ndvi_a, epsilon = 1e-5);
    // Overlap column: the last-listed product wins
    assert_relative_eq!(merged.data[[10, 15]], ndvi_b, epsilon = 1e-5);
    assert_relative_eq!(merged.data[[10, 25]], ndvi_b, epsilon = 1e-5);
}

#[test]
fn test_render_failures_stay_per_item() {
    let raw = tempfile::tempdir().expect("Failed to create raw dir");
    let processed = tempfile::tempdir().expect("Failed to create processed dir");

    let scene_id = "LC08_CU_003008_20210710_20210719_02";
    write_landsat_scene(raw.path(), scene_id, -105.0, &complete_bands(0.1, 0.8, 0.3, 0.2));

    let scenes = ProductLocator::new(raw.path(), SensorFamily::Landsat8)
        .locate_all()
        .expect("Failed to locate scenes");
    process_scenes(&scenes, processed.path(), &ProcessParams::default());

    let ndvi_path = processed.path().join(scene_id).join("ndvi.tif");
    let bogus_path = processed.path().join("no_such_scene").join("ndvi.tif");

    let results = render_products(&[ndvi_path, bogus_path], &Default::default());
    assert_eq!(results.len(), 2);

    let overlay = results[0].as_ref().expect("First product should render");
    assert_eq!(&overlay.png[..4], &[0x89, b'P', b'N', b'G']);
    assert_relative_eq!(overlay.bounds.min_lon, -105.0, epsilon = 1e-6);
    assert_relative_eq!(overlay.bounds.max_lon, -104.8, epsilon = 1e-6);
    assert_relative_eq!(overlay.bounds.min_lat, 39.8, epsilon = 1e-6);
    assert_relative_eq!(overlay.bounds.max_lat, 40.0, epsilon = 1e-6);

    assert!(results[1].is_err(), "Missing file must fail its own entry only");
}

#[test]
fn test_cancelled_run_starts_no_scenes() {
    let raw = tempfile::tempdir().expect("Failed to create raw dir");
    let processed = tempfile::tempdir().expect("Failed to create processed dir");

    write_landsat_scene(
        raw.path(),
        "LC08_CU_003008_20210710_20210719_02",
        -105.0,
        &complete_bands(0.1, 0.8, 0.3, 0.2),
    );

    let scenes = ProductLocator::new(raw.path(), SensorFamily::Landsat8)
        .locate_all()
        .expect("Failed to locate scenes");

    let cancel = CancelToken::new();
    cancel.cancel();
    let params = ProcessParams {
        cancel: Some(cancel),
        ..Default::default()
    };

    let summary = process_scenes(&scenes, processed.path(), &params);
    assert_eq!(summary.succeeded.len(), 0);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].reason.contains("cancelled"));
    assert!(!processed
        .path()
        .join("LC08_CU_003008_20210710_20210719_02")
        .exists());
}

#[test]
fn test_reprocessing_is_idempotent() {
    let raw = tempfile::tempdir().expect("Failed to create raw dir");
    let processed = tempfile::tempdir().expect("Failed to create processed dir");

    let scene_id = "LC08_CU_003008_20210710_20210719_02";
    write_landsat_scene(raw.path(), scene_id, -105.0, &complete_bands(0.1, 0.8, 0.3, 0.2));

    let scenes = ProductLocator::new(raw.path(), SensorFamily::Landsat8)
        .locate_all()
        .expect("Failed to locate scenes");

    process_scenes(&scenes, processed.path(), &ProcessParams::default());
    let first = read_raster(processed.path().join(scene_id).join("ndvi.tif")).unwrap();

    let summary = process_scenes(&scenes, processed.path(), &ProcessParams::default());
    assert_eq!(summary.succeeded.len(), 1);
    let second = read_raster(processed.path().join(scene_id).join("ndvi.tif")).unwrap();

    for (a, b) in first.data.iter().zip(second.data.iter()) {
        assert!((a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits());
    }
}

#[test]
fn test_direct_index_computation_from_located_scene() {
    let raw = tempfile::tempdir().expect("Failed to create raw dir");

    let scene_id = "LC09_CU_004009_20220301_20220310_02";
    let scene_dir = raw.path().join(scene_id);
    std::fs::create_dir_all(&scene_dir).unwrap();
    for (suffix, value) in [("SR_B4", 0.1f32), ("SR_B5", 0.9f32)] {
        let raster = Raster {
            data: Array2::from_elem((SIZE, SIZE), value),
            transform: GeoTransform {
                top_left_x: -105.0,
                pixel_width: PIXEL,
                rotation_x: 0.0,
                top_left_y: 40.0,
                rotation_y: 0.0,
                pixel_height: -PIXEL,
            },
            crs_wkt: wgs84_wkt().unwrap(),
            nodata: Some(NODATA),
        };
        write_raster(scene_dir.join(format!("{}_{}.TIF", scene_id, suffix)), &raster).unwrap();
    }

    let scenes = ProductLocator::new(raw.path(), SensorFamily::Landsat9)
        .locate_all()
        .expect("Failed to locate scenes");
    assert_eq!(scenes.len(), 1);

    let index = compute_index(IndexKind::Ndvi, &scenes[0]).expect("Failed to compute NDVI");
    assert_eq!(index.kind, IndexKind::Ndvi);
    assert_relative_eq!(index.raster.data[[3, 3]], 0.8, epsilon = 1e-5);

    // NDMI needs SWIR1, which this scene lacks
    match compute_index(IndexKind::Ndmi, &scenes[0]) {
        Err(verdine::IndexError::MissingBand { role, .. }) => {
            assert_eq!(role, verdine::BandRole::Swir1);
        }
        other => panic!("expected missing band error, got {:?}", other.map(|_| ())),
    }
}
