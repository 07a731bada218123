//! Verdine: A Fast, Modular Spectral Index Processor
//!
//! This library turns raw downloaded Landsat ARD and VIIRS VNP09GA scene
//! directories into processed spectral index products (NDVI, NDMI, NBR):
//! locating scenes and their band files, computing indices with safe
//! nodata handling, cropping to an area of interest, mosaicking processed
//! products, and rendering processed rasters into colormapped map overlays.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AreaOfInterest, BandRole, BoundingBox, GeoTransform, IndexError, IndexKind,
    IndexRaster, IndexResult, Raster, Scene, SensorFamily,
};

pub use io::{read_raster, resolve_aoi, write_raster, AoiSpec, ProductLocator};

pub use crate::core::{
    compute_index, crop, merge_products, merge_rasters, normalized_difference,
    process_scenes, render_products, CancelToken, Colormap, MapOverlay, ProcessParams,
    ProcessSummary, RenderParams, SceneSelection,
};
