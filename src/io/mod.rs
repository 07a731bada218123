//! I/O modules for reading and writing rasters, locating products, and
//! resolving crop geometries

pub mod geometry;
pub mod locator;
pub mod raster;

pub use geometry::{resolve_aoi, AoiSpec};
pub use locator::ProductLocator;
pub use raster::{read_raster, write_raster};
