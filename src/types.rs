use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Pixel value type used for all in-memory grids
pub type PixelValue = f32;

/// 2D raster grid (rows x cols)
pub type RasterGrid = Array2<PixelValue>;

/// Satellite sensor families with known product layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorFamily {
    Landsat8,
    Landsat9,
    Viirs,
}

impl SensorFamily {
    /// Filename token identifying a band role in this family's product layout.
    ///
    /// Landsat Collection ARD surface reflectance uses `SR_B<n>` suffixes
    /// (Landsat-8 and Landsat-9 share OLI band numbering); VIIRS VNP09GA uses
    /// the `SurfReflect_M<n>` moderate-resolution band naming.
    pub fn band_token(&self, role: BandRole) -> &'static str {
        match self {
            SensorFamily::Landsat8 | SensorFamily::Landsat9 => match role {
                BandRole::Blue => "SR_B2",
                BandRole::Green => "SR_B3",
                BandRole::Red => "SR_B4",
                BandRole::Nir => "SR_B5",
                BandRole::Swir1 => "SR_B6",
                BandRole::Swir2 => "SR_B7",
                BandRole::Qa => "QA_PIXEL",
            },
            SensorFamily::Viirs => match role {
                BandRole::Blue => "SurfReflect_M3",
                BandRole::Green => "SurfReflect_M4",
                BandRole::Red => "SurfReflect_M5",
                BandRole::Nir => "SurfReflect_M7",
                BandRole::Swir1 => "SurfReflect_M10",
                BandRole::Swir2 => "SurfReflect_M11",
                BandRole::Qa => "SurfReflect_QF",
            },
        }
    }
}

impl std::fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorFamily::Landsat8 => write!(f, "LANDSAT8"),
            SensorFamily::Landsat9 => write!(f, "LANDSAT9"),
            SensorFamily::Viirs => write!(f, "VIIRS"),
        }
    }
}

/// Spectral role of a band file within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandRole {
    Red,
    Green,
    Blue,
    Nir,
    Swir1,
    Swir2,
    Qa,
}

impl BandRole {
    /// All roles a locator attempts to resolve for a scene
    pub const ALL: [BandRole; 7] = [
        BandRole::Red,
        BandRole::Green,
        BandRole::Blue,
        BandRole::Nir,
        BandRole::Swir1,
        BandRole::Swir2,
        BandRole::Qa,
    ];
}

impl std::fmt::Display for BandRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BandRole::Red => write!(f, "RED"),
            BandRole::Green => write!(f, "GREEN"),
            BandRole::Blue => write!(f, "BLUE"),
            BandRole::Nir => write!(f, "NIR"),
            BandRole::Swir1 => write!(f, "SWIR1"),
            BandRole::Swir2 => write!(f, "SWIR2"),
            BandRole::Qa => write!(f, "QA"),
        }
    }
}

/// Normalized-difference spectral indices the processor can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Ndvi,
    Ndmi,
    Nbr,
}

impl IndexKind {
    /// All computable index kinds, in processing order
    pub const ALL: [IndexKind; 3] = [IndexKind::Ndvi, IndexKind::Ndmi, IndexKind::Nbr];

    /// Band pair (a, b) feeding the normalized difference (a - b) / (a + b)
    pub fn band_pair(&self) -> (BandRole, BandRole) {
        match self {
            IndexKind::Ndvi => (BandRole::Nir, BandRole::Red),
            IndexKind::Ndmi => (BandRole::Nir, BandRole::Swir1),
            IndexKind::Nbr => (BandRole::Nir, BandRole::Swir2),
        }
    }

    /// Lowercase stem used for output filenames
    pub fn file_stem(&self) -> &'static str {
        match self {
            IndexKind::Ndvi => "ndvi",
            IndexKind::Ndmi => "ndmi",
            IndexKind::Nbr => "nbr",
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Ndvi => write!(f, "NDVI"),
            IndexKind::Ndmi => write!(f, "NDMI"),
            IndexKind::Nbr => write!(f, "NBR"),
        }
    }
}

/// Geographic bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Geospatial transformation parameters (GDAL affine order)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// World coordinates of a pixel's upper-left corner
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates (col, row) of a world point.
    ///
    /// Only valid for north-up transforms (zero rotation terms), which is all
    /// the supported product layouts produce.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (col, row)
    }

    /// Extent (min_x, min_y, max_x, max_y) of a grid with these dimensions
    pub fn extent(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_world(0.0, 0.0);
        let (x1, y1) = self.pixel_to_world(width as f64, height as f64);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// One satellite acquisition: identifier, sensor family, and its band files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub sensor: SensorFamily,
    pub acquired: Option<NaiveDate>,
    pub bands: HashMap<BandRole, PathBuf>,
    pub dir: PathBuf,
}

impl Scene {
    pub fn band_path(&self, role: BandRole) -> Option<&Path> {
        self.bands.get(&role).map(|p| p.as_path())
    }

    /// Whether every band required for the given index is present
    pub fn has_bands_for(&self, kind: IndexKind) -> bool {
        let (a, b) = kind.band_pair();
        self.bands.contains_key(&a) && self.bands.contains_key(&b)
    }
}

/// Georeferenced single-band raster held in memory
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: RasterGrid,
    pub transform: GeoTransform,
    pub crs_wkt: String,
    pub nodata: Option<f64>,
}

impl Raster {
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Whether a pixel value is the nodata sentinel (NaN always counts)
    pub fn is_nodata(&self, value: PixelValue) -> bool {
        if value.is_nan() {
            return true;
        }
        match self.nodata {
            Some(nd) => (value as f64 - nd).abs() < f64::EPSILON,
            None => false,
        }
    }

    /// Extent (min_x, min_y, max_x, max_y) in the raster's CRS
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        self.transform.extent(self.width(), self.height())
    }
}

/// Index raster: a raster tagged with the index kind it holds
#[derive(Debug, Clone)]
pub struct IndexRaster {
    pub kind: IndexKind,
    pub raster: Raster,
}

/// Resolved crop geometry: an envelope in a known reference frame.
///
/// Immutable once resolved; plain data so a worker pool can share it freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaOfInterest {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs_wkt: String,
}

/// Error types for index processing
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Scene {scene}: missing {role} band required for {kind}")]
    MissingBand {
        scene: String,
        role: BandRole,
        kind: IndexKind,
    },

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Crop error: {0}")]
    Crop(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid data format: {0}")]
    Invalid(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

/// Result type for index processing operations
pub type IndexResult<T> = Result<T, IndexError>;
