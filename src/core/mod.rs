//! Core processing modules for spectral index products

pub mod crop;
pub mod indices;
pub mod merge;
pub mod process;
pub mod render;

// Re-export main types and functions
pub use crop::crop;
pub use indices::{compute_index, normalized_difference};
pub use merge::{merge_products, merge_rasters};
pub use process::{
    process_scenes, CancelToken, ProcessParams, ProcessSummary, SceneSelection,
};
pub use render::{render_products, render_raster, Colormap, MapOverlay, RenderParams};
