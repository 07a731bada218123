use crate::core::crop::crop;
use crate::core::indices::compute_index;
use crate::io::raster::write_raster;
use crate::types::{AreaOfInterest, IndexError, IndexKind, Scene};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Best-effort cancellation flag shared with a running batch.
///
/// Cancelling stops new scenes from starting; scenes already in flight run
/// to completion so no partial product directories are left behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Which of the discovered scenes a run should process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum SceneSelection {
    #[default]
    All,
    Ids(Vec<String>),
}

impl SceneSelection {
    fn selects(&self, id: &str) -> bool {
        match self {
            SceneSelection::All => true,
            SceneSelection::Ids(ids) => ids.iter().any(|s| s == id),
        }
    }
}

/// Parameters for one processing run
#[derive(Debug, Clone)]
pub struct ProcessParams {
    /// Index kinds to compute per scene
    pub indices: Vec<IndexKind>,
    /// Scene selection within the discovered set
    pub selection: SceneSelection,
    /// Optional crop geometry, applied to each computed index raster
    pub aoi: Option<AreaOfInterest>,
    /// Process scenes on a worker pool (scenes are fully isolated)
    pub parallel: bool,
    /// Optional cancellation flag checked before each scene starts
    pub cancel: Option<CancelToken>,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            indices: IndexKind::ALL.to_vec(),
            selection: SceneSelection::All,
            aoi: None,
            parallel: true,
            cancel: None,
        }
    }
}

/// Per-item entry in a run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub id: String,
    pub reason: String,
}

/// Final per-run report: which scenes succeeded, were skipped, or failed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub succeeded: Vec<String>,
    pub skipped: Vec<ItemReport>,
    pub failed: Vec<ItemReport>,
}

impl ProcessSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }
}

impl std::fmt::Display for ProcessSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        for item in &self.skipped {
            write!(f, "\n  skipped {}: {}", item.id, item.reason)?;
        }
        for item in &self.failed {
            write!(f, "\n  failed {}: {}", item.id, item.reason)?;
        }
        Ok(())
    }
}

enum Outcome {
    Succeeded,
    Skipped(String),
    Failed(String),
}

/// Process the selected scenes into per-product index rasters.
///
/// For each selected scene and each requested index kind the index is
/// computed, optionally cropped (the crop is applied to the computed output,
/// not to the input bands, which is numerically equivalent and avoids
/// re-cropping every band), and written atomically to
/// `<output_root>/<scene-id>/<kind>.tif`. Re-running overwrites prior
/// output for the same (scene, kind) pair.
///
/// Per-scene failures are caught, logged with the scene identifier and
/// cause, and never abort the batch. A scene counts as `skipped` when every
/// requested kind lacked a required band (nothing was computable), `failed`
/// when any kind hit a compute/crop/write error, and `succeeded` only when
/// every requested kind was written.
pub fn process_scenes(
    scenes: &[Scene],
    output_root: &Path,
    params: &ProcessParams,
) -> ProcessSummary {
    let targets: Vec<&Scene> = scenes
        .iter()
        .filter(|s| params.selection.selects(&s.id))
        .collect();

    log::info!(
        "🛰️  Processing {} of {} discovered scenes into {}",
        targets.len(),
        scenes.len(),
        output_root.display()
    );

    let reports: Vec<(String, Outcome)> = if params.parallel {
        targets
            .par_iter()
            .map(|scene| (scene.id.clone(), process_one(scene, output_root, params)))
            .collect()
    } else {
        targets
            .iter()
            .map(|scene| (scene.id.clone(), process_one(scene, output_root, params)))
            .collect()
    };

    let summary = summarize(reports);
    log::info!("✅ Processing complete: {}", summary);
    summary
}

fn process_one(scene: &Scene, output_root: &Path, params: &ProcessParams) -> Outcome {
    if let Some(cancel) = &params.cancel {
        if cancel.is_cancelled() {
            log::warn!("Scene {}: cancelled before start", scene.id);
            return Outcome::Skipped("cancelled before start".to_string());
        }
    }

    let scene_dir = output_root.join(&scene.id);
    let mut errors: Vec<(IndexKind, IndexError)> = Vec::new();
    let mut written = 0usize;

    for &kind in &params.indices {
        match compute_and_write(scene, kind, &scene_dir, params) {
            Ok(()) => {
                log::debug!("Scene {}: wrote {}", scene.id, kind);
                written += 1;
            }
            Err(e) => {
                log::warn!("Scene {}: {} failed: {}", scene.id, kind, e);
                errors.push((kind, e));
            }
        }
    }

    if errors.is_empty() {
        return Outcome::Succeeded;
    }

    let reason = errors
        .iter()
        .map(|(kind, e)| format!("{}: {}", kind, e))
        .collect::<Vec<_>>()
        .join("; ");

    let all_missing = errors
        .iter()
        .all(|(_, e)| matches!(e, IndexError::MissingBand { .. }));

    if all_missing && written == 0 {
        Outcome::Skipped(reason)
    } else {
        Outcome::Failed(reason)
    }
}

fn compute_and_write(
    scene: &Scene,
    kind: IndexKind,
    scene_dir: &Path,
    params: &ProcessParams,
) -> Result<(), IndexError> {
    let mut index = compute_index(kind, scene)?;
    if let Some(aoi) = &params.aoi {
        index.raster = crop(&index.raster, aoi)?;
    }
    write_raster(
        scene_dir.join(format!("{}.tif", kind.file_stem())),
        &index.raster,
    )
}

fn summarize(reports: Vec<(String, Outcome)>) -> ProcessSummary {
    let mut summary = ProcessSummary::default();
    for (id, outcome) in reports {
        match outcome {
            Outcome::Succeeded => summary.succeeded.push(id),
            Outcome::Skipped(reason) => summary.skipped.push(ItemReport { id, reason }),
            Outcome::Failed(reason) => summary.failed.push(ItemReport { id, reason }),
        }
    }
    summary
}
