use crate::types::{BandRole, IndexError, IndexResult, Scene, SensorFamily};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

/// Discovers downloaded scene directories under a raw-data root.
///
/// Each call to [`locate`](ProductLocator::locate) re-scans the directory; no
/// state is cached between calls, so newly downloaded scenes show up on the
/// next scan.
pub struct ProductLocator {
    root: PathBuf,
    sensor: SensorFamily,
}

impl ProductLocator {
    pub fn new<P: Into<PathBuf>>(root: P, sensor: SensorFamily) -> Self {
        Self {
            root: root.into(),
            sensor,
        }
    }

    /// Start a lazy scan over the scene directories under the root.
    ///
    /// Fails only when the root directory itself is missing; a scene
    /// directory with no recognizable band files is logged and skipped.
    pub fn locate(&self) -> IndexResult<SceneScan> {
        if !self.root.is_dir() {
            return Err(IndexError::Scan(format!(
                "Root directory does not exist: {}",
                self.root.display()
            )));
        }

        let mut scene_dirs = match self.sensor {
            SensorFamily::Landsat8 | SensorFamily::Landsat9 => subdirs(&self.root)?,
            SensorFamily::Viirs => self.viirs_granule_dirs()?,
        };
        scene_dirs.sort();

        log::debug!(
            "Scanning {} candidate scene directories under {}",
            scene_dirs.len(),
            self.root.display()
        );

        SceneScan::new(self.sensor, scene_dirs)
    }

    /// Scan the root and collect every located scene, sorted by identifier
    pub fn locate_all(&self) -> IndexResult<Vec<Scene>> {
        let mut scenes: Vec<Scene> = self.locate()?.collect();
        scenes.sort_by(|a, b| a.id.cmp(&b.id));
        log::info!(
            "Located {} {} scenes under {}",
            scenes.len(),
            self.sensor,
            self.root.display()
        );
        Ok(scenes)
    }

    /// VIIRS granules live one level deeper, under a product-version parent
    /// such as `VNP09GA.001`. The root may also point at the parent directly.
    fn viirs_granule_dirs(&self) -> IndexResult<Vec<PathBuf>> {
        let root_is_parent = self
            .root
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("VNP09GA"))
            .unwrap_or(false);

        if root_is_parent {
            return subdirs(&self.root);
        }

        let parents: Vec<PathBuf> = subdirs(&self.root)?
            .into_iter()
            .filter(|d| {
                d.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("VNP09GA"))
                    .unwrap_or(false)
            })
            .collect();

        if parents.is_empty() {
            // Tolerate a root that already holds granule directories
            return subdirs(&self.root);
        }

        let mut dirs = Vec::new();
        for parent in parents {
            dirs.extend(subdirs(&parent)?);
        }
        Ok(dirs)
    }
}

/// Lazy scene iterator produced by [`ProductLocator::locate`]
pub struct SceneScan {
    sensor: SensorFamily,
    pending: VecDeque<PathBuf>,
    band_patterns: Vec<(BandRole, Regex)>,
    date_pattern: Regex,
}

impl SceneScan {
    fn new(sensor: SensorFamily, scene_dirs: Vec<PathBuf>) -> IndexResult<Self> {
        let mut band_patterns = Vec::with_capacity(BandRole::ALL.len());
        for role in BandRole::ALL {
            // Token must not be followed by another digit, so SurfReflect_M1
            // style prefixes cannot shadow M10/M11.
            let pattern = format!(r"{}(\D|$)", regex::escape(sensor.band_token(role)));
            let re = Regex::new(&pattern)
                .map_err(|e| IndexError::Scan(format!("Bad band pattern: {}", e)))?;
            band_patterns.push((role, re));
        }

        let date_pattern = match sensor {
            SensorFamily::Landsat8 | SensorFamily::Landsat9 => Regex::new(r"_(\d{8})_"),
            SensorFamily::Viirs => Regex::new(r"doy(\d{4})(\d{3})"),
        }
        .map_err(|e| IndexError::Scan(format!("Bad date pattern: {}", e)))?;

        Ok(Self {
            sensor,
            pending: scene_dirs.into(),
            band_patterns,
            date_pattern,
        })
    }

    fn build_scene(&self, dir: &Path) -> Option<Scene> {
        let id = dir.file_name()?.to_str()?.to_string();

        let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_raster_file(p))
                .collect(),
            Err(e) => {
                log::warn!("Skipping unreadable scene directory {}: {}", dir.display(), e);
                return None;
            }
        };
        files.sort();

        let mut bands: HashMap<BandRole, PathBuf> = HashMap::new();
        for (role, pattern) in &self.band_patterns {
            let matches: Vec<&PathBuf> = files
                .iter()
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| pattern.is_match(n))
                        .unwrap_or(false)
                })
                .collect();

            match matches.len() {
                0 => {}
                1 => {
                    bands.insert(*role, matches[0].clone());
                }
                // QA layers legitimately come in several files (e.g. VNP09GA
                // QF1..QF7); spectral roles must be unambiguous or the scene
                // is skipped for indices that need them.
                _ if *role == BandRole::Qa => {
                    bands.insert(*role, matches[0].clone());
                }
                n => {
                    log::warn!(
                        "Scene {}: {} files match {} band, leaving role unresolved",
                        id,
                        n,
                        role
                    );
                }
            }
        }

        if bands.is_empty() {
            log::warn!(
                "Scene {}: no recognizable {} band files, skipping",
                id,
                self.sensor
            );
            return None;
        }

        let acquired = self.parse_date(&id).or_else(|| {
            bands
                .values()
                .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
                .find_map(|name| self.parse_date(name))
        });

        Some(Scene {
            id,
            sensor: self.sensor,
            acquired,
            bands,
            dir: dir.to_path_buf(),
        })
    }

    fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let caps = self.date_pattern.captures(text)?;
        match self.sensor {
            SensorFamily::Landsat8 | SensorFamily::Landsat9 => {
                NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d").ok()
            }
            SensorFamily::Viirs => {
                let year: i32 = caps.get(1)?.as_str().parse().ok()?;
                let doy: u32 = caps.get(2)?.as_str().parse().ok()?;
                NaiveDate::from_yo_opt(year, doy)
            }
        }
    }
}

impl Iterator for SceneScan {
    type Item = Scene;

    fn next(&mut self) -> Option<Scene> {
        while let Some(dir) = self.pending.pop_front() {
            if let Some(scene) = self.build_scene(&dir) {
                log::debug!(
                    "Located scene {} ({} bands resolved)",
                    scene.id,
                    scene.bands.len()
                );
                return Some(scene);
            }
        }
        None
    }
}

fn subdirs(dir: &Path) -> IndexResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| IndexError::Scan(format!("Cannot read {}: {}", dir.display(), e)))?;
    Ok(entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !n.starts_with('.'))
                    .unwrap_or(false)
        })
        .collect())
}

fn is_raster_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            e == "tif" || e == "tiff"
        })
        .unwrap_or(false)
}
