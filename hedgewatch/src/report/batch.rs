use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::collect::inference::{InferenceProvider, ModelId};
use crate::commons::raster::RasterImage;
use crate::geometric::detection::{DetectionAdapter, DetectionSet};
use crate::geometric::hedge::{compare, LabeledDetections, PercentageChange};
use crate::render::overlay::{render, Overlay, RenderStyle, ORANGE};
use crate::report::builder::DIFFERENCE_ALPHA;
use crate::report::version_set::{DatedVersion, VersionSet};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Tile image named `{version}_{column}_{row}.{ext}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFile {
    pub version: String,
    pub column: u32,
    pub row: u32,
    pub path: PathBuf,
}

/// Split a file name into `(version, column, row)`
pub fn parse_tile_file_name(name: &str) -> Option<(String, u32, u32)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if !IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()) {
        return None;
    }
    let mut parts = stem.rsplitn(3, '_');
    let row = parts.next()?.parse().ok()?;
    let column = parts.next()?.parse().ok()?;
    let version = parts.next()?;
    if version.is_empty() {
        return None;
    }
    Some((version.to_string(), column, row))
}

/// Tile images of `dir` grouped by `(column, row)`; other files are ignored
pub fn group_tile_files(dir: &Path) -> Result<BTreeMap<(u32, u32), Vec<TileFile>>> {
    let mut groups: BTreeMap<(u32, u32), Vec<TileFile>> = BTreeMap::new();

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {:?}", dir))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match parse_tile_file_name(name) {
            Some((version, column, row)) => groups.entry((column, row)).or_default().push(TileFile {
                version,
                column,
                row,
                path,
            }),
            None => continue,
        }
    }

    Ok(groups)
}

/// Result for one tile position
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub column: u32,
    pub row: u32,
    pub percentage_change: PercentageChange,
    pub difference_area: f64,
    pub image_path: PathBuf,
    /// Written only when the difference is non-empty
    pub geojson_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: Vec<BatchEntry>,
    /// Positions left out, with the reason
    pub skipped: Vec<((u32, u32), String)>,
}

/// Compares pre-downloaded tile pairs from a folder
pub struct BatchScanner<'a> {
    inference: &'a dyn InferenceProvider,
    model: &'a ModelId,
    versions: &'a VersionSet,
    tracked_class: &'a str,
}

impl<'a> BatchScanner<'a> {
    pub fn new(
        inference: &'a dyn InferenceProvider,
        model: &'a ModelId,
        versions: &'a VersionSet,
        tracked_class: &'a str,
    ) -> Self {
        BatchScanner {
            inference,
            model,
            versions,
            tracked_class,
        }
    }

    /// Scan every complete pair in `input_dir` and write difference images to `output_dir`
    ///
    /// A pair that cannot be compared is skipped with a warning; only I/O on the
    /// folders themselves aborts the batch.
    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
        fs::create_dir_all(output_dir).with_context(|| format!("Failed to create {:?}", output_dir))?;

        let mut summary = BatchSummary::default();
        for ((column, row), files) in group_tile_files(input_dir)? {
            let pair = (
                self.find(&files, self.versions.before()),
                self.find(&files, self.versions.after()),
            );
            let (before, after) = match pair {
                (Some(before), Some(after)) => (before, after),
                _ => {
                    warn!("Skipping tile {}_{}: both versions are required", column, row);
                    summary
                        .skipped
                        .push(((column, row), "incomplete version pair".to_string()));
                    continue;
                }
            };

            match self.process_pair(before, after, output_dir) {
                Ok(Some(entry)) => summary.processed.push(entry),
                Ok(None) => summary
                    .skipped
                    .push(((column, row), "no tracked detection".to_string())),
                Err(e) => {
                    warn!("Skipping tile {}_{}: {:#}", column, row, e);
                    summary.skipped.push(((column, row), format!("{:#}", e)));
                }
            }
        }

        info!(
            "Batch finished: {} processed, {} skipped",
            summary.processed.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    fn find<'f>(&self, files: &'f [TileFile], version: &DatedVersion) -> Option<&'f TileFile> {
        files.iter().find(|file| file.version == version.version)
    }

    fn load(&self, file: &TileFile) -> Result<(RasterImage, DetectionSet)> {
        let bytes = fs::read(&file.path).with_context(|| format!("Failed to read {:?}", file.path))?;
        let image = RasterImage::from_bytes(&bytes).with_context(|| format!("Failed to decode {:?}", file.path))?;
        let detections = DetectionAdapter::new(self.inference, self.model)
            .detect(&image)
            .with_context(|| format!("Detection failed for {:?}", file.path))?;
        Ok((image, detections))
    }

    fn process_pair(&self, before: &TileFile, after: &TileFile, output_dir: &Path) -> Result<Option<BatchEntry>> {
        let (_, before_detections) = self.load(before)?;
        let (after_image, after_detections) = self.load(after)?;

        let comparison = match compare(
            LabeledDetections {
                label: &self.versions.before().label,
                detections: &before_detections,
            },
            LabeledDetections {
                label: &self.versions.after().label,
                detections: &after_detections,
            },
            self.tracked_class,
        ) {
            Ok(comparison) => comparison,
            Err(e) => {
                warn!("Skipping tile {}_{} due to no predictions: {}", after.column, after.row, e);
                return Ok(None);
            }
        };

        let after_annotated = render(
            &after_image,
            &Overlay::from(comparison.difference.clone()),
            &RenderStyle::filled(ORANGE, DIFFERENCE_ALPHA),
        )?;

        // same symmetric change the scan report carries
        let percent = comparison.percentage_change.value().unwrap_or(0.0) as i64;
        let image_path = output_dir.join(format!(
            "difference_{}_percent_{}_{}.png",
            percent, after.column, after.row
        ));
        after_annotated.write_to(&image_path)?;
        info!("Saved {:?}", image_path);

        let geojson_path = match comparison.difference.to_geojson() {
            Some(geometry) => {
                let path = output_dir.join(format!("difference_{}_{}.geojson", after.column, after.row));
                let feature = geojson::Feature {
                    bbox: None,
                    geometry: Some(geometry),
                    id: None,
                    properties: None,
                    foreign_members: None,
                };
                fs::write(&path, serde_json::to_string(&feature)?).with_context(|| format!("Failed to write {:?}", path))?;
                Some(path)
            }
            None => None,
        };

        Ok(Some(BatchEntry {
            column: after.column,
            row: after.row,
            percentage_change: comparison.percentage_change,
            difference_area: comparison.difference_area,
            image_path,
            geojson_path,
        }))
    }
}
