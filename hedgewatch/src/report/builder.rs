use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::collect::inference::{InferenceProvider, ModelId};
use crate::collect::wayback::TileProvider;
use crate::commons::basic_functions::round_to;
use crate::commons::raster::{EncodedImage, RasterImage};
use crate::config::ScanConfig;
use crate::error::{ConfigError, ErrorKind, FailureReason, GeometryError, PersistenceError, RenderError, ReportError};
use crate::geo_core::{GeoCoordinate, TileIndex};
use crate::geometric::detection::{DetectionAdapter, DetectionSet};
use crate::geometric::hedge::{compare, tracked_area, Comparison, LabeledDetections, PercentageChange, Region};
use crate::render::overlay::{render, Overlay, RenderStyle, BLUE, ORANGE};
use crate::report::store::{NewChangeReport, ReportId, ReportStatus, ReportStore};
use crate::report::version_set::{DatedVersion, VersionSet};

/// Fill opacity of the lost-hedge region on the later capture
pub const DIFFERENCE_ALPHA: f32 = 0.4;

/// Stage a scan is in; a failure carries the stage it was reached from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportStage {
    MappingCoordinate,
    FetchingTiles,
    Detecting,
    ComparingGeometry,
    Rendering,
    Persisting,
    Done,
}

impl fmt::Display for ReportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportStage::MappingCoordinate => "mapping coordinate",
            ReportStage::FetchingTiles => "fetching tiles",
            ReportStage::Detecting => "detecting",
            ReportStage::ComparingGeometry => "comparing geometry",
            ReportStage::Rendering => "rendering",
            ReportStage::Persisting => "persisting",
            ReportStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Shared flag a caller flips to abandon an in-flight scan
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-request context passed explicitly through the pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext {
            request_id: Uuid::new_v4(),
            cancellation: CancellationToken::default(),
        }
    }

    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        RequestContext {
            request_id: Uuid::new_v4(),
            cancellation,
        }
    }

    fn ensure_active(&self, stage: ReportStage) -> Result<(), ReportError> {
        if self.cancellation.is_cancelled() {
            warn!("[{}] cancelled before {}", self.request_id, stage);
            return Err(ReportError::new(stage, FailureReason::Cancelled));
        }
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        RequestContext::new()
    }
}

/// Measured change between the two captures of one tile
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub tile: TileIndex,
    pub before_label: String,
    pub after_label: String,
    pub difference_region: Region,
    pub difference_area: f64,
    pub percentage_change: PercentageChange,
    /// Summed area of every tracked detection, for logging and display only
    pub before_total_area: f64,
    pub after_total_area: f64,
    pub before_annotated_image: EncodedImage,
    pub after_annotated_image: EncodedImage,
    /// Set when one capture had no tracked detection and raw detections were drawn instead
    pub insufficient: Option<GeometryError>,
}

/// Severity stored with a report: the percentage change rounded to two
/// decimals, or 0 when the change is undefined
pub fn severity_from_change(change: PercentageChange) -> f64 {
    change.value().map(|value| round_to(value, 2)).unwrap_or(0.0)
}

/// Terminal `Done` state of a scan
///
/// A persistence failure does not discard the computed result; it is reported
/// alongside it.
#[derive(Debug)]
pub struct ReportOutcome {
    pub request_id: Uuid,
    pub coordinate: GeoCoordinate,
    pub result: ChangeResult,
    pub severity: f64,
    pub description: String,
    pub persistence: Result<ReportId, PersistenceError>,
}

impl ReportOutcome {
    pub fn report_id(&self) -> Option<&ReportId> {
        self.persistence.as_ref().ok()
    }

    pub fn to_response(&self) -> ScanResponse {
        let mut processed_images = BTreeMap::new();
        processed_images.insert(
            self.result.before_label.clone(),
            self.result.before_annotated_image.to_base64(),
        );
        processed_images.insert(
            self.result.after_label.clone(),
            self.result.after_annotated_image.to_base64(),
        );

        ScanResponse {
            request_id: self.request_id.to_string(),
            processed_images,
            new_id: self.report_id().map(|id| id.to_string()),
            difference: self.severity,
            percentage_change: self.result.percentage_change,
            persistence_error: self.persistence.as_ref().err().map(|e| e.to_string()),
        }
    }
}

/// JSON body returned to a scan caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResponse {
    pub request_id: String,
    /// Version label to base64 PNG
    pub processed_images: BTreeMap<String, String>,
    pub new_id: Option<String>,
    pub difference: f64,
    pub percentage_change: PercentageChange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

/// Error body returned to a scan caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub stage: ReportStage,
    pub message: String,
}

impl From<&ReportError> for ErrorResponse {
    fn from(error: &ReportError) -> Self {
        ErrorResponse {
            kind: error.kind(),
            stage: error.stage,
            message: error.to_string(),
        }
    }
}

/// Annotate both captures.
///
/// With a comparison, the earlier capture gets its detections outlined in blue
/// and the later one gets the lost region filled in orange. Without one, each
/// capture gets its own raw detections outlined.
pub fn render_pair(
    before_image: &RasterImage,
    before_detections: &DetectionSet,
    after_image: &RasterImage,
    after_detections: &DetectionSet,
    comparison: Option<&Comparison>,
) -> Result<(EncodedImage, EncodedImage), RenderError> {
    match comparison {
        Some(comparison) => {
            let before = render(
                before_image,
                &Overlay::from(before_detections.clone()),
                &RenderStyle::outline(BLUE),
            )?;
            let after = render(
                after_image,
                &Overlay::from(comparison.difference.clone()),
                &RenderStyle::filled(ORANGE, DIFFERENCE_ALPHA),
            )?;
            Ok((before, after))
        }
        None => {
            let before = render(
                before_image,
                &Overlay::from(before_detections.clone()),
                &RenderStyle::outline(ORANGE),
            )?;
            let after = render(
                after_image,
                &Overlay::from(after_detections.clone()),
                &RenderStyle::outline(BLUE),
            )?;
            Ok((before, after))
        }
    }
}

#[cfg(feature = "rayon")]
fn run_pair<A, B, FA, FB>(parallel: bool, before: FA, after: FB) -> (A, B)
where
    A: Send,
    B: Send,
    FA: FnOnce() -> A + Send,
    FB: FnOnce() -> B + Send,
{
    if parallel {
        rayon::join(before, after)
    } else {
        (before(), after())
    }
}

#[cfg(not(feature = "rayon"))]
fn run_pair<A, B, FA, FB>(_parallel: bool, before: FA, after: FB) -> (A, B)
where
    FA: FnOnce() -> A,
    FB: FnOnce() -> B,
{
    (before(), after())
}

/// Drives one scan from a coordinate to a persisted report
///
/// Collaborators are injected at construction; the builder holds no per-request
/// state and can serve concurrent requests.
pub struct ChangeReportBuilder {
    tiles: Box<dyn TileProvider>,
    inference: Box<dyn InferenceProvider>,
    store: Box<dyn ReportStore>,
    versions: VersionSet,
    model: ModelId,
    zoom: u8,
    tracked_class: String,
    county: String,
    description_suffix: String,
    parallel: bool,
}

impl ChangeReportBuilder {
    pub fn new(
        config: &ScanConfig,
        tiles: Box<dyn TileProvider>,
        inference: Box<dyn InferenceProvider>,
        store: Box<dyn ReportStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(ChangeReportBuilder {
            tiles,
            inference,
            store,
            versions: config.version_set()?,
            model: config.model_id(),
            zoom: config.zoom,
            tracked_class: config.tracked_class.clone(),
            county: config.report.county.clone(),
            description_suffix: config.report.description_suffix.clone(),
            parallel: config.parallel,
        })
    }

    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    pub fn describe(&self, severity: f64) -> String {
        format!("{:.2}% - {}", severity, self.description_suffix)
    }

    /// Run every stage for `coordinate`
    pub fn run(&self, ctx: &RequestContext, coordinate: GeoCoordinate) -> Result<ReportOutcome, ReportError> {
        let before = self.versions.before();
        let after = self.versions.after();

        let mut stage = ReportStage::MappingCoordinate;
        ctx.ensure_active(stage)?;
        let index = coordinate
            .tile_index(self.zoom)
            .map_err(|e| ReportError::new(stage, e.into()))?;
        info!(
            "[{}] Tile coordinates for lat: {}, lon: {} at zoom level {}: column {}, row {}",
            ctx.request_id, coordinate.latitude, coordinate.longitude, index.zoom, index.column, index.row
        );

        stage = ReportStage::FetchingTiles;
        ctx.ensure_active(stage)?;
        let (before_image, after_image) = run_pair(
            self.parallel,
            || self.fetch(stage, before, &index),
            || self.fetch(stage, after, &index),
        );
        let (before_image, after_image) = (before_image?, after_image?);

        stage = ReportStage::Detecting;
        ctx.ensure_active(stage)?;
        let adapter = DetectionAdapter::new(self.inference.as_ref(), &self.model);
        let (before_detections, after_detections) = run_pair(
            self.parallel,
            || detect(&adapter, stage, before, &before_image),
            || detect(&adapter, stage, after, &after_image),
        );
        let (before_detections, after_detections) = (before_detections?, after_detections?);

        stage = ReportStage::ComparingGeometry;
        ctx.ensure_active(stage)?;
        let before_total_area = tracked_area(&before_detections, &self.tracked_class);
        let after_total_area = tracked_area(&after_detections, &self.tracked_class);
        info!(
            "[{}] Total {} area: {} = {:.2}, {} = {:.2}",
            ctx.request_id, self.tracked_class, before.label, before_total_area, after.label, after_total_area
        );
        let comparison = compare(
            LabeledDetections {
                label: &before.label,
                detections: &before_detections,
            },
            LabeledDetections {
                label: &after.label,
                detections: &after_detections,
            },
            &self.tracked_class,
        );
        let (comparison, insufficient) = match comparison {
            Ok(comparison) => (Some(comparison), None),
            Err(e) => {
                warn!("[{}] {}, drawing raw detections instead", ctx.request_id, e);
                (None, Some(e))
            }
        };

        stage = ReportStage::Rendering;
        ctx.ensure_active(stage)?;
        let (before_annotated_image, after_annotated_image) = render_pair(
            &before_image,
            &before_detections,
            &after_image,
            &after_detections,
            comparison.as_ref(),
        )
        .map_err(|e| ReportError::new(stage, e.into()))?;

        let (difference_region, difference_area, percentage_change) = match comparison {
            Some(comparison) => (
                comparison.difference,
                comparison.difference_area,
                comparison.percentage_change,
            ),
            None => (Region::Empty, 0.0, PercentageChange::Undefined),
        };

        let result = ChangeResult {
            tile: index,
            before_label: before.label.clone(),
            after_label: after.label.clone(),
            difference_region,
            difference_area,
            percentage_change,
            before_total_area,
            after_total_area,
            before_annotated_image,
            after_annotated_image,
            insufficient,
        };

        stage = ReportStage::Persisting;
        ctx.ensure_active(stage)?;
        let severity = severity_from_change(result.percentage_change);
        let description = self.describe(severity);
        let report = NewChangeReport {
            description: description.clone(),
            coordinate,
            county: self.county.clone(),
            severity,
            status: ReportStatus::Pending,
            before_image: result.before_annotated_image.clone(),
            after_image: result.after_annotated_image.clone(),
        };
        let persistence = self.store.save(&report);
        match &persistence {
            Ok(id) => info!("[{}] Report {} created", ctx.request_id, id),
            Err(e) => warn!("[{}] Report not persisted: {}", ctx.request_id, e),
        }

        debug!("[{}] {}", ctx.request_id, ReportStage::Done);
        Ok(ReportOutcome {
            request_id: ctx.request_id,
            coordinate,
            result,
            severity,
            description,
            persistence,
        })
    }

    fn fetch(&self, stage: ReportStage, version: &DatedVersion, index: &TileIndex) -> Result<RasterImage, ReportError> {
        debug!("Fetching {} (release {}) tile {}", version.label, version.version, index);
        self.tiles.fetch_tile(&version.version, index).map_err(|source| {
            ReportError::new(
                stage,
                FailureReason::TileFetchFailed {
                    label: version.label.clone(),
                    source,
                },
            )
        })
    }
}

fn detect(
    adapter: &DetectionAdapter<'_>,
    stage: ReportStage,
    version: &DatedVersion,
    image: &RasterImage,
) -> Result<DetectionSet, ReportError> {
    adapter.detect(image).map_err(|source| {
        ReportError::new(
            stage,
            FailureReason::DetectionFailed {
                label: version.label.clone(),
                source,
            },
        )
    })
}
