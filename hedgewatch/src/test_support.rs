//! In-memory collaborators for unit tests

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};

use crate::collect::inference::{InferenceProvider, ModelId};
use crate::collect::wayback::wayback_collect::classify_status;
use crate::collect::wayback::TileProvider;
use crate::error::{DetectionError, PersistenceError, TileError};
use crate::geo_core::TileIndex;
use crate::report::store::{NewChangeReport, ReportId, ReportStore};

/// PNG bytes of a single-colour image
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// Prediction payload with one rectangular `hedge` per `(x, y, width, height)`
pub fn hedge_payload(rects: &[(f64, f64, f64, f64)]) -> Value {
    let predictions: Vec<Value> = rects
        .iter()
        .map(|(x, y, w, h)| {
            json!({
                "class": "hedge",
                "confidence": 0.9,
                "points": [
                    {"x": x, "y": y},
                    {"x": x + w, "y": y},
                    {"x": x + w, "y": y + h},
                    {"x": x, "y": y + h}
                ]
            })
        })
        .collect();
    json!({ "predictions": predictions })
}

/// Tiles served from memory by version; unknown versions are not found
#[derive(Default)]
pub struct StaticTiles {
    tiles: HashMap<String, Vec<u8>>,
    failures: HashMap<String, u16>,
}

impl StaticTiles {
    pub fn with(mut self, version: &str, bytes: Vec<u8>) -> Self {
        self.tiles.insert(version.to_string(), bytes);
        self
    }

    /// Answer `version` with an HTTP `status`
    pub fn fail(mut self, version: &str, status: u16) -> Self {
        self.failures.insert(version.to_string(), status);
        self
    }
}

impl TileProvider for StaticTiles {
    fn fetch_tile_bytes(&self, version: &str, index: &TileIndex) -> Result<Vec<u8>, TileError> {
        if let Some(status) = self.failures.get(version) {
            return Err(classify_status(*status, version, index));
        }
        self.tiles
            .get(version)
            .cloned()
            .ok_or_else(|| classify_status(404, version, index))
    }
}

/// Inference answers keyed on the colour of the image's top-left pixel
#[derive(Default)]
pub struct ScriptedInference {
    responses: Vec<([u8; 3], Value)>,
    calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn respond(mut self, rgb: [u8; 3], payload: Value) -> Self {
        self.responses.push((rgb, payload));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceProvider for ScriptedInference {
    fn infer(&self, image: &RgbImage, _model: &ModelId) -> Result<Value, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = image.get_pixel(0, 0).0;
        self.responses
            .iter()
            .find(|(rgb, _)| *rgb == key)
            .map(|(_, payload)| payload.clone())
            .ok_or_else(|| DetectionError::Transport(format!("no scripted response for {:?}", key)))
    }
}

/// Store that rejects every write
pub struct FailingStore;

impl ReportStore for FailingStore {
    fn save(&self, _report: &NewChangeReport) -> Result<ReportId, PersistenceError> {
        Err(PersistenceError::Rejected("store offline".to_string()))
    }
}
