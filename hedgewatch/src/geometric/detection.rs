use geo::{LineString, Polygon};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::collect::inference::{InferenceProvider, ModelId};
use crate::commons::raster::RasterImage;
use crate::error::DetectionError;

/// One object found by the inference provider, in pixel space
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub class_label: String,
    pub polygon: Polygon<f64>,
    pub confidence: Option<f64>,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, vertices: Vec<(f64, f64)>, confidence: Option<f64>) -> Self {
        Detection {
            class_label: class_label.into(),
            polygon: Polygon::new(LineString::from(vertices), vec![]),
            confidence,
        }
    }

    /// First vertex of the outline, where the class label is drawn
    pub fn anchor(&self) -> Option<(f64, f64)> {
        self.polygon.exterior().0.first().map(|c| (c.x, c.y))
    }
}

/// Detections for one image, in provider order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        DetectionSet { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    /// Detections of `class` in provider order
    pub fn of_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Detection> + 'a {
        self.detections
            .iter()
            .filter(move |detection| detection.class_label == class)
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<T: IntoIterator<Item = Detection>>(iter: T) -> Self {
        DetectionSet::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct PredictionPayload {
    predictions: Vec<RawPrediction>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    class: String,
    #[serde(default)]
    points: Option<Vec<RawPoint>>,
    #[serde(default)]
    confidence: Option<f64>,
    // Box-only models report a centre and extent instead of points
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    x: f64,
    y: f64,
}

impl RawPrediction {
    fn into_detection(self, position: usize) -> Result<Detection, DetectionError> {
        let vertices: Vec<(f64, f64)> = match (self.points, self.x, self.y, self.width, self.height) {
            (Some(points), ..) => points.into_iter().map(|p| (p.x, p.y)).collect(),
            (None, Some(x), Some(y), Some(width), Some(height)) => {
                let (half_w, half_h) = (width / 2.0, height / 2.0);
                vec![
                    (x - half_w, y - half_h),
                    (x + half_w, y - half_h),
                    (x + half_w, y + half_h),
                    (x - half_w, y + half_h),
                ]
            }
            _ => {
                return Err(DetectionError::Provider(format!(
                    "prediction {} ('{}') has neither points nor a bounding box",
                    position, self.class
                )))
            }
        };

        if vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(DetectionError::Provider(format!(
                "prediction {} ('{}') has a non-finite vertex",
                position, self.class
            )));
        }

        Ok(Detection::new(self.class, vertices, self.confidence))
    }
}

/// Normalise a provider response into a [`DetectionSet`].
///
/// An empty `predictions` array is a valid, empty result. A payload without
/// `predictions`, or with predictions of the wrong shape, is a provider error.
pub fn parse_predictions(payload: &serde_json::Value) -> Result<DetectionSet, DetectionError> {
    let parsed: PredictionPayload = serde_json::from_value(payload.clone())
        .map_err(|e| DetectionError::Provider(e.to_string()))?;

    parsed
        .predictions
        .into_iter()
        .enumerate()
        .map(|(position, prediction)| prediction.into_detection(position))
        .collect()
}

/// Runs the inference provider on an image and normalises its answer
pub struct DetectionAdapter<'a> {
    provider: &'a dyn InferenceProvider,
    model: &'a ModelId,
}

impl<'a> DetectionAdapter<'a> {
    pub fn new(provider: &'a dyn InferenceProvider, model: &'a ModelId) -> Self {
        DetectionAdapter { provider, model }
    }

    /// Detect objects on a copy of `image` flattened to opaque RGB
    pub fn detect(&self, image: &RasterImage) -> Result<DetectionSet, DetectionError> {
        let rgb = image.to_opaque_rgb();
        let payload = self.provider.infer(&rgb, self.model)?;
        let detections = parse_predictions(&payload)?;
        debug!(
            "Model {} returned {} detection(s)",
            self.model,
            detections.len()
        );
        Ok(detections)
    }
}
