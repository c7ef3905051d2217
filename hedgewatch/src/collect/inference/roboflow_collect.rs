use std::fmt;
use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::commons::basic_functions::encode_base64;
use crate::error::DetectionError;

/// Hosted model identifier, rendered as `project/version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelId {
    pub project_id: String,
    pub version: u32,
}

impl ModelId {
    pub fn new(project_id: impl Into<String>, version: u32) -> Self {
        ModelId {
            project_id: project_id.into(),
            version,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.version)
    }
}

/// Object-detection backend
///
/// Receives an opaque RGB image and returns the provider's raw JSON answer;
/// normalisation into detections happens in
/// [`DetectionAdapter`](crate::geometric::detection::DetectionAdapter).
pub trait InferenceProvider: Send + Sync {
    fn infer(&self, image: &RgbImage, model: &ModelId) -> Result<serde_json::Value, DetectionError>;
}

/// JPEG + base64 body expected by the hosted inference endpoint
pub fn encode_upload(image: &RgbImage) -> Result<String, DetectionError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Jpeg)?;
    Ok(encode_base64(buffer.get_ref()))
}

pub fn inference_url(api_url: &str, model: &ModelId, api_key: &str) -> String {
    format!(
        "{}/{}/{}?api_key={}",
        api_url.trim_end_matches('/'),
        model.project_id,
        model.version,
        urlencoding::encode(api_key)
    )
}

#[cfg(feature = "reqwest")]
pub use http::RoboflowCollect;

#[cfg(feature = "reqwest")]
mod http {
    use std::time::Duration;

    use log::{debug, info};
    use reqwest::blocking::Client;
    use reqwest::header::CONTENT_TYPE;

    use super::{encode_upload, inference_url, InferenceProvider, ModelId};
    use crate::config::InferenceConfig;
    use crate::error::{ClientError, ConfigError, DetectionError};

    /// Client for the hosted Roboflow detection API
    pub struct RoboflowCollect {
        client: Client,
        api_url: String,
        api_key: String,
    }

    impl RoboflowCollect {
        pub fn new(config: &InferenceConfig) -> Result<Self, ClientError> {
            let api_key = match config.api_key.as_deref().map(str::trim) {
                Some(key) if !key.is_empty() => key.to_string(),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "inference.api_key".to_string(),
                        message: "an API key is required, set API_KEY".to_string(),
                    }
                    .into())
                }
            };
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?;

            Ok(RoboflowCollect {
                client,
                api_url: config.api_url.clone(),
                api_key,
            })
        }
    }


    impl InferenceProvider for RoboflowCollect {
        fn infer(
            &self,
            image: &image::RgbImage,
            model: &ModelId,
        ) -> Result<serde_json::Value, DetectionError> {
            let body = encode_upload(image)?;
            let request_url = inference_url(&self.api_url, model, &self.api_key);
            info!(
                "Inference request for model {} ({}x{})",
                model,
                image.width(),
                image.height()
            );

            let response = self
                .client
                .post(&request_url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)
                .send()
                .map_err(|e| DetectionError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().unwrap_or_default();
                return Err(DetectionError::Transport(format!(
                    "inference API returned {}: {}",
                    status, text
                )));
            }

            let payload: serde_json::Value = response
                .json()
                .map_err(|e| DetectionError::Provider(format!("response is not JSON: {}", e)))?;
            debug!("Inference response received for model {}", model);
            Ok(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::Rgb;

    #[test]
    fn test_model_id_display() {
        assert_eq!(ModelId::new("hedge-detect", 3).to_string(), "hedge-detect/3");
    }

    #[test]
    fn test_inference_url_encodes_key() {
        let url = inference_url(
            "https://detect.example.test/",
            &ModelId::new("hedges", 2),
            "a b&c",
        );
        assert_eq!(url, "https://detect.example.test/hedges/2?api_key=a%20b%26c");
    }

    #[test]
    fn test_upload_is_base64_jpeg() {
        let image = RgbImage::from_pixel(8, 8, Rgb([40, 120, 40]));
        let body = encode_upload(&image).unwrap();
        let bytes = STANDARD.decode(body.trim()).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
