use crate::commons::basic_functions::encode_base64;
use crate::commons::raster::RasterImage;
use crate::error::TileError;
use crate::geo_core::TileIndex;

/// Source of historical imagery tiles keyed by (version, zoom, column, row)
///
/// Implementations enforce their own call timeouts and report them as
/// [`TileError::Transient`]. Published tiles are immutable, so callers may
/// cache on the same key.
pub trait TileProvider: Send + Sync {
    /// Raw encoded tile as served by the provider
    fn fetch_tile_bytes(&self, version: &str, index: &TileIndex) -> Result<Vec<u8>, TileError>;

    /// Fetch and decode a tile
    fn fetch_tile(&self, version: &str, index: &TileIndex) -> Result<RasterImage, TileError> {
        let bytes = self.fetch_tile_bytes(version, index)?;
        RasterImage::from_bytes(&bytes).map_err(|e| TileError::Provider {
            version: version.to_string(),
            index: *index,
            status: None,
            message: format!("tile payload is not a decodable image: {}", e),
        })
    }

    /// Fetch a tile as base64 text
    fn fetch_encoded_tile(&self, version: &str, index: &TileIndex) -> Result<String, TileError> {
        self.fetch_tile_bytes(version, index)
            .map(|bytes| encode_base64(&bytes))
    }
}

/// Map a non-success HTTP status onto the tile error taxonomy
pub fn classify_status(status: u16, version: &str, index: &TileIndex) -> TileError {
    match status {
        // The Wayback service answers "no data" with 404, some mirrors with 204
        204 | 404 => TileError::NotFound {
            version: version.to_string(),
            index: *index,
        },
        408 | 429 | 502 | 503 | 504 => TileError::Transient {
            version: version.to_string(),
            index: *index,
            message: format!("provider returned HTTP {}", status),
        },
        _ => TileError::Provider {
            version: version.to_string(),
            index: *index,
            status: Some(status),
            message: format!("unexpected HTTP status {}", status),
        },
    }
}

/// Build the Wayback tile URL; the service orders the path as zoom/row/column
pub fn tile_url(base_url: &str, version: &str, index: &TileIndex) -> String {
    format!(
        "{}/tile/{}/{}/{}/{}",
        base_url.trim_end_matches('/'),
        version,
        index.zoom,
        index.row,
        index.column
    )
}

#[cfg(feature = "reqwest")]
pub use http::WaybackCollect;

#[cfg(feature = "reqwest")]
mod http {
    use std::time::Duration;

    use log::{debug, info};
    use reqwest::blocking::Client;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER, USER_AGENT};

    use super::{classify_status, tile_url, TileProvider};
    use crate::config::WaybackConfig;
    use crate::error::{ClientError, ConfigError, TileError};
    use crate::geo_core::TileIndex;

    /// Tile collector for the ArcGIS World Imagery Wayback archive
    pub struct WaybackCollect {
        client: Client,
        base_url: String,
    }

    impl WaybackCollect {
        pub fn new(config: &WaybackConfig) -> Result<Self, ClientError> {
            let client = Client::builder()
                .default_headers(default_headers(config)?)
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?;

            Ok(WaybackCollect {
                client,
                base_url: config.base_url.clone(),
            })
        }

        fn transport_error(version: &str, index: &TileIndex, error: reqwest::Error) -> TileError {
            // a request that could not be built fails the same way every time
            let transient = !error.is_builder()
                && (error.is_timeout() || error.is_connect() || error.is_request() || error.is_body());
            if transient {
                TileError::Transient {
                    version: version.to_string(),
                    index: *index,
                    message: error.to_string(),
                }
            } else {
                TileError::Provider {
                    version: version.to_string(),
                    index: *index,
                    status: error.status().map(|s| s.as_u16()),
                    message: error.to_string(),
                }
            }
        }
    }

    fn default_headers(config: &WaybackConfig) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();
        let entries: [(HeaderName, &str, &str); 3] = [
            (REFERER, "wayback.referer", config.referer.as_str()),
            (ORIGIN, "wayback.origin", config.origin.as_str()),
            (USER_AGENT, "wayback.user_agent", config.user_agent.as_str()),
        ];
        for (name, key, value) in entries {
            let value = HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("not a valid header value: {}", e),
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    impl TileProvider for WaybackCollect {
        fn fetch_tile_bytes(&self, version: &str, index: &TileIndex) -> Result<Vec<u8>, TileError> {
            let request_url = tile_url(&self.base_url, version, index);
            info!("Request URL tile: {}", request_url);

            let response = self
                .client
                .get(&request_url)
                .send()
                .map_err(|e| Self::transport_error(version, index, e))?;

            let status = response.status();
            if status.as_u16() == 204 || !status.is_success() {
                return Err(classify_status(status.as_u16(), version, index));
            }

            let bytes = response
                .bytes()
                .map_err(|e| Self::transport_error(version, index, e))?;

            if bytes.is_empty() {
                return Err(TileError::Provider {
                    version: version.to_string(),
                    index: *index,
                    status: Some(status.as_u16()),
                    message: "empty tile body".to_string(),
                });
            }

            debug!("Fetched tile {}/{} ({} bytes)", version, index, bytes.len());
            Ok(bytes.to_vec())
        }
    }

}
