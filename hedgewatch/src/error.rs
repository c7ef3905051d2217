use serde::Serialize;
use thiserror::Error;

use crate::geo_core::TileIndex;
use crate::report::builder::ReportStage;

/// Machine-distinguishable error category surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    OutOfProjectionRange,
    TransientFetchError,
    TileNotFound,
    ProviderError,
    DetectionProviderError,
    InsufficientDetections,
    PersistenceError,
    RenderError,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("coordinate ({latitude}, {longitude}) is outside the Web Mercator range at zoom {zoom}")]
    OutOfProjectionRange {
        latitude: f64,
        longitude: f64,
        zoom: u8,
    },
}

/// Failure of the tile provider boundary
#[derive(Debug, Error)]
pub enum TileError {
    /// Network-level failure or timeout, the caller may retry
    #[error("transient failure fetching tile {version}/{index}: {message}")]
    Transient {
        version: String,
        index: TileIndex,
        message: String,
    },

    /// The provider explicitly has no imagery for this tile
    #[error("no imagery for tile {version}/{index}")]
    NotFound { version: String, index: TileIndex },

    /// Unexpected status or unusable payload
    #[error("tile provider error for {version}/{index}: {message}")]
    Provider {
        version: String,
        index: TileIndex,
        status: Option<u16>,
        message: String,
    },
}

impl TileError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TileError::Transient { .. })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TileError::Transient { .. } => ErrorKind::TransientFetchError,
            TileError::NotFound { .. } => ErrorKind::TileNotFound,
            TileError::Provider { .. } => ErrorKind::ProviderError,
        }
    }
}

/// Failure of the inference provider boundary
///
/// Every variant is fatal for the image it concerns.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Payload did not have the expected prediction shape
    #[error("malformed detection payload: {0}")]
    Provider(String),

    /// Request could not be completed (timeout, connection, non-2xx)
    #[error("inference request failed: {0}")]
    Transport(String),

    /// Image could not be encoded for upload
    #[error("failed to encode image for inference: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// At least one image has no detection of the tracked class
    #[error("no '{class}' detection in: {}", .missing.join(", "))]
    InsufficientDetections { class: String, missing: Vec<String> },
}

impl GeometryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InsufficientDetections
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to encode rendered image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to write rendered image: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load label font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("report store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("report store rejected the write: {0}")]
    Rejected(String),
}

impl PersistenceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PersistenceError
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid version set: {0}")]
    InvalidVersionSet(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failure constructing an HTTP collector
#[cfg(feature = "reqwest")]
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reason a scan was aborted
#[derive(Debug, Error)]
pub enum FailureReason {
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("failed to fetch tile for {label}: {source}")]
    TileFetchFailed {
        label: String,
        #[source]
        source: TileError,
    },

    #[error("detection failed for {label}: {source}")]
    DetectionFailed {
        label: String,
        #[source]
        source: DetectionError,
    },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("request cancelled")]
    Cancelled,
}

/// Terminal `Failed` state of a scan, with the stage it was reached from
#[derive(Debug, Error)]
#[error("scan failed while {stage}: {reason}")]
pub struct ReportError {
    pub stage: ReportStage,
    #[source]
    pub reason: FailureReason,
}

impl ReportError {
    pub fn new(stage: ReportStage, reason: FailureReason) -> Self {
        ReportError { stage, reason }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.reason {
            FailureReason::Projection(_) => ErrorKind::OutOfProjectionRange,
            FailureReason::TileFetchFailed { source, .. } => source.kind(),
            FailureReason::DetectionFailed { .. } => ErrorKind::DetectionProviderError,
            FailureReason::Render(_) => ErrorKind::RenderError,
            FailureReason::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the failure came from the caller's input rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::OutOfProjectionRange)
    }
}
