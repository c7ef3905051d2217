pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod render;
pub mod report;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ScanConfig;
pub use error::{ErrorKind, ReportError};
pub use geo_core::{to_tile_index, BoundingBox, GeoCoordinate, TileIndex};
pub use report::builder::{ChangeReportBuilder, ReportOutcome, RequestContext};
