pub mod batch;
pub mod builder;
pub mod store;
pub mod version_set;

pub use builder::{ChangeReportBuilder, ChangeResult, ReportOutcome, ReportStage, RequestContext, ScanResponse};
pub use store::{JsonDirStore, MemoryStore, ReportStore};
