use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commons::raster::EncodedImage;
use crate::error::PersistenceError;
use crate::geo_core::GeoCoordinate;

/// Review state of a stored report; the scanner only ever creates `Pending`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Dismissed,
}

/// Identifier assigned by the store on creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportId(pub String);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Report as handed to the store, before an id exists
#[derive(Debug, Clone)]
pub struct NewChangeReport {
    pub description: String,
    pub coordinate: GeoCoordinate,
    pub county: String,
    pub severity: f64,
    pub status: ReportStatus,
    pub before_image: EncodedImage,
    pub after_image: EncodedImage,
}

/// Stored report
#[derive(Debug, Clone)]
pub struct ChangeReport {
    pub id: ReportId,
    pub description: String,
    pub coordinate: GeoCoordinate,
    pub county: String,
    pub severity: f64,
    pub status: ReportStatus,
    pub before_image: EncodedImage,
    pub after_image: EncodedImage,
}

impl ChangeReport {
    pub fn from_new(id: ReportId, report: &NewChangeReport) -> Self {
        ChangeReport {
            id,
            description: report.description.clone(),
            coordinate: report.coordinate,
            county: report.county.clone(),
            severity: report.severity,
            status: report.status,
            before_image: report.before_image.clone(),
            after_image: report.after_image.clone(),
        }
    }
}

/// Persistence boundary: one write per finished scan
pub trait ReportStore: Send + Sync {
    fn save(&self, report: &NewChangeReport) -> Result<ReportId, PersistenceError>;
}

impl<T: ReportStore + ?Sized> ReportStore for Arc<T> {
    fn save(&self, report: &NewChangeReport) -> Result<ReportId, PersistenceError> {
        (**self).save(report)
    }
}

/// In-process store with sequential ids
#[derive(Debug, Default)]
pub struct MemoryStore {
    reports: Mutex<Vec<ChangeReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn reports(&self) -> Vec<ChangeReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().map(|reports| reports.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportStore for MemoryStore {
    fn save(&self, report: &NewChangeReport) -> Result<ReportId, PersistenceError> {
        let mut reports = self
            .reports
            .lock()
            .map_err(|_| PersistenceError::Rejected("memory store lock poisoned".to_string()))?;
        let id = ReportId((reports.len() + 1).to_string());
        reports.push(ChangeReport::from_new(id.clone(), report));
        Ok(id)
    }
}

/// On-disk form written by [`JsonDirStore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: ReportId,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub county: String,
    pub severity: f64,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    /// base64 PNG
    pub before_img: String,
    /// base64 PNG
    pub after_img: String,
}

/// Store writing one `{id}.json` file per report into a directory
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonDirStore { dir: dir.into() }
    }

    fn path_for(&self, id: &ReportId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn load(&self, id: &ReportId) -> Result<StoredReport, PersistenceError> {
        let content = std::fs::read_to_string(self.path_for(id))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl ReportStore for JsonDirStore {
    fn save(&self, report: &NewChangeReport) -> Result<ReportId, PersistenceError> {
        std::fs::create_dir_all(&self.dir)?;

        let id = ReportId(Uuid::new_v4().to_string());
        let stored = StoredReport {
            id: id.clone(),
            description: report.description.clone(),
            latitude: report.coordinate.latitude,
            longitude: report.coordinate.longitude,
            county: report.county.clone(),
            severity: report.severity,
            status: report.status,
            created_at: Utc::now(),
            before_img: report.before_image.to_base64(),
            after_img: report.after_image.to_base64(),
        };

        let path = self.path_for(&id);
        std::fs::write(&path, serde_json::to_vec_pretty(&stored)?)?;
        info!("Report {} saved to {:?}", id, path);
        Ok(id)
    }
}
