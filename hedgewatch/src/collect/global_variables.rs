use std::path::PathBuf;

pub const TEMP_PATH: &str = "./temp";

/// ArcGIS World Imagery Wayback tile service
pub const WAYBACK_BASE_URL: &str =
    "https://wayback.maptiles.arcgis.com/arcgis/rest/services/World_Imagery/MapServer";

/// The Wayback CDN only serves requests that look like they come from the Living Atlas viewer
pub const WAYBACK_REFERER: &str = "https://livingatlas.arcgis.com/";
pub const WAYBACK_ORIGIN: &str = "https://livingatlas.arcgis.com";
pub const WAYBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";

pub const DEFAULT_INFERENCE_URL: &str = "https://detect.roboflow.com";

pub const DEFAULT_ZOOM: u8 = 18;
pub const DEFAULT_TRACKED_CLASS: &str = "hedge";
pub const DEFAULT_COUNTY: &str = "Cork";
pub const DEFAULT_DESCRIPTION_SUFFIX: &str = "Illegal trimming of hedges";

/// Wayback releases compared by default: (capture date, release id)
pub const DEFAULT_VERSIONS: [(&str, &str); 2] = [("2024-03-07", "60013"), ("2023-02-23", "57965")];

pub fn get_temp_path() -> PathBuf {
    PathBuf::from(TEMP_PATH)
}
