use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collect::global_variables::{
    DEFAULT_COUNTY, DEFAULT_DESCRIPTION_SUFFIX, DEFAULT_INFERENCE_URL, DEFAULT_TRACKED_CLASS,
    DEFAULT_VERSIONS, DEFAULT_ZOOM, WAYBACK_BASE_URL, WAYBACK_ORIGIN, WAYBACK_REFERER,
    WAYBACK_USER_AGENT,
};
use crate::collect::inference::ModelId;
use crate::error::ConfigError;
use crate::geo_core::MAX_ZOOM;
use crate::report::version_set::VersionSet;

/// Settings for one deployment of the scanner
///
/// Loaded from TOML; every field has a default so a partial file (or none) works.
/// Credentials are usually supplied through the environment, see
/// [`ScanConfig::apply_env_overrides`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub zoom: u8,
    /// Detection class compared between the two captures
    pub tracked_class: String,
    /// Run the two (fetch, detect) branches concurrently
    pub parallel: bool,
    pub versions: Vec<VersionEntry>,
    pub wayback: WaybackConfig,
    pub inference: InferenceConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Capture date, `YYYY-MM-DD`
    pub label: String,
    /// Wayback release id
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaybackConfig {
    pub base_url: String,
    pub referer: String,
    pub origin: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub project_id: String,
    pub model_version: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub county: String,
    /// Appended after the severity in the stored description
    pub description_suffix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            zoom: DEFAULT_ZOOM,
            tracked_class: DEFAULT_TRACKED_CLASS.to_string(),
            parallel: false,
            versions: DEFAULT_VERSIONS
                .iter()
                .map(|(label, version)| VersionEntry {
                    label: label.to_string(),
                    version: version.to_string(),
                })
                .collect(),
            wayback: WaybackConfig::default(),
            inference: InferenceConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for WaybackConfig {
    fn default() -> Self {
        WaybackConfig {
            base_url: WAYBACK_BASE_URL.to_string(),
            referer: WAYBACK_REFERER.to_string(),
            origin: WAYBACK_ORIGIN.to_string(),
            user_agent: WAYBACK_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            api_url: DEFAULT_INFERENCE_URL.to_string(),
            api_key: None,
            project_id: String::new(),
            model_version: 1,
            timeout_secs: 60,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            county: DEFAULT_COUNTY.to_string(),
            description_suffix: DEFAULT_DESCRIPTION_SUFFIX.to_string(),
        }
    }
}

impl ScanConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = ScanConfig::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override inference settings from `API_KEY`, `API_URL`, `PROJECT_ID`
    /// and `MODEL_VERSION` as returned by `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("API_KEY") {
            self.inference.api_key = Some(api_key);
        }
        if let Some(api_url) = lookup("API_URL") {
            self.inference.api_url = api_url;
        }
        if let Some(project_id) = lookup("PROJECT_ID") {
            self.inference.project_id = project_id;
        }
        if let Some(model_version) = lookup("MODEL_VERSION") {
            self.inference.model_version =
                model_version
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "MODEL_VERSION".to_string(),
                        message: format!("'{}' is not a positive integer", model_version),
                    })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zoom > MAX_ZOOM {
            return Err(ConfigError::InvalidValue {
                key: "zoom".to_string(),
                message: format!("must be at most {}", MAX_ZOOM),
            });
        }
        if self.tracked_class.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "tracked_class".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        self.version_set().map(|_| ())
    }

    pub fn version_set(&self) -> Result<VersionSet, ConfigError> {
        VersionSet::new(
            self.versions
                .iter()
                .map(|entry| (entry.label.clone(), entry.version.clone())),
        )
    }

    pub fn model_id(&self) -> ModelId {
        ModelId::new(self.inference.project_id.clone(), self.inference.model_version)
    }
}
