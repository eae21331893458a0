//! Classifier configuration
//!
//! Settings resolve in priority order:
//! 1. Command-line flags (applied by the caller on top of the loaded value)
//! 2. Environment variables (`VINE_VERIFY_URL`, `VINE_CLASSIFY_URL`)
//! 3. TOML file (path given explicitly or through `VINE_CONFIG`)
//! 4. Compiled-in defaults

use crate::asset::default_accepted_mime;
use crate::backend::{Endpoints, DEFAULT_CLASSIFY_URL, DEFAULT_VERIFY_URL};
use crate::core_modules::sequencer::{SequencerConfig, SURFACE_RETRY_DELAY};
use crate::core_modules::steps::{steps_with_dwell, PROCESSING_STEPS};
use crate::error::{Result, VineError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG: &str = "VINE_CONFIG";
pub const ENV_VERIFY_URL: &str = "VINE_VERIFY_URL";
pub const ENV_CLASSIFY_URL: &str = "VINE_CLASSIFY_URL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub verify_url: String,
    pub classify_url: String,
    pub connect_timeout_ms: Option<u64>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            classify_url: DEFAULT_CLASSIFY_URL.to_string(),
            connect_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Replaces every step's dwell when set.
    pub dwell_ms: Option<u64>,
    pub surface_retry_ms: u64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            canvas_width: 400,
            canvas_height: 300,
            dwell_ms: None,
            surface_retry_ms: SURFACE_RETRY_DELAY.as_millis() as u64,
            seed: SequencerConfig::default().seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub accepted_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            accepted_mime_types: default_accepted_mime(),
        }
    }
}

/// Everything needed to build an orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoints: EndpointConfig,
    pub simulation: SimulationConfig,
    pub upload: UploadConfig,
}

impl ClassifierConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        tracing::info!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Loads from `path`, else from `VINE_CONFIG`, else defaults; then applies
    /// environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let path: Option<PathBuf> = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::debug!("No configuration file; using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies endpoint overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_VERIFY_URL).filter(|url| !url.is_empty()) {
            tracing::debug!(url = %url, "Verify endpoint overridden from environment");
            self.endpoints.verify_url = url;
        }
        if let Some(url) = lookup(ENV_CLASSIFY_URL).filter(|url| !url.is_empty()) {
            tracing::debug!(url = %url, "Classify endpoint overridden from environment");
            self.endpoints.classify_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.simulation.canvas_width == 0 || self.simulation.canvas_height == 0 {
            return Err(VineError::Config("canvas dimensions must be non-zero".to_string()));
        }
        if self.simulation.dwell_ms == Some(0) {
            return Err(VineError::Config("dwell_ms must be positive".to_string()));
        }
        if self.upload.accepted_mime_types.is_empty() {
            return Err(VineError::Config("accepted_mime_types must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            verify_url: self.endpoints.verify_url.clone(),
            classify_url: self.endpoints.classify_url.clone(),
            connect_timeout: self.endpoints.connect_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        let steps = match self.simulation.dwell_ms {
            Some(ms) => steps_with_dwell(Duration::from_millis(ms)),
            None => PROCESSING_STEPS.to_vec(),
        };
        SequencerConfig {
            steps,
            surface_retry_delay: Duration::from_millis(self.simulation.surface_retry_ms),
            seed: self.simulation.seed,
        }
    }
}
