//! JSON service configuration.

use std::{fs, path::Path, sync::Arc, time::Duration};

use dimsnap_calib::{CalibrationParams, TargetSelection};
use dimsnap_detect::{DetectorChain, ExternalProcessDetector, ProcessStrategy};
use dimsnap_store::JsonFileStore;
use serde::{Deserialize, Serialize};

use crate::service::MeasureService;

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_DETECTION_TIMEOUT_MS: u64 = 30_000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything needed to build a [`MeasureService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub max_image_bytes: usize,
    /// Budget for the whole detection step, all strategies included.
    pub detection_timeout_ms: u64,
    /// Synthesise detections when no back end succeeds.
    pub allow_fallback: bool,
    pub persist_fallback_results: bool,
    /// Draw detections onto the upload when the back end returns no image.
    pub annotate: bool,
    pub calibration: CalibrationParams,
    pub target_selection: TargetSelection,
    /// Tried in order.
    pub strategies: Vec<ProcessStrategy>,
    pub store_dir: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            detection_timeout_ms: DEFAULT_DETECTION_TIMEOUT_MS,
            allow_fallback: true,
            persist_fallback_results: false,
            annotate: true,
            calibration: CalibrationParams::default(),
            target_selection: TargetSelection::default(),
            strategies: Vec::new(),
            store_dir: None,
        }
    }
}

impl ServiceConfig {
    /// Load a JSON config from disk. Missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_image_bytes == 0 {
            return Err(ConfigError::Invalid("max_image_bytes must be > 0".into()));
        }
        if self.detection_timeout_ms == 0 {
            return Err(ConfigError::Invalid("detection_timeout_ms must be > 0".into()));
        }
        let c = &self.calibration;
        if !(c.aspect_tolerance.is_finite() && c.aspect_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "calibration.aspect_tolerance must be finite and >= 0, got {}",
                c.aspect_tolerance
            )));
        }
        if !(c.aspect_discount.is_finite() && c.aspect_discount >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "calibration.aspect_discount must be finite and >= 0, got {}",
                c.aspect_discount
            )));
        }
        for s in &self.strategies {
            if s.name.trim().is_empty() || s.program.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "every strategy needs a name and a program".into(),
                ));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    /// Detector chain with one worker per configured strategy.
    pub fn build_detector(&self) -> DetectorChain {
        self.strategies
            .iter()
            .cloned()
            .fold(DetectorChain::new(), |chain, s| {
                chain.with(ExternalProcessDetector::new(s))
            })
    }

    /// Assemble a service: detector chain from `strategies`, JSON-file store
    /// when `store_dir` is set.
    pub fn build_service(&self) -> MeasureService {
        let service = MeasureService::new(self.build_detector()).with_config(self.clone());
        match &self.store_dir {
            Some(dir) => service.with_store(Arc::new(JsonFileStore::with_root(dir))),
            None => service,
        }
    }
}
