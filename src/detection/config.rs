//! Configuration for the detection loop

use super::error::{DetectionError, DetectionResult};
use super::template::TemplateStore;
use crate::device::ScanRegion;
use crate::template_matching::{MatchMethod, Preprocess};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables read by the worker at the start of every tick.
///
/// Durations are stored as fractional seconds in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Screen rectangle polled each tick; `None` until the user picks one
    pub scan_area: Option<ScanRegion>,
    /// Sleep between ticks
    #[serde(rename = "detection_frequency", with = "seconds")]
    pub poll_interval: Duration,
    /// A match must score strictly above this to trigger
    pub confidence_threshold: f32,
    /// Minimum time between two key presses
    #[serde(with = "seconds")]
    pub cooldown: Duration,
    /// Matching methods tried for every template, in order
    pub methods: Vec<MatchMethod>,
    pub stability_window: usize,
    pub stability_threshold: usize,
    pub preprocess: Vec<Preprocess>,
    /// Sleep after a failed capture or a missing scan area
    #[serde(with = "seconds")]
    pub capture_backoff: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scan_area: None,
            poll_interval: Duration::from_millis(100),
            confidence_threshold: 0.8,
            cooldown: Duration::from_millis(500),
            methods: vec![MatchMethod::Template],
            stability_window: 3,
            stability_threshold: 2,
            preprocess: Vec::new(),
            capture_backoff: Duration::from_secs(1),
        }
    }
}

impl DetectionConfig {
    pub fn with_scan_area(mut self, region: ScanRegion) -> Self {
        self.scan_area = Some(region);
        self
    }

    pub fn validate(&self) -> DetectionResult<()> {
        if self.poll_interval.is_zero() {
            return Err(DetectionError::invalid("poll interval must be greater than zero"));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            return Err(DetectionError::invalid(format!(
                "confidence threshold {} is outside (0, 1]",
                self.confidence_threshold
            )));
        }
        if self.methods.is_empty() {
            return Err(DetectionError::invalid("at least one match method is required"));
        }
        if self.stability_threshold == 0 {
            return Err(DetectionError::invalid("stability threshold must be at least 1"));
        }
        if self.stability_window < self.stability_threshold {
            return Err(DetectionError::invalid(format!(
                "stability window {} is smaller than stability threshold {}",
                self.stability_window, self.stability_threshold
            )));
        }
        match &self.scan_area {
            Some(region) if !region.is_valid() => {
                return Err(DetectionError::invalid(format!("scan area {region} is empty")));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Everything one tick reads: replaced wholesale on reload, never edited
/// in place while the worker holds it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSettings {
    pub config: DetectionConfig,
    pub templates: TemplateStore,
}

impl DetectionSettings {
    pub fn new(config: DetectionConfig, templates: TemplateStore) -> Self {
        Self { config, templates }
    }

    /// Checks `start()` performs before spawning the worker
    pub fn ensure_startable(&self) -> DetectionResult<()> {
        if self.config.scan_area.is_none() {
            return Err(DetectionError::ScanAreaUnset);
        }
        if self.templates.bound_count() == 0 {
            return Err(DetectionError::NoKeybinds);
        }
        self.config.validate()
    }
}

/// `Duration` <-> fractional seconds
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
