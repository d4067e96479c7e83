//! Configuration for the tracking pipeline

use crate::error::{Result, TangibleError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complexity of the landmark model. Accuracy and latency both go up with
/// the complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ModelComplexity {
    Lite,
    Full,
}

impl TryFrom<u8> for ModelComplexity {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ModelComplexity::Lite),
            1 => Ok(ModelComplexity::Full),
            other => Err(format!("model_complexity must be 0 or 1, got {}", other)),
        }
    }
}

impl From<ModelComplexity> for u8 {
    fn from(value: ModelComplexity) -> Self {
        match value {
            ModelComplexity::Lite => 0,
            ModelComplexity::Full => 1,
        }
    }
}

/// Options accepted by `TrackingPipeline::initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializeOptions {
    /// Maximum number of targets (hands) to detect
    pub max_targets: u32,
    /// Landmark model complexity
    pub model_complexity: ModelComplexity,
    /// Minimum confidence ([0.0, 1.0]) for a detection to count
    pub min_detection_confidence: f32,
    /// Minimum confidence ([0.0, 1.0]) for landmarks to count as tracked;
    /// below it detection runs again on the next frame
    pub min_tracking_confidence: f32,
    /// Device to open instead of the first enumerated one
    pub preferred_device_id: Option<String>,
}

impl Default for InitializeOptions {
    fn default() -> Self {
        Self {
            max_targets: 2,
            model_complexity: ModelComplexity::Full,
            min_detection_confidence: 0.2,
            min_tracking_confidence: 0.2,
            preferred_device_id: None,
        }
    }
}

impl InitializeOptions {
    /// Validate option bounds
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_targets == 0 {
            return Err("max_targets must be > 0".to_string());
        }

        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be between 0.0 and 1.0, got {}", name, value));
            }
        }

        Ok(())
    }
}

/// Pipeline runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Render ticks per second driving the dispatch loop
    pub frame_rate: u32,
    /// Ideal capture width requested from the camera
    pub width: u32,
    /// Ideal capture height requested from the camera
    pub height: u32,
    /// Upper bound on one detector call; `None` waits forever
    pub send_timeout_ms: Option<u64>,
    /// Capacity of the change-notification channels
    pub event_buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            width: 1280,
            height: 720,
            send_timeout_ms: Some(5000),
            event_buffer_size: 16,
        }
    }
}

impl PipelineConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.frame_rate == 0 || self.frame_rate > 240 {
            return Err("Frame rate must be between 1 and 240".to_string());
        }

        if self.width == 0 || self.height == 0 {
            return Err("Resolution must be non-zero".to_string());
        }

        if self.width > 7680 || self.height > 4320 {
            return Err("Resolution too large (max 8K)".to_string());
        }

        if self.send_timeout_ms == Some(0) {
            return Err("send_timeout_ms must be > 0 when set".to_string());
        }

        if self.event_buffer_size == 0 {
            return Err("event_buffer_size must be > 0".to_string());
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(source)
            .map_err(|e| TangibleError::Config(format!("Invalid pipeline config: {}", e)))?;
        config.validate().map_err(TangibleError::Config)?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
