//! Detector capability and the adapter that publishes its results

use crate::config::{InitializeOptions, ModelComplexity};
use crate::error::{Result, TangibleError};
use crate::publisher::ResultPublisher;
use crate::stream::{LiveGeneration, VideoFrame};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Points per detected hand in the landmark model
pub const HAND_LANDMARK_COUNT: usize = 21;

/// One tracked point of a hand, normalized to the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl HandLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }
}

/// Landmarks of one hand, `HAND_LANDMARK_COUNT` points in model order
pub type HandLandmarks = Vec<HandLandmark>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandResults {
    pub multi_hand_landmarks: Vec<HandLandmarks>,
}

impl HandResults {
    /// Wrist point of each detected hand
    pub fn wrists(&self) -> impl Iterator<Item = &HandLandmark> {
        self.multi_hand_landmarks.iter().filter_map(|hand| hand.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerInputValue {
    pub name: String,
    /// Normalized input value in [0, 1]
    pub value: f64,
}

/// A named set of fiducial markers acting as one control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerGroup {
    pub name: String,
    pub anchor_present: bool,
    #[serde(default)]
    pub inputs: Vec<MarkerInputValue>,
}

impl MarkerGroup {
    pub fn input(&self, name: &str) -> Option<f64> {
        self.inputs
            .iter()
            .find(|input| input.name == name)
            .map(|input| input.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerResults {
    pub groups: Vec<MarkerGroup>,
}

impl MarkerResults {
    pub fn group(&self, name: &str) -> Option<&MarkerGroup> {
        self.groups.iter().find(|group| group.name == name)
    }
}

/// Detector payload for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionResult {
    Hands(HandResults),
    Markers(MarkerResults),
}

impl DetectionResult {
    /// True when the detector found no targets at all
    pub fn is_empty(&self) -> bool {
        match self {
            DetectionResult::Hands(hands) => {
                hands.multi_hand_landmarks.iter().all(|hand| hand.is_empty())
            }
            DetectionResult::Markers(markers) => markers.groups.is_empty(),
        }
    }

    pub fn as_hands(&self) -> Option<&HandResults> {
        match self {
            DetectionResult::Hands(hands) => Some(hands),
            _ => None,
        }
    }

    pub fn as_markers(&self) -> Option<&MarkerResults> {
        match self {
            DetectionResult::Markers(markers) => Some(markers),
            _ => None,
        }
    }
}

/// Options forwarded to the detector once at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOptions {
    pub max_targets: u32,
    pub model_complexity: ModelComplexity,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl From<&InitializeOptions> for DetectorOptions {
    fn from(options: &InitializeOptions) -> Self {
        Self {
            max_targets: options.max_targets,
            model_complexity: options.model_complexity,
            min_detection_confidence: options.min_detection_confidence,
            min_tracking_confidence: options.min_tracking_confidence,
        }
    }
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self::from(&InitializeOptions::default())
    }
}

pub type ResultCallback = Arc<dyn Fn(DetectionResult) + Send + Sync>;

/// The external detector: configure once, register one callback, then
/// send frames repeatedly. Not reentrant; callers keep one send in flight.
#[async_trait]
pub trait Detector: Send + Sync {
    fn configure(&self, options: &DetectorOptions) -> Result<()>;

    /// Register the result callback. Results may arrive before or after the
    /// matching `send` resolves.
    fn on_results(&self, callback: ResultCallback);

    /// Submit a frame. Resolving means the frame was accepted, not that a
    /// result was delivered.
    async fn send(&self, frame: &VideoFrame) -> Result<()>;
}

#[derive(Debug, Default)]
struct AdapterCounters {
    published: AtomicU64,
    stale: AtomicU64,
}

/// Wraps a [`Detector`] and turns its callbacks into publications
pub struct DetectorAdapter {
    detector: Arc<dyn Detector>,
    dispatch_generation: Arc<AtomicU64>,
    counters: Arc<AdapterCounters>,
}

impl DetectorAdapter {
    pub fn new(
        detector: Arc<dyn Detector>,
        options: &DetectorOptions,
        publisher: ResultPublisher,
        live: LiveGeneration,
    ) -> Result<Self> {
        detector
            .configure(options)
            .map_err(|e| TangibleError::Detector(format!("Failed to configure detector: {}", e)))?;

        let dispatch_generation = Arc::new(AtomicU64::new(0));
        let counters = Arc::new(AdapterCounters::default());

        let callback_generation = dispatch_generation.clone();
        let callback_counters = counters.clone();
        detector.on_results(Arc::new(move |result: DetectionResult| {
            let generation = callback_generation.load(Ordering::Acquire);
            if !live.is_current(generation) {
                callback_counters.stale.fetch_add(1, Ordering::Relaxed);
                debug!(generation, "Dropping result from a closed stream");
                return;
            }

            let value = if result.is_empty() { None } else { Some(result) };
            publisher.publish(value);
            callback_counters.published.fetch_add(1, Ordering::Relaxed);
        }));

        info!(
            max_targets = options.max_targets,
            model_complexity = ?options.model_complexity,
            "Detector configured"
        );

        Ok(Self {
            detector,
            dispatch_generation,
            counters,
        })
    }

    /// Forward `frame`, tagging results with the stream generation it came from
    pub async fn send(&self, frame: &VideoFrame, generation: u64) -> Result<()> {
        self.dispatch_generation.store(generation, Ordering::Release);
        self.detector.send(frame).await
    }

    /// Results written to the publisher so far
    pub fn published(&self) -> u64 {
        self.counters.published.load(Ordering::Relaxed)
    }

    /// Results dropped because their stream was closed or replaced
    pub fn stale(&self) -> u64 {
        self.counters.stale.load(Ordering::Relaxed)
    }
}
