//! Synthetic camera and detector for running without hardware

use crate::detector::{
    DetectionResult, Detector, DetectorOptions, HandLandmark, HandResults, ResultCallback,
    HAND_LANDMARK_COUNT,
};
use crate::device::MediaDeviceInfo;
use crate::error::{Result, TangibleError};
use crate::stream::{MediaPlatform, MediaStream, MediaTrack, VideoConstraints, VideoFrame};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Platform exposing a fixed list of fake cameras
pub struct SyntheticPlatform {
    cameras: Vec<MediaDeviceInfo>,
    frame_interval: Duration,
}

impl SyntheticPlatform {
    pub fn new(camera_count: usize, fps: u32) -> Self {
        let cameras = (0..camera_count)
            .map(|i| MediaDeviceInfo::video(format!("synthetic-{}", i), format!("Synthetic Camera {}", i)))
            .collect();
        Self {
            cameras,
            frame_interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
        }
    }
}

#[async_trait]
impl MediaPlatform for SyntheticPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        Ok(self.cameras.clone())
    }

    async fn open_stream(
        &self,
        device_id: &str,
        constraints: &VideoConstraints,
    ) -> Result<Box<dyn MediaStream>> {
        if !self.cameras.iter().any(|c| c.device_id == device_id) {
            return Err(TangibleError::StreamOpenFailed(format!(
                "Unknown device {}",
                device_id
            )));
        }

        Ok(Box::new(SyntheticStream::new(
            device_id,
            *constraints,
            self.frame_interval,
        )))
    }
}

/// Stream producing a flat gray image at a fixed frame rate
pub struct SyntheticStream {
    device_id: String,
    constraints: VideoConstraints,
    frame_interval: Duration,
    pixels: Bytes,
    started: Option<Instant>,
    stopped: bool,
}

impl SyntheticStream {
    fn new(device_id: &str, constraints: VideoConstraints, frame_interval: Duration) -> Self {
        let len = constraints.width as usize * constraints.height as usize * 3;
        Self {
            device_id: device_id.to_string(),
            constraints,
            frame_interval,
            pixels: Bytes::from(vec![128u8; len]),
            started: None,
            stopped: false,
        }
    }
}

#[async_trait]
impl MediaStream for SyntheticStream {
    fn tracks(&self) -> Vec<MediaTrack> {
        vec![MediaTrack {
            id: format!("{}-video", self.device_id),
            label: self.device_id.clone(),
        }]
    }

    async fn start_playback(&mut self) -> Result<()> {
        self.started = Some(Instant::now());
        Ok(())
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        if self.stopped {
            return None;
        }
        let started = self.started?;

        let interval = self.frame_interval.as_nanos().max(1);
        let frame_index = started.elapsed().as_nanos() / interval;
        let timestamp = Duration::from_nanos((frame_index * interval) as u64);

        Some(VideoFrame {
            timestamp,
            width: self.constraints.width,
            height: self.constraints.height,
            data: self.pixels.clone(),
        })
    }

    fn stop_tracks(&mut self) {
        self.stopped = true;
        info!(device_id = %self.device_id, "Synthetic camera stopped");
    }
}

/// Detector that reports one hand moving in a circle, or nothing
pub struct ScriptedHandDetector {
    options: RwLock<Option<DetectorOptions>>,
    callback: RwLock<Option<ResultCallback>>,
    report_empty: bool,
    frames: AtomicU64,
}

impl ScriptedHandDetector {
    pub fn new() -> Self {
        Self {
            options: RwLock::new(None),
            callback: RwLock::new(None),
            report_empty: false,
            frames: AtomicU64::new(0),
        }
    }

    /// Detector that never finds a hand
    pub fn empty() -> Self {
        Self {
            report_empty: true,
            ..Self::new()
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn hand_at(timestamp: Duration) -> Vec<HandLandmark> {
        let t = timestamp.as_secs_f32();
        let cx = 0.5 + 0.25 * t.cos();
        let cy = 0.5 + 0.25 * t.sin();

        (0..HAND_LANDMARK_COUNT)
            .map(|i| {
                let angle = i as f32 / HAND_LANDMARK_COUNT as f32 * std::f32::consts::TAU;
                let reach = if i == 0 { 0.0 } else { 0.05 };
                HandLandmark {
                    x: cx + reach * angle.cos(),
                    y: cy + reach * angle.sin(),
                    z: 0.0,
                    visibility: Some(1.0),
                }
            })
            .collect()
    }
}

impl Default for ScriptedHandDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for ScriptedHandDetector {
    fn configure(&self, options: &DetectorOptions) -> Result<()> {
        *self.options.write() = Some(options.clone());
        Ok(())
    }

    fn on_results(&self, callback: ResultCallback) {
        *self.callback.write() = Some(callback);
    }

    async fn send(&self, frame: &VideoFrame) -> Result<()> {
        let max_targets = self
            .options
            .read()
            .as_ref()
            .map(|o| o.max_targets)
            .ok_or_else(|| TangibleError::Detector("Detector not configured".to_string()))?;
        self.frames.fetch_add(1, Ordering::Relaxed);

        let mut hands = HandResults::default();
        if !self.report_empty && max_targets > 0 {
            hands.multi_hand_landmarks.push(Self::hand_at(frame.timestamp));
        }

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(DetectionResult::Hands(hands));
        }
        Ok(())
    }
}
