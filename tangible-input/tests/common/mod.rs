//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tangible_input::detector::{
    DetectionResult, Detector, DetectorOptions, HandLandmark, HandResults, ResultCallback,
    HAND_LANDMARK_COUNT,
};
use tangible_input::device::MediaDeviceInfo;
use tangible_input::failure::{Notice, NoticeSink};
use tangible_input::stream::{MediaPlatform, MediaStream, MediaTrack, VideoConstraints, VideoFrame};
use tangible_input::{Result, TangibleError};
use tokio::sync::Notify;

/// What the platform saw happen to one opened stream
#[derive(Debug)]
pub struct StreamRecord {
    pub device_id: String,
    pub stops: AtomicUsize,
    pub timestamp_ms: AtomicU64,
    track_queries: AtomicUsize,
    started: AtomicBool,
}

impl StreamRecord {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// How often the controller asked the stream for its tracks
    pub fn track_queries(&self) -> usize {
        self.track_queries.load(Ordering::SeqCst)
    }

    pub fn set_frame_time(&self, ms: u64) {
        self.timestamp_ms.store(ms, Ordering::SeqCst);
    }
}

pub struct FakeStream {
    record: Arc<StreamRecord>,
    stopped: bool,
}

#[async_trait]
impl MediaStream for FakeStream {
    fn tracks(&self) -> Vec<MediaTrack> {
        self.record.track_queries.fetch_add(1, Ordering::SeqCst);
        vec![MediaTrack {
            id: format!("{}-track", self.record.device_id),
            label: self.record.device_id.clone(),
        }]
    }

    async fn start_playback(&mut self) -> Result<()> {
        self.record.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        if self.stopped || !self.record.started.load(Ordering::SeqCst) {
            return None;
        }
        Some(VideoFrame {
            timestamp: Duration::from_millis(self.record.timestamp_ms.load(Ordering::SeqCst)),
            width: 4,
            height: 2,
            data: Bytes::from_static(&[0u8; 24]),
        })
    }

    fn stop_tracks(&mut self) {
        self.stopped = true;
        self.record.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePlatform {
    devices: Mutex<Vec<MediaDeviceInfo>>,
    deny_permission: AtomicBool,
    failing_devices: Mutex<HashSet<String>>,
    streams: Mutex<Vec<Arc<StreamRecord>>>,
}

impl FakePlatform {
    pub fn with_cameras(ids: &[&str]) -> Arc<Self> {
        let platform = Self::default();
        *platform.devices.lock() = ids
            .iter()
            .map(|id| MediaDeviceInfo::video(*id, format!("Camera {}", id)))
            .collect();
        Arc::new(platform)
    }

    pub fn with_devices(devices: Vec<MediaDeviceInfo>) -> Arc<Self> {
        let platform = Self::default();
        *platform.devices.lock() = devices;
        Arc::new(platform)
    }

    pub fn deny_permission(&self) {
        self.deny_permission.store(true, Ordering::SeqCst);
    }

    pub fn fail_open(&self, device_id: &str) {
        self.failing_devices.lock().insert(device_id.to_string());
    }

    pub fn streams(&self) -> Vec<Arc<StreamRecord>> {
        self.streams.lock().clone()
    }

    pub fn stream(&self, device_id: &str) -> Arc<StreamRecord> {
        self.streams
            .lock()
            .iter()
            .rev()
            .find(|p| p.device_id == device_id)
            .cloned()
            .expect("stream was never opened")
    }

    pub fn latest_stream(&self) -> Arc<StreamRecord> {
        self.streams.lock().last().cloned().expect("no stream opened")
    }
}

#[async_trait]
impl MediaPlatform for FakePlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        if self.deny_permission.load(Ordering::SeqCst) {
            return Err(TangibleError::PermissionDenied);
        }
        Ok(self.devices.lock().clone())
    }

    async fn open_stream(
        &self,
        device_id: &str,
        _constraints: &VideoConstraints,
    ) -> Result<Box<dyn MediaStream>> {
        if self.failing_devices.lock().contains(device_id) {
            return Err(TangibleError::StreamOpenFailed(format!("{} is busy", device_id)));
        }

        let record = Arc::new(StreamRecord {
            device_id: device_id.to_string(),
            stops: AtomicUsize::new(0),
            timestamp_ms: AtomicU64::new(0),
            track_queries: AtomicUsize::new(0),
            started: AtomicBool::new(false),
        });
        self.streams.lock().push(record.clone());
        Ok(Box::new(FakeStream {
            record,
            stopped: false,
        }))
    }
}

#[derive(Clone)]
pub enum SendBehavior {
    /// Call back with the result, then resolve
    Respond(DetectionResult),
    /// Reject the send
    Reject,
    /// Never resolve
    Hang,
    /// Wait for `FakeDetector::release`, then call back and resolve
    WaitForRelease(DetectionResult),
}

pub struct FakeDetector {
    behavior: Mutex<SendBehavior>,
    callback: Mutex<Option<ResultCallback>>,
    configured: Mutex<Option<DetectorOptions>>,
    callbacks_registered: AtomicUsize,
    sends: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    release: Notify,
}

impl FakeDetector {
    pub fn new(behavior: SendBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            callback: Mutex::new(None),
            configured: Mutex::new(None),
            callbacks_registered: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            release: Notify::new(),
        })
    }

    pub fn set_behavior(&self, behavior: SendBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn callbacks_registered(&self) -> usize {
        self.callbacks_registered.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> Option<DetectorOptions> {
        self.configured.lock().clone()
    }

    /// Deliver a result out of band, as a detector may do at any time
    pub fn emit(&self, result: DetectionResult) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

#[async_trait]
impl Detector for FakeDetector {
    fn configure(&self, options: &DetectorOptions) -> Result<()> {
        *self.configured.lock() = Some(options.clone());
        Ok(())
    }

    fn on_results(&self, callback: ResultCallback) {
        self.callbacks_registered.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock() = Some(callback);
    }

    async fn send(&self, _frame: &VideoFrame) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let behavior = self.behavior.lock().clone();
        let outcome = match behavior {
            SendBehavior::Respond(result) => {
                self.emit(result);
                Ok(())
            }
            SendBehavior::Reject => Err(TangibleError::DetectorUnreachable(
                "failed to fetch model assets".to_string(),
            )),
            SendBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            SendBehavior::WaitForRelease(result) => {
                self.release.notified().await;
                self.emit(result);
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Sink that keeps every notice it receives
#[derive(Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl NoticeSink for RecordingSink {
    fn raise(&self, notice: &Notice) {
        self.notices.lock().push(notice.clone());
    }
}

pub fn no_hands() -> DetectionResult {
    DetectionResult::Hands(HandResults::default())
}

pub fn one_hand() -> DetectionResult {
    DetectionResult::Hands(HandResults {
        multi_hand_landmarks: vec![(0..HAND_LANDMARK_COUNT)
            .map(|i| HandLandmark::new(0.1 * (i % 10) as f32, 0.5, 0.0))
            .collect()],
    })
}
