//! Camera stream lifecycle
//!
//! The controller owns at most one open stream. Opening a device always
//! releases the previous stream first, so the platform never holds two
//! camera locks for one pipeline.

use crate::device::MediaDeviceInfo;
use crate::error::{Result, TangibleError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One decoded video frame and its presentation timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub timestamp: Duration,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// Ideal capture size requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// A media track owned by a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub label: String,
}

/// The host platform's camera access
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// List every media device the platform knows about
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>>;

    /// Acquire `device_id` and bind it to a video surface
    async fn open_stream(
        &self,
        device_id: &str,
        constraints: &VideoConstraints,
    ) -> Result<Box<dyn MediaStream>>;
}

/// A live stream bound to one video surface
#[async_trait]
pub trait MediaStream: Send + Sync {
    fn tracks(&self) -> Vec<MediaTrack>;

    /// Resolve once metadata loaded and playback started producing frames
    async fn start_playback(&mut self) -> Result<()>;

    /// The frame currently presented, if any
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Stop every track this stream owns
    fn stop_tracks(&mut self);
}

/// Identifies one opened stream. Generations only grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle {
    pub generation: u64,
    pub device_id: String,
}

/// Generation of the live stream, shared with result consumers. Zero means
/// no stream is open.
#[derive(Debug, Clone, Default)]
pub struct LiveGeneration(Arc<AtomicU64>);

impl LiveGeneration {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation != 0 && self.current() == generation
    }

    fn set(&self, generation: u64) {
        self.0.store(generation, Ordering::Release);
    }
}

struct ActiveStream {
    handle: StreamHandle,
    stream: Box<dyn MediaStream>,
}

pub struct StreamController {
    platform: Arc<dyn MediaPlatform>,
    constraints: VideoConstraints,
    active: Mutex<Option<ActiveStream>>,
    next_generation: AtomicU64,
    live: LiveGeneration,
    playing: AtomicBool,
    // Serializes swaps so two selections cannot interleave open/close
    swap_lock: tokio::sync::Mutex<()>,
}

impl StreamController {
    pub fn new(platform: Arc<dyn MediaPlatform>, constraints: VideoConstraints) -> Self {
        Self {
            platform,
            constraints,
            active: Mutex::new(None),
            next_generation: AtomicU64::new(0),
            live: LiveGeneration::default(),
            playing: AtomicBool::new(false),
            swap_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open `device_id`, releasing the current stream first.
    ///
    /// An empty id means "no device": the current stream (if any) is released
    /// and `Ok(None)` is returned.
    pub async fn open(&self, device_id: &str) -> Result<Option<StreamHandle>> {
        let _swap = self.swap_lock.lock().await;

        self.release_current();

        if device_id.is_empty() {
            debug!("No camera selected, nothing to open");
            return Ok(None);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(device_id = %device_id, generation, "Opening camera stream");

        let mut stream = self
            .platform
            .open_stream(device_id, &self.constraints)
            .await
            .map_err(as_open_failure)?;

        if let Err(e) = stream.start_playback().await {
            stream.stop_tracks();
            return Err(as_open_failure(e));
        }

        let handle = StreamHandle {
            generation,
            device_id: device_id.to_string(),
        };

        *self.active.lock() = Some(ActiveStream {
            handle: handle.clone(),
            stream,
        });
        self.live.set(generation);
        self.playing.store(true, Ordering::Release);

        info!(device_id = %device_id, generation, "Camera stream playing");
        Ok(Some(handle))
    }

    /// Close `handle` if it is still the open stream
    pub fn close(&self, handle: &StreamHandle) -> bool {
        let is_current = self
            .active
            .lock()
            .as_ref()
            .map_or(false, |active| active.handle == *handle);

        if !is_current {
            debug!(generation = handle.generation, "Stream already replaced, nothing to close");
            return false;
        }
        self.release_current()
    }

    /// Stop the open stream, if any. Returns whether one was open.
    pub fn release_current(&self) -> bool {
        let previous = self.active.lock().take();
        match previous {
            Some(mut active) => {
                self.playing.store(false, Ordering::Release);
                self.live.set(0);
                let tracks: Vec<String> =
                    active.stream.tracks().into_iter().map(|track| track.id).collect();
                active.stream.stop_tracks();
                info!(
                    device_id = %active.handle.device_id,
                    generation = active.handle.generation,
                    tracks = ?tracks,
                    "Camera stream closed"
                );
                true
            }
            None => false,
        }
    }

    pub fn current_handle(&self) -> Option<StreamHandle> {
        self.active.lock().as_ref().map(|active| active.handle.clone())
    }

    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.active
            .lock()
            .as_ref()
            .and_then(|active| active.stream.current_frame())
    }

    /// Current frame together with the generation of the stream it came from
    pub fn current_frame_with_generation(&self) -> Option<(u64, VideoFrame)> {
        self.active.lock().as_ref().and_then(|active| {
            active
                .stream
                .current_frame()
                .map(|frame| (active.handle.generation, frame))
        })
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_current(&self, handle: &StreamHandle) -> bool {
        self.live.is_current(handle.generation)
    }

    pub fn generation(&self) -> u64 {
        self.live.current()
    }

    /// Shared view of the live generation for result consumers
    pub fn live_generation(&self) -> LiveGeneration {
        self.live.clone()
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if self.release_current() {
            warn!("Stream controller dropped with an open stream");
        }
    }
}

fn as_open_failure(err: TangibleError) -> TangibleError {
    match err {
        TangibleError::StreamOpenFailed(_) => err,
        other => TangibleError::StreamOpenFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticPlatform;

    fn controller() -> StreamController {
        StreamController::new(
            Arc::new(SyntheticPlatform::new(2, 30)),
            VideoConstraints {
                width: 4,
                height: 4,
            },
        )
    }

    #[tokio::test]
    async fn test_open_assigns_new_generation() {
        let streams = controller();
        assert_eq!(streams.generation(), 0);
        assert!(!streams.is_playing());

        let first = streams.open("synthetic-0").await.unwrap().unwrap();
        assert_eq!(first.generation, 1);
        assert!(streams.is_playing());
        assert!(streams.is_current(&first));
        assert!(streams.current_frame().is_some());
        let (generation, _) = streams.current_frame_with_generation().unwrap();
        assert_eq!(generation, first.generation);

        let second = streams.open("synthetic-1").await.unwrap().unwrap();
        assert_eq!(second.generation, 2);
        assert!(!streams.is_current(&first));
        assert_eq!(streams.current_handle(), Some(second));
    }

    #[tokio::test]
    async fn test_close_ignores_replaced_handle() {
        let streams = controller();
        let first = streams.open("synthetic-0").await.unwrap().unwrap();
        let second = streams.open("synthetic-1").await.unwrap().unwrap();

        assert!(!streams.close(&first));
        assert!(streams.is_playing());

        assert!(streams.close(&second));
        assert!(!streams.is_playing());
        assert_eq!(streams.generation(), 0);
        assert!(streams.current_frame().is_none());
    }

    #[tokio::test]
    async fn test_empty_id_releases() {
        let streams = controller();
        assert!(streams.open("").await.unwrap().is_none());

        streams.open("synthetic-0").await.unwrap();
        assert!(streams.open("").await.unwrap().is_none());
        assert!(streams.current_handle().is_none());
        assert!(!streams.release_current());
    }

    #[tokio::test]
    async fn test_failed_open_leaves_nothing_playing() {
        let streams = controller();
        streams.open("synthetic-0").await.unwrap();

        let err = streams.open("missing").await.unwrap_err();
        assert!(matches!(err, TangibleError::StreamOpenFailed(_)));
        assert!(!streams.is_playing());
        assert!(streams.current_handle().is_none());
    }
}
