//! Camera-to-tracking pipeline
//!
//! Owns the device list, the open stream, the detector adapter and the
//! dispatch loop for one host. Each instance is initialized once; after a
//! terminal failure the host builds a fresh instance to try again.

use crate::config::{InitializeOptions, PipelineConfig};
use crate::detector::{Detector, DetectorAdapter, DetectorOptions};
use crate::device::{DeviceDescriptor, DeviceEnumerator};
use crate::dispatch::{DispatchStats, FrameClock, FrameDispatcher, IntervalClock, TickOutcome};
use crate::error::{Result, TangibleError};
use crate::failure::{FailureNotifier, FailureState, NoticeSink};
use crate::observable::ObservableReader;
use crate::publisher::{ResultPublisher, ResultSlot};
use crate::stream::{MediaPlatform, StreamController, StreamHandle, VideoConstraints};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Instance lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Failed,
}

pub struct TrackingPipeline {
    config: PipelineConfig,
    detector: Arc<dyn Detector>,
    devices: DeviceEnumerator,
    streams: Arc<StreamController>,
    publisher: ResultPublisher,
    failure: Arc<FailureNotifier>,
    initialize_called: AtomicBool,
    ready: AtomicBool,
    adapter: RwLock<Option<Arc<DetectorAdapter>>>,
    dispatcher: RwLock<Option<Arc<FrameDispatcher>>>,
    is_running: Arc<RwLock<bool>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TrackingPipeline {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        detector: Arc<dyn Detector>,
        sink: Arc<dyn NoticeSink>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| TangibleError::Config(format!("Invalid pipeline config: {}", e)))?;

        let capacity = config.event_buffer_size;
        let constraints = VideoConstraints {
            width: config.width,
            height: config.height,
        };

        Ok(Self {
            detector,
            devices: DeviceEnumerator::new(platform.clone(), capacity),
            streams: Arc::new(StreamController::new(platform, constraints)),
            publisher: ResultPublisher::new(capacity),
            failure: Arc::new(FailureNotifier::new(sink, capacity)),
            initialize_called: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            adapter: RwLock::new(None),
            dispatcher: RwLock::new(None),
            is_running: Arc::new(RwLock::new(false)),
            loop_handle: Mutex::new(None),
            config,
        })
    }

    /// Configure the detector, enumerate cameras and open the selected one.
    /// Callable once per instance.
    pub async fn initialize(&self, options: InitializeOptions) -> Result<()> {
        options
            .validate()
            .map_err(|e| TangibleError::Config(format!("Invalid initialize options: {}", e)))?;

        if self.initialize_called.swap(true, Ordering::SeqCst) {
            return Err(TangibleError::AlreadyInitialized);
        }

        info!(
            max_targets = options.max_targets,
            min_detection_confidence = options.min_detection_confidence,
            min_tracking_confidence = options.min_tracking_confidence,
            "Initializing tracking pipeline"
        );

        let detector_options = DetectorOptions::from(&options);
        let adapter = match DetectorAdapter::new(
            self.detector.clone(),
            &detector_options,
            self.publisher.clone(),
            self.streams.live_generation(),
        ) {
            Ok(adapter) => Arc::new(adapter),
            Err(e) => {
                self.failure
                    .trip(FailureState::DetectorUnreachable, Some(e.to_string()));
                return Err(e);
            }
        };

        let dispatcher = Arc::new(FrameDispatcher::new(
            self.streams.clone(),
            adapter.clone(),
            self.failure.clone(),
            self.config.send_timeout(),
        ));
        *self.adapter.write() = Some(adapter);
        *self.dispatcher.write() = Some(dispatcher);

        let cameras = self
            .devices
            .list_video_input_devices(options.preferred_device_id.as_deref())
            .await
            .map_err(|e| self.fail(e))?;

        if cameras.is_empty() {
            return Err(self.fail(TangibleError::NoDeviceAvailable));
        }

        let selected = self.devices.selected_id();
        if let Err(e) = self.streams.open(&selected).await {
            self.devices.select("");
            return Err(self.fail(e));
        }

        self.ready.store(true, Ordering::Release);
        info!(device_id = %selected, "Tracking pipeline ready");
        Ok(())
    }

    /// Switch cameras. The previous stream is released before the new one
    /// opens; results still in flight for it are dropped.
    ///
    /// The selected id always names the open camera, or is `""` when none is
    /// open. Once the pipeline has failed, selecting releases the current
    /// camera and opens nothing.
    pub async fn select_device(&self, device_id: &str) -> Result<()> {
        if device_id.is_empty() && self.streams.current_handle().is_none() {
            self.devices.select(device_id);
            return Ok(());
        }

        if !self.ready.load(Ordering::Acquire) {
            return Err(TangibleError::NotInitialized);
        }

        if self.failure.is_failed() {
            self.streams.release_current();
            self.devices.select("");
            warn!(
                device_id = %device_id,
                state = %self.failure.state(),
                "Pipeline failed, not opening camera"
            );
            return Ok(());
        }

        self.devices.select(device_id);
        if let Err(e) = self.streams.open(device_id).await {
            self.devices.select("");
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Run one render tick by hand (hosts with their own frame clock).
    /// Call it from inside a tokio runtime: the detector call is spawned onto
    /// the current runtime, and without one the tick returns
    /// [`TickOutcome::NoRuntime`].
    pub fn tick(&self) -> TickOutcome {
        match self.dispatcher.read().as_ref() {
            Some(dispatcher) => dispatcher.tick(),
            None if self.failure.is_failed() => TickOutcome::Halted,
            None => TickOutcome::NotPlaying,
        }
    }

    /// Spawn the dispatch loop at the configured frame rate
    pub fn start(&self) -> Result<bool> {
        self.start_with_clock(Box::new(IntervalClock::new(self.config.tick_interval())))
    }

    /// Spawn the dispatch loop on `clock`. Returns `false` when the pipeline
    /// already failed and nothing was started.
    pub fn start_with_clock(&self, clock: Box<dyn FrameClock>) -> Result<bool> {
        if self.failure.is_failed() {
            warn!(state = %self.failure.state(), "Not starting dispatch loop after failure");
            return Ok(false);
        }

        let dispatcher = self
            .dispatcher
            .read()
            .clone()
            .filter(|_| self.ready.load(Ordering::Acquire))
            .ok_or(TangibleError::NotInitialized)?;

        {
            let mut is_running = self.is_running.write();
            if *is_running {
                return Ok(true);
            }
            *is_running = true;
        }

        let handle = tokio::spawn(dispatcher.run(clock, self.is_running.clone()));
        *self.loop_handle.lock() = Some(handle);
        Ok(true)
    }

    /// Wait for the outstanding detector call, if any
    pub async fn settle(&self) {
        let dispatcher = self.dispatcher.read().clone();
        if let Some(dispatcher) = dispatcher {
            dispatcher.settle().await;
        }
    }

    /// Stop the loop, wait for the in-flight send and release the camera
    pub async fn shutdown(&self) {
        *self.is_running.write() = false;

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }

        let dispatcher = self.dispatcher.read().clone();
        if let Some(dispatcher) = dispatcher {
            if tokio::time::timeout(Duration::from_secs(1), dispatcher.settle())
                .await
                .is_err()
            {
                warn!("Detector call still outstanding at shutdown");
            }
        }

        self.streams.release_current();
        info!("Tracking pipeline shut down");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.failure.is_failed() {
            Lifecycle::Failed
        } else if self.ready.load(Ordering::Acquire) {
            Lifecycle::Ready
        } else {
            Lifecycle::Uninitialized
        }
    }

    pub fn results(&self) -> ObservableReader<ResultSlot> {
        self.publisher.reader()
    }

    pub fn latest_result(&self) -> ResultSlot {
        self.publisher.latest()
    }

    pub fn failure(&self) -> ObservableReader<FailureState> {
        self.failure.reader()
    }

    pub fn failure_state(&self) -> FailureState {
        self.failure.state()
    }

    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.devices()
    }

    pub fn selected_device(&self) -> ObservableReader<String> {
        self.devices.selected()
    }

    pub fn current_stream(&self) -> Option<StreamHandle> {
        self.streams.current_handle()
    }

    pub fn dispatch_stats(&self) -> Option<DispatchStats> {
        self.dispatcher.read().as_ref().map(|d| d.stats())
    }

    /// Results dropped because their stream had been replaced
    pub fn stale_results(&self) -> u64 {
        self.adapter.read().as_ref().map_or(0, |a| a.stale())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn fail(&self, err: TangibleError) -> TangibleError {
        if let Some(state) = err.failure_state() {
            self.failure.trip(state, Some(err.to_string()));
        }
        err
    }
}
