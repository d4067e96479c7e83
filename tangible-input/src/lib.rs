//! tangible-input: physical input from a live camera
//!
//! Feeds camera frames to an external hand-landmark or fiducial-marker
//! detector and publishes the latest detection so applications can drive
//! sliders and positions from gestures.
//!
//! - Device enumeration and hot camera switching
//! - Backpressured frame dispatch (one detector call in flight, no repeated frames)
//! - Latest-value result publication
//! - One-shot failure notices with a terminal failure state

pub mod config;
pub mod detector;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod failure;
pub mod observable;
pub mod pipeline;
pub mod publisher;
pub mod remote;
pub mod slider;
pub mod stream;
pub mod synthetic;

pub use config::{InitializeOptions, ModelComplexity, PipelineConfig};
pub use detector::{DetectionResult, Detector, DetectorAdapter, DetectorOptions};
pub use device::{DeviceDescriptor, DeviceEnumerator};
pub use dispatch::{DispatchGate, FrameDispatcher, TickOutcome};
pub use error::{Result, TangibleError};
pub use failure::{FailureNotifier, FailureState, LogNoticeSink, Notice, NoticeSink};
pub use observable::{Observable, ObservableReader};
pub use pipeline::{Lifecycle, TrackingPipeline};
pub use publisher::ResultPublisher;
pub use remote::RemoteDetector;
pub use slider::{SliderGroupBinding, ValueRange};
pub use stream::{MediaPlatform, MediaStream, StreamController, StreamHandle, VideoFrame};
