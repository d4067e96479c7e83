//! Detector reached over HTTP
//!
//! Each frame is posted as raw RGB bytes with its geometry and the detector
//! options in the query string. The response body is a JSON
//! [`DetectionResult`], delivered through the registered callback before
//! `send` resolves.

use crate::detector::{DetectionResult, Detector, DetectorOptions, ResultCallback};
use crate::error::{Result, TangibleError};
use crate::stream::VideoFrame;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RemoteDetector {
    client: reqwest::Client,
    endpoint: String,
    options: RwLock<Option<DetectorOptions>>,
    callback: RwLock<Option<ResultCallback>>,
}

impl RemoteDetector {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(TangibleError::Config(format!(
                "Detector endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }

        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            options: RwLock::new(None),
            callback: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn configure(&self, options: &DetectorOptions) -> Result<()> {
        *self.options.write() = Some(options.clone());
        Ok(())
    }

    fn on_results(&self, callback: ResultCallback) {
        let mut slot = self.callback.write();
        if slot.is_some() {
            warn!("Result callback registered twice, replacing");
        }
        *slot = Some(callback);
    }

    async fn send(&self, frame: &VideoFrame) -> Result<()> {
        let options = self
            .options
            .read()
            .clone()
            .ok_or_else(|| TangibleError::Detector("Detector not configured".to_string()))?;

        let query = [
            ("width", frame.width.to_string()),
            ("height", frame.height.to_string()),
            ("timestamp_ms", frame.timestamp.as_millis().to_string()),
            ("max_targets", options.max_targets.to_string()),
            ("model_complexity", u8::from(options.model_complexity).to_string()),
            ("min_detection_confidence", options.min_detection_confidence.to_string()),
            ("min_tracking_confidence", options.min_tracking_confidence.to_string()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(frame.data.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| TangibleError::DetectorUnreachable(e.to_string()))?;

        let result: DetectionResult = response
            .json()
            .await
            .map_err(|e| TangibleError::Detector(format!("Invalid detector response: {}", e)))?;

        debug!(timestamp_ms = frame.timestamp.as_millis() as u64, "Remote detection received");

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(result);
        }
        Ok(())
    }
}
