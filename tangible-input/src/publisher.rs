//! Latest-value slot for detection results

use crate::detector::DetectionResult;
use crate::observable::{Observable, ObservableReader};
use std::sync::Arc;
use tokio::sync::broadcast;

pub type ResultSlot = Option<Arc<DetectionResult>>;

/// Holds the most recent detection result. Later values overwrite earlier
/// ones; nothing is queued.
#[derive(Clone)]
pub struct ResultPublisher {
    slot: Observable<ResultSlot>,
}

impl ResultPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            slot: Observable::with_capacity(None, capacity),
        }
    }

    pub fn publish(&self, result: Option<DetectionResult>) {
        self.slot.set(result.map(Arc::new));
    }

    pub fn latest(&self) -> ResultSlot {
        self.slot.get()
    }

    pub fn reader(&self) -> ObservableReader<ResultSlot> {
        self.slot.reader()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResultSlot> {
        self.slot.subscribe()
    }
}

impl Default for ResultPublisher {
    fn default() -> Self {
        Self::new(16)
    }
}
