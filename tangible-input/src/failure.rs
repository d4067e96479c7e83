//! Terminal failure tracking and user-visible notices

use crate::observable::{Observable, ObservableReader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// Pipeline health. Any state other than `Ok` is terminal for the
/// pipeline instance that entered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureState {
    Ok,
    NoDeviceAvailable,
    StreamOpenFailed,
    DetectorUnreachable,
}

impl FailureState {
    pub fn is_ok(&self) -> bool {
        matches!(self, FailureState::Ok)
    }

    /// Message shown to the user for this failure
    pub fn notice_text(&self) -> &'static str {
        match self {
            FailureState::Ok => "",
            FailureState::NoDeviceAvailable => {
                "No camera found. Connect a camera to use camera input."
            }
            FailureState::StreamOpenFailed => {
                "The camera could not be opened. It may be in use by another application."
            }
            FailureState::DetectorUnreachable => {
                "Camera input requires an internet connection. Hand tracking failed to load."
            }
        }
    }
}

impl fmt::Display for FailureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureState::Ok => "ok",
            FailureState::NoDeviceAvailable => "no device available",
            FailureState::StreamOpenFailed => "stream open failed",
            FailureState::DetectorUnreachable => "detector unreachable",
        };
        f.write_str(name)
    }
}

/// One user-visible notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub state: FailureState,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    /// Technical detail for logs, never shown to the user
    pub detail: Option<String>,
}

/// Where notices go (a dialog, a toast, a log)
pub trait NoticeSink: Send + Sync {
    fn raise(&self, notice: &Notice);
}

/// Sink that writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNoticeSink;

impl NoticeSink for LogNoticeSink {
    fn raise(&self, notice: &Notice) {
        error!(state = %notice.state, detail = ?notice.detail, "{}", notice.message);
    }
}

/// Latches the first failure and raises exactly one notice for it
pub struct FailureNotifier {
    state: Observable<FailureState>,
    sink: Arc<dyn NoticeSink>,
}

impl FailureNotifier {
    pub fn new(sink: Arc<dyn NoticeSink>, capacity: usize) -> Self {
        Self {
            state: Observable::with_capacity(FailureState::Ok, capacity),
            sink,
        }
    }

    /// Move from `Ok` into `failure`. Returns `false` (and raises nothing)
    /// if the pipeline already failed or `failure` is `Ok`.
    pub fn trip(&self, failure: FailureState, detail: Option<String>) -> bool {
        if failure.is_ok() {
            return false;
        }

        if !self.state.set_if(failure, |current| current.is_ok()) {
            warn!(
                current = %self.state.get(),
                ignored = %failure,
                "Pipeline already failed, ignoring further failure"
            );
            return false;
        }

        let notice = Notice {
            state: failure,
            message: failure.notice_text().to_string(),
            raised_at: Utc::now(),
            detail,
        };
        self.sink.raise(&notice);
        true
    }

    pub fn state(&self) -> FailureState {
        self.state.get()
    }

    pub fn is_failed(&self) -> bool {
        !self.state.get().is_ok()
    }

    pub fn reader(&self) -> ObservableReader<FailureState> {
        self.state.reader()
    }
}
