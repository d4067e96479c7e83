//! Per-frame dispatch of video frames to the detector
//!
//! Every render tick asks the gate whether the current frame may go to the
//! detector. At most one send is ever outstanding, an unchanged frame is
//! never sent twice, and the first failed send halts dispatch for good.

use crate::detector::DetectorAdapter;
use crate::error::TangibleError;
use crate::failure::{FailureNotifier, FailureState};
use crate::stream::StreamController;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Why a tick did or did not dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Halted,
    Busy,
    NotPlaying,
    DuplicateFrame,
    Open,
}

/// Dispatch admission state. `last_frame` is the stream generation and
/// timestamp of the last admitted frame, so a new stream never inherits a
/// duplicate check from the one it replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchGate {
    pub sending: bool,
    pub last_frame: Option<(u64, Duration)>,
    pub playing: bool,
    pub failed: bool,
}

impl DispatchGate {
    /// Checks that do not need a frame, in dispatch order
    pub fn blocked(&self) -> Option<GateDecision> {
        if self.failed {
            Some(GateDecision::Halted)
        } else if self.sending {
            Some(GateDecision::Busy)
        } else if !self.playing {
            Some(GateDecision::NotPlaying)
        } else {
            None
        }
    }

    pub fn check(&self, generation: u64, timestamp: Duration) -> GateDecision {
        if let Some(blocked) = self.blocked() {
            return blocked;
        }
        if self.last_frame == Some((generation, timestamp)) {
            return GateDecision::DuplicateFrame;
        }
        GateDecision::Open
    }

    /// Check and, when open, claim the gate for the frame at `timestamp`
    /// of stream `generation`
    pub fn admit(&mut self, generation: u64, timestamp: Duration) -> GateDecision {
        let decision = self.check(generation, timestamp);
        if decision == GateDecision::Open {
            self.last_frame = Some((generation, timestamp));
            self.sending = true;
        }
        decision
    }

    /// Release the gate after a send completes. A failed send closes it
    /// permanently.
    pub fn finish(&mut self, succeeded: bool) {
        self.sending = false;
        if !succeeded {
            self.failed = true;
        }
    }
}

/// Result of one render tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Halted,
    Busy,
    NotPlaying,
    NoFrame,
    DuplicateFrame,
    /// Called outside a tokio runtime, nothing was sent
    NoRuntime,
    Dispatched { generation: u64 },
}

/// Snapshot of dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub skipped_busy: u64,
    pub skipped_duplicate: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_duplicate: AtomicU64,
}

/// Source of render ticks
#[async_trait]
pub trait FrameClock: Send {
    async fn next_tick(&mut self);
}

/// Fixed-rate clock backed by a tokio interval
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl FrameClock for IntervalClock {
    async fn next_tick(&mut self) {
        self.interval.tick().await;
    }
}

pub struct FrameDispatcher {
    gate: Arc<Mutex<DispatchGate>>,
    streams: Arc<StreamController>,
    adapter: Arc<DetectorAdapter>,
    failure: Arc<FailureNotifier>,
    send_timeout: Option<Duration>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    counters: Counters,
}

impl FrameDispatcher {
    pub fn new(
        streams: Arc<StreamController>,
        adapter: Arc<DetectorAdapter>,
        failure: Arc<FailureNotifier>,
        send_timeout: Option<Duration>,
    ) -> Self {
        Self {
            gate: Arc::new(Mutex::new(DispatchGate::default())),
            streams,
            adapter,
            failure,
            send_timeout,
            in_flight: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Run one render tick. The send runs on a task spawned onto the
    /// current tokio runtime; outside a runtime the tick returns
    /// [`TickOutcome::NoRuntime`] without touching the gate.
    pub fn tick(&self) -> TickOutcome {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Render tick outside a tokio runtime, frame not sent");
            return TickOutcome::NoRuntime;
        };

        let mut gate = self.gate.lock();
        gate.playing = self.streams.is_playing();
        if self.failure.is_failed() {
            gate.failed = true;
        }

        if let Some(blocked) = gate.blocked() {
            if blocked == GateDecision::Busy {
                self.counters.skipped_busy.fetch_add(1, Ordering::Relaxed);
            }
            return blocked_outcome(blocked);
        }

        let Some((generation, frame)) = self.streams.current_frame_with_generation() else {
            return TickOutcome::NoFrame;
        };

        match gate.admit(generation, frame.timestamp) {
            GateDecision::Open => {}
            GateDecision::DuplicateFrame => {
                self.counters.skipped_duplicate.fetch_add(1, Ordering::Relaxed);
                return TickOutcome::DuplicateFrame;
            }
            other => return blocked_outcome(other),
        }
        drop(gate);

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let gate = self.gate.clone();
        let adapter = self.adapter.clone();
        let failure = self.failure.clone();
        let send_timeout = self.send_timeout;

        let task = runtime.spawn(async move {
            let result = match send_timeout {
                Some(limit) => match tokio::time::timeout(limit, adapter.send(&frame, generation)).await {
                    Ok(result) => result,
                    Err(_) => Err(TangibleError::DetectorUnreachable(format!(
                        "no response within {} ms",
                        limit.as_millis()
                    ))),
                },
                None => adapter.send(&frame, generation).await,
            };

            gate.lock().finish(result.is_ok());

            if let Err(e) = result {
                error!(generation, "Detector send failed, halting dispatch: {}", e);
                failure.trip(FailureState::DetectorUnreachable, Some(e.to_string()));
            }
        });

        // Earlier tasks already released the gate, so only this one can
        // still be sending.
        *self.in_flight.lock() = Some(task);

        TickOutcome::Dispatched { generation }
    }

    /// Wait for the outstanding send, if any
    pub async fn settle(&self) {
        let task = self.in_flight.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Dispatch task panicked: {}", e);
                }
            }
        }
    }

    pub fn is_sending(&self) -> bool {
        self.gate.lock().sending
    }

    pub fn gate(&self) -> DispatchGate {
        self.gate.lock().clone()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            skipped_busy: self.counters.skipped_busy.load(Ordering::Relaxed),
            skipped_duplicate: self.counters.skipped_duplicate.load(Ordering::Relaxed),
        }
    }

    /// Tick on every `clock` beat until `is_running` clears or dispatch halts
    pub async fn run(self: Arc<Self>, mut clock: Box<dyn FrameClock>, is_running: Arc<RwLock<bool>>) {
        info!("Frame dispatch loop started");
        loop {
            clock.next_tick().await;

            if !*is_running.read() {
                break;
            }

            if self.tick() == TickOutcome::Halted {
                info!("Dispatch halted after failure");
                break;
            }
        }

        let stats = self.stats();
        debug!(
            dispatched = stats.dispatched,
            skipped_busy = stats.skipped_busy,
            skipped_duplicate = stats.skipped_duplicate,
            "Frame dispatch loop stopped"
        );
    }
}

fn blocked_outcome(decision: GateDecision) -> TickOutcome {
    match decision {
        GateDecision::Halted => TickOutcome::Halted,
        GateDecision::Busy => TickOutcome::Busy,
        GateDecision::NotPlaying => TickOutcome::NotPlaying,
        GateDecision::DuplicateFrame => TickOutcome::DuplicateFrame,
        // Callers only pass blocking decisions
        GateDecision::Open => TickOutcome::Busy,
    }
}
