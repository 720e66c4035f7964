use std::time::{Duration, Instant};

use crate::models::media::FrameRate;

/// Wall-clock timer that converts elapsed time into frame indices.
#[derive(Debug, Clone, Default)]
pub struct SyncClock {
    started: Option<Instant>,
    rate: FrameRate,
}

impl SyncClock {
    pub fn new(rate: FrameRate) -> Self {
        Self { started: None, rate }
    }

    /// (Re)start the timer at frame 0.
    pub fn start(&mut self, rate: FrameRate) {
        self.rate = rate;
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Index of the frame due now: `elapsed_ms * fps / 1000`, rounded down.
    pub fn frame_index(&self) -> i64 {
        self.rate.frames_in(self.elapsed()) as i64
    }
}
