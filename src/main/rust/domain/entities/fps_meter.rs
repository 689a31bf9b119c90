use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window frame rate over the last `window`
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl FpsMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timestamps: VecDeque::new(),
        }
    }

    pub fn record(&mut self, at: Instant) {
        self.timestamps.push_back(at);
        self.evict(at);
    }

    /// Frames per second averaged over the full window
    pub fn fps(&mut self, now: Instant) -> f64 {
        self.evict(now);
        if self.window.is_zero() {
            return 0.0;
        }
        self.timestamps.len() as f64 / self.window.as_secs_f64()
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
