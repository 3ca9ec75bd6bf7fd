use crate::constants::RATE_WINDOW;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window over recently received bytes, for throughput and
/// time-remaining estimates.
#[derive(Debug)]
pub struct ThroughputWindow {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
}

impl ThroughputWindow {
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        ThroughputWindow {
            samples: VecDeque::new(),
            window,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push_back((now, bytes));
        self.prune(now);
    }

    /// Average receive rate over the window, in bytes per second.
    pub fn rate(&mut self) -> f64 {
        self.prune(Instant::now());
        let total: u64 = self.samples.iter().map(|(_, bytes)| bytes).sum();
        total as f64 / self.window.as_secs_f64()
    }

    /// Estimated time to receive `remaining` bytes at the current rate.
    /// `None` while the window is empty.
    pub fn eta(&mut self, remaining: u64) -> Option<Duration> {
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        let rate = self.rate();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.samples.front() {
            if now.duration_since(*at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputWindow {
    fn default() -> Self {
        Self::new()
    }
}
