//! Rolling tick timings

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

const HISTORY: usize = 10;

/// Summary reported to the controller, all times in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub fps: f64,
    pub avg_frame_time: f64,
    pub min_frame_time: f64,
    pub max_frame_time: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceStats {
    frame_times: VecDeque<Duration>,
}

impl PerformanceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, elapsed: Duration) {
        if self.frame_times.len() == HISTORY {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(elapsed);
    }

    pub fn samples(&self) -> usize {
        self.frame_times.len()
    }

    /// All zeros until the first tick has been timed
    pub fn report(&self) -> PerformanceReport {
        if self.frame_times.is_empty() {
            return PerformanceReport::default();
        }
        let secs: Vec<f64> = self.frame_times.iter().map(Duration::as_secs_f64).collect();
        let avg = secs.iter().sum::<f64>() / secs.len() as f64;
        PerformanceReport {
            fps: if avg > 0.0 { 1.0 / avg } else { 0.0 },
            avg_frame_time: avg,
            min_frame_time: secs.iter().copied().fold(f64::INFINITY, f64::min),
            max_frame_time: secs.iter().copied().fold(0.0, f64::max),
        }
    }
}
