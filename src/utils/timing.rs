//! Timing helpers for logging how long graph builds and searches take.

use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// A timer for measuring operation durations
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    operation_name: String,
    checkpoints: Vec<(String, Instant)>,
}

impl Timer {
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting timer for: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
            checkpoints: Vec::new(),
        }
    }

    /// Records an intermediate point; segments are reported by `finish`
    pub fn checkpoint(&mut self, checkpoint_name: &str) {
        let now = Instant::now();
        debug!(
            "{} - {}: {}us",
            self.operation_name,
            checkpoint_name,
            now.duration_since(self.start_time).as_micros()
        );
        self.checkpoints.push((checkpoint_name.to_string(), now));
    }

    /// Logs the total at debug level and returns it
    pub fn finish(self) -> Duration {
        let total = self.start_time.elapsed();
        let mut last = self.start_time;
        for (name, at) in &self.checkpoints {
            debug!(
                "   {} / {}: {}us",
                self.operation_name,
                name,
                at.duration_since(last).as_micros()
            );
            last = *at;
        }
        debug!("{} completed in {}us", self.operation_name, total.as_micros());
        total
    }

    /// Like `finish`, but logs at info and warns when over `threshold`
    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let name = self.operation_name.clone();
        let total = self.finish();
        if total > threshold {
            warn!(
                "{} took {}ms (exceeds threshold of {}ms)",
                name,
                total.as_millis(),
                threshold.as_millis()
            );
        } else {
            info!("{} completed in {}ms", name, total.as_millis());
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures_checkpoints() {
        let mut timer = Timer::start("unit");
        timer.checkpoint("first");
        std::thread::sleep(Duration::from_millis(2));
        timer.checkpoint("second");
        let total = timer.finish();
        assert!(total >= Duration::from_millis(2));
    }
}
