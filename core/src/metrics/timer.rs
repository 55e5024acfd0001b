//! RAII guard that records elapsed time to a Prometheus histogram on drop.

use prometheus::HistogramVec;
use std::time::Instant;

/// Records the elapsed duration to a histogram when dropped.
/// Use `stop()` to record early and get the elapsed time.
pub struct TimerGuard<'a> {
    histogram: &'a HistogramVec,
    labels: Vec<String>,
    start: Instant,
    stopped: bool,
}

impl<'a> TimerGuard<'a> {
    pub fn new(histogram: &'a HistogramVec, labels: &[&str]) -> Self {
        Self {
            histogram,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            start: Instant::now(),
            stopped: false,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop the timer and record the duration. Returns elapsed seconds.
    pub fn stop(mut self) -> f64 {
        self.stopped = true;
        self.observe()
    }

    fn observe(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        let label_refs: Vec<&str> = self.labels.iter().map(|s| s.as_str()).collect();
        self.histogram.with_label_values(&label_refs).observe(elapsed);
        elapsed
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.observe();
        }
    }
}
