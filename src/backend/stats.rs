//! Rolling statistics for the ingestion pipeline
//!
//! Lifetime counters (frames received, frames passed, decode attempts) grow
//! monotonically. Window counters accumulate per batch cycle and are folded
//! into the published rate once per window, then reset.

use crate::types::PipelineStats;
use std::time::{Duration, Instant};

/// Statistics accumulator owned by the ingestion worker
#[derive(Debug, Clone)]
pub struct StatsWindow {
    /// Window length
    window: Duration,
    /// When the current window opened
    window_start: Instant,
    /// Frames processed in the current window
    window_messages: u64,
    /// Processing time spent in the current window
    window_processing: Duration,

    total_received: u64,
    filtered_count: u64,
    decode_attempts: u64,
    decode_successes: u64,

    /// Rate published at the last window close
    messages_per_second: f64,
    /// Processing time published at the last window close
    processing_time_ms: f64,
}

impl StatsWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            window_messages: 0,
            window_processing: Duration::ZERO,
            total_received: 0,
            filtered_count: 0,
            decode_attempts: 0,
            decode_successes: 0,
            messages_per_second: 0.0,
            processing_time_ms: 0.0,
        }
    }

    /// Fold one batch cycle into the counters
    pub fn record_cycle(&mut self, processed: u64, passed: u64, elapsed: Duration) {
        self.total_received += processed;
        self.filtered_count += passed;
        self.window_messages += processed;
        self.window_processing += elapsed;
    }

    /// Record the outcome of one decode attempt
    pub fn record_decode(&mut self, success: bool) {
        self.decode_attempts += 1;
        if success {
            self.decode_successes += 1;
        }
    }

    /// A filter re-scan replaces the passed count with its result size
    pub fn record_rescan(&mut self, passed: u64) {
        self.filtered_count = passed;
    }

    /// When the current window closes
    pub fn window_deadline(&self) -> Instant {
        self.window_start + self.window
    }

    /// Close the window if it has elapsed. Returns true when it closed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return false;
        }

        self.messages_per_second = self.window_messages as f64 / elapsed.as_secs_f64();
        self.processing_time_ms = self.window_processing.as_secs_f64() * 1000.0;

        self.window_messages = 0;
        self.window_processing = Duration::ZERO;
        self.window_start = now;
        true
    }

    /// Percentage of decode attempts that produced signals
    pub fn decode_success_rate(&self) -> f64 {
        if self.decode_attempts == 0 {
            100.0
        } else {
            (self.decode_successes as f64 / self.decode_attempts as f64) * 100.0
        }
    }

    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    pub fn filtered_count(&self) -> u64 {
        self.filtered_count
    }

    /// Snapshot for the display layer
    pub fn snapshot(&self, buffer_len: usize, dropped_events: u64) -> PipelineStats {
        PipelineStats {
            total_received: self.total_received,
            messages_per_second: self.messages_per_second,
            filtered_count: self.filtered_count,
            decode_success_rate: self.decode_success_rate(),
            processing_time_ms: self.processing_time_ms,
            buffer_len,
            dropped_events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_closes_once() {
        let mut stats = StatsWindow::new(Duration::from_secs(1));
        let start = stats.window_start;
        stats.record_cycle(100, 100, Duration::from_millis(3));

        assert!(!stats.poll(start + Duration::from_millis(500)));
        assert!(stats.poll(start + Duration::from_secs(1)));
        let snap = stats.snapshot(100, 0);
        assert!((snap.messages_per_second - 100.0).abs() < 1e-9);
        assert!((snap.processing_time_ms - 3.0).abs() < 1e-9);

        // Window counters reset, lifetime counters do not
        assert!(!stats.poll(start + Duration::from_millis(1500)));
        assert!(stats.poll(start + Duration::from_secs(2)));
        let snap = stats.snapshot(100, 0);
        assert_eq!(snap.messages_per_second, 0.0);
        assert_eq!(snap.total_received, 100);
    }

    #[test]
    fn test_decode_success_rate() {
        let mut stats = StatsWindow::new(Duration::from_secs(1));
        assert_eq!(stats.decode_success_rate(), 100.0);
        stats.record_decode(true);
        stats.record_decode(false);
        stats.record_decode(true);
        stats.record_decode(true);
        assert_eq!(stats.decode_success_rate(), 75.0);
    }

    #[test]
    fn test_rescan_replaces_filtered_count() {
        let mut stats = StatsWindow::new(Duration::from_secs(1));
        stats.record_cycle(10, 10, Duration::ZERO);
        stats.record_rescan(3);
        assert_eq!(stats.filtered_count(), 3);
        assert_eq!(stats.total_received(), 10);
    }
}
