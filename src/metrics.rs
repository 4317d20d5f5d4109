// Performance metrics module
//
// Provides lightweight metrics tracking for conversion and export throughput

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Pipeline metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Conversion tasks update these from tokio workers; the summary is logged
/// on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Conversions started, including restarts after a settings change
    pub conversions_started: AtomicUsize,

    /// Conversions whose result was committed
    pub conversions_completed: AtomicUsize,

    /// Conversions whose failure was committed
    pub conversions_failed: AtomicUsize,

    /// Results discarded because a newer conversion superseded them
    pub stale_results: AtomicUsize,

    /// Archives built successfully
    pub exports_completed: AtomicUsize,

    /// Export attempts that failed
    pub exports_failed: AtomicUsize,

    /// Total time spent on committed conversions, in milliseconds
    pub total_conversion_time_ms: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            conversions_started: AtomicUsize::new(0),
            conversions_completed: AtomicUsize::new(0),
            conversions_failed: AtomicUsize::new(0),
            stale_results: AtomicUsize::new(0),
            exports_completed: AtomicUsize::new(0),
            exports_failed: AtomicUsize::new(0),
            total_conversion_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_conversion_started(&self) {
        self.conversions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed conversion and the time it took
    pub fn record_conversion_completed(&self, duration: Duration) {
        self.conversions_completed.fetch_add(1, Ordering::Relaxed);
        self.total_conversion_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_conversion_failed(&self) {
        self.conversions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_result(&self) {
        self.stale_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export_completed(&self) {
        self.exports_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export_failed(&self) {
        self.exports_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average conversion time per committed image in milliseconds
    pub fn avg_conversion_time_ms(&self) -> f64 {
        let total = self.total_conversion_time_ms.load(Ordering::Relaxed);
        let count = self.conversions_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Performance Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Conversions: {} started, {} completed, {} failed, {} stale",
            self.conversions_started.load(Ordering::Relaxed),
            self.conversions_completed.load(Ordering::Relaxed),
            self.conversions_failed.load(Ordering::Relaxed),
            self.stale_results.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total conversion time: {:.2}s (avg: {:.2}ms per image)",
            self.total_conversion_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_conversion_time_ms()
        );
        tracing::info!(
            "Exports: {} completed, {} failed",
            self.exports_completed.load(Ordering::Relaxed),
            self.exports_failed.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.conversions_started.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.exports_completed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_conversion_operations() {
        let metrics = Metrics::new();

        metrics.record_conversion_started();
        metrics.record_conversion_started();
        metrics.record_conversion_started();
        metrics.record_conversion_completed(Duration::from_millis(100));
        metrics.record_conversion_completed(Duration::from_millis(200));
        metrics.record_stale_result();

        assert_eq!(metrics.conversions_started.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.conversions_completed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.stale_results.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_conversion_time_ms.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.avg_conversion_time_ms(), 150.0);
    }

    #[test]
    fn test_avg_conversion_time_no_conversions() {
        let metrics = Metrics::new();
        metrics.record_conversion_failed();
        assert_eq!(metrics.avg_conversion_time_ms(), 0.0);
    }

    #[test]
    fn test_export_counters() {
        let metrics = Metrics::new();
        metrics.record_export_completed();
        metrics.record_export_failed();
        metrics.record_export_failed();

        assert_eq!(metrics.exports_completed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.exports_failed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
