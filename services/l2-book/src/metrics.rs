//! Observability for the book processor
//!
//! Counters for feed traffic and book mutations, plus latency tracking for
//! batch application and aggregation passes. Exported as a flat map for
//! Prometheus-style scraping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Core metrics for the book processor.
pub struct BookMetrics {
    // Feed traffic
    pub messages_received: AtomicU64,
    pub messages_ignored: AtomicU64,
    pub messages_stale: AtomicU64,
    pub messages_rejected: AtomicU64,

    // Book mutations
    pub snapshots_applied: AtomicU64,
    pub diffs_applied: AtomicU64,
    pub levels_applied: AtomicU64,
    pub discontinuities: AtomicU64,
    pub apply_latency_ns: Mutex<LatencyTracker>,

    // Aggregation
    pub aggregations: AtomicU64,
    pub aggregation_latency_ns: Mutex<LatencyTracker>,
}

impl BookMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_ignored: AtomicU64::new(0),
            messages_stale: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            snapshots_applied: AtomicU64::new(0),
            diffs_applied: AtomicU64::new(0),
            levels_applied: AtomicU64::new(0),
            discontinuities: AtomicU64::new(0),
            apply_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            aggregations: AtomicU64::new(0),
            aggregation_latency_ns: Mutex::new(LatencyTracker::new(1000)),
        }
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Message on another channel or without events.
    pub fn record_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Duplicate or out-of-date envelope.
    pub fn record_stale(&self) {
        self.messages_stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Message that failed decoding or was refused by the book.
    pub fn record_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self, levels: usize, latency_ns: u64) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        self.levels_applied.fetch_add(levels as u64, Ordering::Relaxed);
        if let Ok(mut tracker) = self.apply_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    pub fn record_diff(&self, levels: usize, latency_ns: u64) {
        self.diffs_applied.fetch_add(1, Ordering::Relaxed);
        self.levels_applied.fetch_add(levels as u64, Ordering::Relaxed);
        if let Ok(mut tracker) = self.apply_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    pub fn record_discontinuity(&self) {
        self.discontinuities.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aggregation(&self, latency_ns: u64) {
        self.aggregations.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut tracker) = self.aggregation_latency_ns.lock() {
            tracker.record(latency_ns);
        }
    }

    /// Check alert thresholds and generate alerts.
    pub fn check_thresholds(&self, thresholds: &AlertThresholds) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let rejected = self.messages_rejected.load(Ordering::Relaxed);
        if rejected > thresholds.max_rejected {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                metric: "messages_rejected".to_string(),
                message: format!("Messages rejected: {} > threshold {}", rejected, thresholds.max_rejected),
            });
        }

        let discontinuities = self.discontinuities.load(Ordering::Relaxed);
        if discontinuities > thresholds.max_discontinuities {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                metric: "discontinuities".to_string(),
                message: format!(
                    "Feed discontinuities: {} > threshold {}",
                    discontinuities, thresholds.max_discontinuities
                ),
            });
        }

        if let Ok(tracker) = self.aggregation_latency_ns.lock() {
            if let Some(p99) = tracker.percentile(99) {
                if p99 > thresholds.max_aggregation_p99_ns {
                    alerts.push(Alert {
                        level: AlertLevel::Warning,
                        metric: "aggregation_p99".to_string(),
                        message: format!(
                            "Aggregation p99: {}ns > threshold {}ns",
                            p99, thresholds.max_aggregation_p99_ns
                        ),
                    });
                }
            }
        }

        alerts
    }

    /// Export counters as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let counters = [
            ("messages_received", &self.messages_received),
            ("messages_ignored", &self.messages_ignored),
            ("messages_stale", &self.messages_stale),
            ("messages_rejected", &self.messages_rejected),
            ("snapshots_applied", &self.snapshots_applied),
            ("diffs_applied", &self.diffs_applied),
            ("levels_applied", &self.levels_applied),
            ("discontinuities", &self.discontinuities),
            ("aggregations", &self.aggregations),
        ];

        counters
            .into_iter()
            .map(|(name, counter)| (name.to_string(), counter.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for BookMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: Vec<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    /// Average latency.
    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Alert severity level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// An alert triggered by threshold breach.
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
}

/// Configurable alert thresholds.
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub max_rejected: u64,
    pub max_discontinuities: u64,
    /// Max aggregation p99 latency in nanoseconds.
    pub max_aggregation_p99_ns: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_rejected: 100,
            max_discontinuities: 10,
            max_aggregation_p99_ns: 5_000_000, // 5ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = BookMetrics::new();

        metrics.record_message();
        metrics.record_message();
        metrics.record_snapshot(20, 1_000);
        metrics.record_diff(3, 500);
        metrics.record_stale();

        let exported = metrics.export();
        assert_eq!(exported["messages_received"], 2);
        assert_eq!(exported["snapshots_applied"], 1);
        assert_eq!(exported["diffs_applied"], 1);
        assert_eq!(exported["levels_applied"], 23);
        assert_eq!(exported["messages_stale"], 1);
        assert_eq!(metrics.apply_latency_ns.lock().unwrap().count(), 2);
    }

    #[test]
    fn test_latency_tracker_percentile() {
        let mut tracker = LatencyTracker::new(100);

        for i in 1..=100 {
            tracker.record(i);
        }

        let p50 = tracker.percentile(50).unwrap();
        assert!((49..=51).contains(&p50));

        let p99 = tracker.percentile(99).unwrap();
        assert!((98..=100).contains(&p99));
    }

    #[test]
    fn test_latency_tracker_window_eviction() {
        let mut tracker = LatencyTracker::new(3);

        tracker.record(10);
        tracker.record(20);
        tracker.record(30);
        tracker.record(40); // Should evict 10

        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.average().unwrap(), 30);
    }

    #[test]
    fn test_alert_thresholds() {
        let metrics = BookMetrics::new();
        let thresholds = AlertThresholds {
            max_rejected: 2,
            max_discontinuities: 0,
            max_aggregation_p99_ns: 100,
        };

        assert!(metrics.check_thresholds(&thresholds).is_empty());

        for _ in 0..3 {
            metrics.record_rejected();
        }
        metrics.record_discontinuity();
        metrics.record_aggregation(1_000);

        let alerts = metrics.check_thresholds(&thresholds);
        let names: Vec<&str> = alerts.iter().map(|a| a.metric.as_str()).collect();
        assert_eq!(names, vec!["messages_rejected", "discontinuities", "aggregation_p99"]);
        assert_eq!(alerts[1].level, AlertLevel::Critical);
    }
}
