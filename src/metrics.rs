//! Metrics collection for the earshot server
//!
//! Thread-safe counters using atomic operations, with a snapshot type and a
//! Prometheus text-format exposition used by the /metrics route.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the earshot server
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct ServeMetrics {
    total_requests: AtomicU64,
    feature_requests: AtomicU64,
    preview_requests: AtomicU64,
    temp_hits: AtomicU64,
    temp_misses: AtomicU64,
    serialize_failures: AtomicU64,
    bytes_served: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub feature_requests: u64,
    pub preview_requests: u64,
    pub temp_hits: u64,
    pub temp_misses: u64,
    pub serialize_failures: u64,
    pub bytes_served: u64,
}

impl ServeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record any inbound request
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a direct feature fetch
    pub fn record_feature_request(&self) {
        self.feature_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a REPL evaluate-and-preview request
    pub fn record_preview_request(&self) {
        self.preview_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lookup against the ephemeral result store
    pub fn record_temp_lookup(&self, hit: bool) {
        if hit {
            self.temp_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.temp_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed serialization
    pub fn record_serialize_failure(&self) {
        self.serialize_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes written to a client
    pub fn record_bytes_served(&self, bytes: u64) {
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get a consistent-enough snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            feature_requests: self.feature_requests.load(Ordering::Relaxed),
            preview_requests: self.preview_requests.load(Ordering::Relaxed),
            temp_hits: self.temp_hits.load(Ordering::Relaxed),
            temp_misses: self.temp_misses.load(Ordering::Relaxed),
            serialize_failures: self.serialize_failures.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
        }
    }
}

/// Format a snapshot in Prometheus text exposition format
pub fn format_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::new();

    let counters = [
        (
            "earshot_requests_total",
            "Total number of requests processed",
            snapshot.total_requests,
        ),
        (
            "earshot_feature_requests_total",
            "Number of direct feature fetches",
            snapshot.feature_requests,
        ),
        (
            "earshot_preview_requests_total",
            "Number of REPL evaluate-and-preview requests",
            snapshot.preview_requests,
        ),
        (
            "earshot_temp_hits_total",
            "Ephemeral store lookups that found a result",
            snapshot.temp_hits,
        ),
        (
            "earshot_temp_misses_total",
            "Ephemeral store lookups that found nothing",
            snapshot.temp_misses,
        ),
        (
            "earshot_serialize_failures_total",
            "Serializations that failed",
            snapshot.serialize_failures,
        ),
        (
            "earshot_bytes_served_total",
            "Total bytes written to clients",
            snapshot.bytes_served,
        ),
    ];

    for (name, help, value) in counters {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} counter\n", name));
        output.push_str(&format!("{} {}\n\n", name, value));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ServeMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_feature_request();
        metrics.record_preview_request();
        metrics.record_temp_lookup(true);
        metrics.record_temp_lookup(false);
        metrics.record_serialize_failure();
        metrics.record_bytes_served(1024);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.feature_requests, 1);
        assert_eq!(snapshot.preview_requests, 1);
        assert_eq!(snapshot.temp_hits, 1);
        assert_eq!(snapshot.temp_misses, 1);
        assert_eq!(snapshot.serialize_failures, 1);
        assert_eq!(snapshot.bytes_served, 1024);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = ServeMetrics::new();
        metrics.record_request();
        metrics.record_bytes_served(42);

        let output = format_prometheus(&metrics.snapshot());
        assert!(output.contains("# HELP earshot_requests_total"));
        assert!(output.contains("# TYPE earshot_requests_total counter"));
        assert!(output.contains("earshot_requests_total 1"));
        assert!(output.contains("earshot_bytes_served_total 42"));
    }
}
