//! Metrics Recorder Trait
//!
//! Defines a trait abstraction for metrics recording:
//! - Production: plug in any backend (statsd, prometheus, ...)
//! - Tests: in-memory recording via [`SimulatedMetrics`]
//!
//! The store never talks to a metrics backend directly.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for recording aggregator metrics
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Increment a counter by 1
    fn incr(&self, name: &str, tags: &[&str]);

    /// Record a histogram/distribution value
    fn histogram(&self, name: &str, value: f64, tags: &[&str]);

    /// Set a gauge value
    fn gauge(&self, name: &str, value: f64, tags: &[&str]);

    /// An event was applied to the store
    fn record_event(&self) {
        self.incr("events.ingested", &[]);
    }

    /// An event was rejected as invalid
    fn record_rejected(&self, reason: &str) {
        let reason_tag = format!("reason:{}", reason);
        self.incr("events.rejected", &[&reason_tag]);
    }

    /// A new bucket was opened
    fn record_window_created(&self) {
        self.incr("windows.created", &[]);
    }

    /// Buckets dropped by the retention cap
    fn record_eviction(&self, count: usize) {
        if count > 0 {
            self.incr("windows.evictions", &[]);
            self.histogram("windows.evictions.batch_size", count as f64, &[]);
        }
    }

    /// A snapshot was taken or restored
    fn record_snapshot(&self, operation: &str, subjects: usize, windows: usize) {
        let op_tag = format!("op:{}", operation);
        self.incr("snapshot.count", &[&op_tag]);
        self.gauge("snapshot.subjects", subjects as f64, &[&op_tag]);
        self.gauge("snapshot.windows", windows as f64, &[&op_tag]);
    }
}

/// No-op metrics recorder - zero overhead when metrics are disabled
#[derive(Clone, Default)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    #[inline]
    fn incr(&self, _name: &str, _tags: &[&str]) {}
    #[inline]
    fn histogram(&self, _name: &str, _value: f64, _tags: &[&str]) {}
    #[inline]
    fn gauge(&self, _name: &str, _value: f64, _tags: &[&str]) {}
}

/// Recorded metric for tests
#[derive(Debug, Clone)]
pub struct RecordedMetric {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub metric_type: MetricType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// In-memory recorder that keeps every metric for later assertions
#[derive(Default)]
pub struct SimulatedMetrics {
    recorded: Mutex<Vec<RecordedMetric>>,
    event_count: AtomicU64,
    rejected_count: AtomicU64,
    eviction_count: AtomicU64,
}

impl SimulatedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_recorded(&self) -> Vec<RecordedMetric> {
        self.recorded.lock().clone()
    }

    pub fn get_by_name(&self, name: &str) -> Vec<RecordedMetric> {
        self.recorded
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::SeqCst)
    }

    /// Total buckets evicted (not batches)
    pub fn eviction_count(&self) -> u64 {
        self.eviction_count.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.recorded.lock().clear();
        self.event_count.store(0, Ordering::SeqCst);
        self.rejected_count.store(0, Ordering::SeqCst);
        self.eviction_count.store(0, Ordering::SeqCst);
    }

    pub fn assert_metric(&self, name: &str, metric_type: MetricType) -> bool {
        self.recorded
            .lock()
            .iter()
            .any(|m| m.name == name && m.metric_type == metric_type)
    }

    fn push(&self, name: &str, value: f64, tags: &[&str], metric_type: MetricType) {
        self.recorded.lock().push(RecordedMetric {
            name: name.to_string(),
            value,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            metric_type,
        });
    }
}

impl MetricsRecorder for SimulatedMetrics {
    fn incr(&self, name: &str, tags: &[&str]) {
        self.push(name, 1.0, tags, MetricType::Counter);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[&str]) {
        self.push(name, value, tags, MetricType::Histogram);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[&str]) {
        self.push(name, value, tags, MetricType::Gauge);
    }

    fn record_event(&self) {
        self.event_count.fetch_add(1, Ordering::SeqCst);
        self.incr("events.ingested", &[]);
    }

    fn record_rejected(&self, reason: &str) {
        self.rejected_count.fetch_add(1, Ordering::SeqCst);
        let reason_tag = format!("reason:{}", reason);
        self.incr("events.rejected", &[&reason_tag]);
    }

    fn record_eviction(&self, count: usize) {
        if count > 0 {
            self.eviction_count.fetch_add(count as u64, Ordering::SeqCst);
            self.incr("windows.evictions", &[]);
            self.histogram("windows.evictions.batch_size", count as f64, &[]);
        }
    }
}

/// Arc wrapper for trait object usage
pub type SharedMetrics = Arc<dyn MetricsRecorder>;

pub fn noop_metrics() -> SharedMetrics {
    Arc::new(NoopMetrics)
}

pub fn simulated_metrics() -> Arc<SimulatedMetrics> {
    Arc::new(SimulatedMetrics::new())
}
