use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Gauge that can move in both directions.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn increment(&self, delta: i64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn decrement(&self, delta: i64) {
        self.value.fetch_sub(delta, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct HistogramInner {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

/// Histogram with cumulative sum and count, for latency measurements in
/// seconds.
///
/// Bucket assignment scans linearly, which is fine for the default dozen
/// buckets.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    inner: Mutex<HistogramInner>,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let slots = buckets.len() + 1;
        Self {
            buckets,
            inner: Mutex::new(HistogramInner {
                counts: vec![0; slots],
                sum: 0.0,
                count: 0,
            }),
        }
    }

    /// Exponentially spaced upper bounds from 1 ms to 10 s.
    pub fn default_buckets() -> Vec<f64> {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]
    }

    pub fn observe(&self, value: f64) {
        let mut inner = self.inner.lock();
        inner.sum += value;
        inner.count += 1;
        for (i, bound) in self.buckets.iter().enumerate() {
            if value <= *bound {
                inner.counts[i] += 1;
                return;
            }
        }
        // +Inf bucket
        let last = inner.counts.len() - 1;
        inner.counts[last] += 1;
    }

    pub fn sum(&self) -> f64 {
        self.inner.lock().sum
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count
    }

    pub fn mean(&self) -> f64 {
        let inner = self.inner.lock();
        if inner.count > 0 {
            inner.sum / inner.count as f64
        } else {
            0.0
        }
    }

    /// Per-bucket counts, the final slot being the +Inf overflow bucket.
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.inner.lock().counts.clone()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(Self::default_buckets())
    }
}

/// Point-in-time view of runtime-wide metrics.
#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    pub total_events_processed: u64,
    pub events_per_second: u64,
    pub avg_latency_ms: f64,
    pub total_queue_size: usize,
    pub backpressure_events: u64,
    pub uptime: Duration,
}

#[derive(Debug)]
struct SnapshotCursor {
    last_time: Instant,
    last_events: u64,
}

/// Aggregates the global counters the runtime updates during execution.
#[derive(Debug)]
pub struct MetricsCollector {
    start_time: Instant,
    cursor: Mutex<SnapshotCursor>,
    events_processed: Counter,
    events_dropped: Counter,
    backpressure_events: Counter,
    processing_latency: Histogram,
    total_queue_size: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            cursor: Mutex::new(SnapshotCursor {
                last_time: now,
                last_events: 0,
            }),
            events_processed: Counter::new(),
            events_dropped: Counter::new(),
            backpressure_events: Counter::new(),
            processing_latency: Histogram::default(),
            total_queue_size: Gauge::new(),
        }
    }

    pub fn events_processed(&self) -> &Counter {
        &self.events_processed
    }

    pub fn events_dropped(&self) -> &Counter {
        &self.events_dropped
    }

    pub fn backpressure_events(&self) -> &Counter {
        &self.backpressure_events
    }

    pub fn processing_latency(&self) -> &Histogram {
        &self.processing_latency
    }

    pub fn total_queue_size(&self) -> &Gauge {
        &self.total_queue_size
    }

    /// Collect a snapshot; the rate is computed over the interval since the
    /// previous snapshot.
    pub fn snapshot(&self) -> RuntimeMetrics {
        let now = Instant::now();
        let total = self.events_processed.value();

        let mut cursor = self.cursor.lock();
        let elapsed = now.duration_since(cursor.last_time).as_secs_f64();
        let events_per_second = if elapsed > 0.0 {
            ((total - cursor.last_events) as f64 / elapsed) as u64
        } else {
            0
        };
        cursor.last_time = now;
        cursor.last_events = total;
        drop(cursor);

        RuntimeMetrics {
            total_events_processed: total,
            events_per_second,
            avg_latency_ms: self.processing_latency.mean() * 1000.0,
            total_queue_size: self.total_queue_size.value().max(0) as usize,
            backpressure_events: self.backpressure_events.value(),
            uptime: self.uptime(),
        }
    }

    /// Human-readable one-line summary.
    pub fn format(&self) -> String {
        let m = self.snapshot();
        format!(
            "Events: {} | Rate: {} evt/s | Latency: {:.2} ms | Queue: {} | Backpressure: {}",
            m.total_events_processed,
            m.events_per_second,
            m.avg_latency_ms,
            m.total_queue_size,
            m.backpressure_events
        )
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.increment();
        counter.add(4);
        assert_eq!(counter.value(), 5);
        counter.reset();
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        gauge.set(10);
        gauge.increment(5);
        gauge.decrement(3);
        assert_eq!(gauge.value(), 12);
    }

    #[test]
    fn test_histogram_buckets() {
        let histogram = Histogram::new(vec![0.01, 0.1, 1.0]);
        histogram.observe(0.005);
        histogram.observe(0.05);
        histogram.observe(0.5);
        histogram.observe(5.0);

        assert_eq!(histogram.count(), 4);
        assert!((histogram.sum() - 5.555).abs() < 1e-9);
        assert_eq!(histogram.bucket_counts(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_histogram_mean_empty() {
        let histogram = Histogram::default();
        assert_eq!(histogram.mean(), 0.0);
    }

    #[test]
    fn test_collector_snapshot() {
        let collector = MetricsCollector::new();
        for _ in 0..100 {
            collector.events_processed().increment();
        }
        collector.processing_latency().observe(0.002);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_events_processed, 100);
        assert!((snapshot.avg_latency_ms - 2.0).abs() < 1e-9);
        assert!(collector.uptime() > Duration::ZERO);
    }
}
