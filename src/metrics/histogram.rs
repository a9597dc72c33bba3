//! Lock-free latency histogram for `next` calls.
//!
//! Buckets cover a storage round-trip, from a warm in-memory store to a
//! transaction that waited on a contended lock.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of finite buckets.
pub const BUCKET_COUNT: usize = 12;

/// Fixed histogram bucket upper bounds in microseconds (100μs to 5s).
pub const LATENCY_BUCKETS_US: [u64; BUCKET_COUNT] = [
    100,
    250,
    500,
    1_000,
    2_500,
    5_000,
    10_000,
    25_000,
    100_000,
    250_000,
    1_000_000,
    5_000_000,
];

/// Thread-safe histogram with cumulative buckets.
///
/// # Example
///
/// ```
/// use docseq::metrics::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.observe(1_500);
///
/// let snapshot = histogram.snapshot();
/// assert_eq!(snapshot.count, 1);
/// assert_eq!(snapshot.sum, 1_500);
/// ```
pub struct Histogram {
    sum: AtomicU64,
    count: AtomicU64,
    /// Cumulative: each bucket also counts everything in smaller buckets.
    buckets: [AtomicU64; BUCKET_COUNT],
}

/// Point-in-time copy of a [`Histogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub sum: u64,
    pub count: u64,
    pub buckets: [u64; BUCKET_COUNT],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    #[allow(clippy::declare_interior_mutable_const)]
    pub fn new() -> Self {
        const ZERO: AtomicU64 = AtomicU64::new(0);
        Self {
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: [ZERO; BUCKET_COUNT],
        }
    }

    /// Records one observation in microseconds.
    #[inline]
    pub fn observe(&self, value_us: u64) {
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (bucket, &bound) in self.buckets.iter().zip(LATENCY_BUCKETS_US.iter()) {
            if value_us <= bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut buckets = [0u64; BUCKET_COUNT];
        for (out, bucket) in buckets.iter_mut().zip(self.buckets.iter()) {
            *out = bucket.load(Ordering::Relaxed);
        }
        HistogramSnapshot {
            sum: self.sum.load(Ordering::Relaxed),
            count: self.count.load(Ordering::Relaxed),
            buckets,
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Formats the histogram in Prometheus exposition format.
    pub fn format_prometheus(&self, name: &str, help: &str) -> String {
        let snapshot = self.snapshot();
        let mut output = String::with_capacity(1024);

        let _ = writeln!(output, "# HELP {name} {help}");
        let _ = writeln!(output, "# TYPE {name} histogram");
        for (bound, count) in LATENCY_BUCKETS_US.iter().zip(snapshot.buckets.iter()) {
            let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {count}");
        }
        let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {}", snapshot.count);
        let _ = writeln!(output, "{name}_sum {}", snapshot.sum);
        let _ = writeln!(output, "{name}_count {}", snapshot.count);

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_accumulates_sum_and_count() {
        let h = Histogram::new();
        h.observe(50);
        h.observe(400);
        h.observe(9_000);

        let s = h.snapshot();
        assert_eq!(s.sum, 9_450);
        assert_eq!(s.count, 3);
    }

    #[test]
    fn buckets_are_cumulative() {
        let h = Histogram::new();
        h.observe(90); // <= 100
        h.observe(200); // <= 250
        h.observe(800); // <= 1_000
        h.observe(10_000_000); // beyond every bucket

        let s = h.snapshot();
        assert_eq!(s.count, 4);
        assert_eq!(s.buckets[0], 1);
        assert_eq!(s.buckets[1], 2);
        assert_eq!(s.buckets[2], 2);
        assert_eq!(s.buckets[3], 3);
        assert_eq!(s.buckets[BUCKET_COUNT - 1], 3);
    }

    #[test]
    fn prometheus_format() {
        let h = Histogram::new();
        h.observe(120);
        h.observe(30);

        let output = h.format_prometheus("docseq_next_latency_us", "Latency of next calls");
        assert!(output.contains("# HELP docseq_next_latency_us Latency of next calls"));
        assert!(output.contains("# TYPE docseq_next_latency_us histogram"));
        assert!(output.contains("docseq_next_latency_us_bucket{le=\"100\"} 1"));
        assert!(output.contains("docseq_next_latency_us_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("docseq_next_latency_us_sum 150"));
    }

    #[test]
    fn concurrent_observations() {
        use std::sync::Arc;
        use std::thread;

        let h = Arc::new(Histogram::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                thread::spawn(move || {
                    for i in 0..500 {
                        h.observe(i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(h.count(), 4_000);
    }
}
