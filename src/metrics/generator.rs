//! Counters for the sequence generator.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::Histogram;

/// Metrics recorded by [`StoreSequenceGenerator`](crate::storage::StoreSequenceGenerator).
///
/// Share one instance across generators with `Arc`.
#[derive(Default)]
pub struct GeneratorMetrics {
    /// Numbers successfully issued
    pub issued_total: AtomicU64,
    /// Numbers issued per sequence name
    pub issued_by_sequence: DashMap<String, AtomicU64>,
    /// Counters created on first use
    pub counters_created_total: AtomicU64,
    /// Create races resolved by re-reading the row
    pub create_conflicts_total: AtomicU64,
    /// Transactions restarted after an isolation conflict
    pub isolation_retries_total: AtomicU64,
    /// Calls that returned an error
    pub failures_total: AtomicU64,
    /// Latency of successful `next` calls, including retries
    pub next_latency_us: Histogram,
}

impl GeneratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_issued(&self, sequence: &str, latency_us: u64) {
        self.issued_total.fetch_add(1, Ordering::Relaxed);
        self.next_latency_us.observe(latency_us);
        self.issued_by_sequence
            .entry(sequence.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_created(&self) {
        self.counters_created_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_create_conflict(&self) {
        self.create_conflicts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_isolation_retries(&self, retries: u64) {
        if retries > 0 {
            self.isolation_retries_total
                .fetch_add(retries, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Numbers issued so far for one sequence.
    pub fn issued_for(&self, sequence: &str) -> u64 {
        self.issued_by_sequence
            .get(sequence)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Formats all generator metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        let counters = [
            (
                "docseq_issued_total",
                "Total numbers issued",
                &self.issued_total,
            ),
            (
                "docseq_counters_created_total",
                "Counters created on first use",
                &self.counters_created_total,
            ),
            (
                "docseq_create_conflicts_total",
                "Concurrent counter creations resolved by re-reading",
                &self.create_conflicts_total,
            ),
            (
                "docseq_isolation_retries_total",
                "Transactions restarted after an isolation conflict",
                &self.isolation_retries_total,
            ),
            (
                "docseq_failures_total",
                "Calls to next that returned an error",
                &self.failures_total,
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {}", value.load(Ordering::Relaxed));
            output.push('\n');
        }

        let _ = writeln!(
            output,
            "# HELP docseq_issued_by_sequence_total Numbers issued per sequence"
        );
        let _ = writeln!(output, "# TYPE docseq_issued_by_sequence_total counter");
        for entry in self.issued_by_sequence.iter() {
            let _ = writeln!(
                output,
                "docseq_issued_by_sequence_total{{sequence=\"{}\"}} {}",
                escape_label_value(entry.key()),
                entry.value().load(Ordering::Relaxed)
            );
        }
        output.push('\n');

        output.push_str(&self.next_latency_us.format_prometheus(
            "docseq_next_latency_us",
            "Latency of successful next calls in microseconds",
        ));

        output
    }
}

/// Escapes `\`, `"` and newlines in a Prometheus label value.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_sequence_counts() {
        let m = GeneratorMetrics::new();
        m.record_issued("Customer", 120);
        m.record_issued("Customer", 80);
        m.record_issued("Product", 40);

        assert_eq!(m.issued_total.load(Ordering::Relaxed), 3);
        assert_eq!(m.issued_for("Customer"), 2);
        assert_eq!(m.issued_for("Product"), 1);
        assert_eq!(m.issued_for("Supplier"), 0);
        assert_eq!(m.next_latency_us.count(), 3);
    }

    #[test]
    fn zero_retries_are_not_recorded() {
        let m = GeneratorMetrics::new();
        m.record_isolation_retries(0);
        m.record_isolation_retries(2);
        assert_eq!(m.isolation_retries_total.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn prometheus_output_contains_all_series() {
        let m = GeneratorMetrics::new();
        m.record_issued("SalesInvoice", 500);
        m.record_created();
        m.record_failure();

        let out = m.format_prometheus();
        assert!(out.contains("docseq_issued_total 1"));
        assert!(out.contains("docseq_counters_created_total 1"));
        assert!(out.contains("docseq_failures_total 1"));
        assert!(out.contains("docseq_issued_by_sequence_total{sequence=\"SalesInvoice\"} 1"));
        assert!(out.contains("# TYPE docseq_next_latency_us histogram"));
    }

    #[test]
    fn sequence_labels_are_escaped() {
        let metrics = GeneratorMetrics::new();
        metrics.record_issued("Say \"hi\"\\now\nline", 10);

        let out = metrics.format_prometheus();
        assert!(
            out.contains(r#"docseq_issued_by_sequence_total{sequence="Say \"hi\"\\now\nline"} 1"#),
            "{out}"
        );
        assert!(out
            .lines()
            .filter(|l| l.starts_with("docseq_issued_by_sequence_total"))
            .all(|l| l.ends_with(" 1")));
    }
}
