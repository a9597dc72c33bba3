//! Observability metrics for the sequence generator.
//!
//! All metrics use lock-free atomics so recording never adds contention
//! to the increment path.

pub mod generator;
pub mod histogram;

pub use generator::GeneratorMetrics;
pub use histogram::{Histogram, HistogramSnapshot, LATENCY_BUCKETS_US};
