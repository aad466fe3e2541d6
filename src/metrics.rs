//! Scoring statistics for the driver: row counts, failures and latency.

use crate::error::{ErrorKind, ScoringError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

const MAX_SAMPLES: usize = 10_000;

/// Metrics collector for scored rows
pub struct ScoringMetrics {
    /// Rows scored successfully
    pub rows_scored: AtomicU64,
    /// Rows that failed to score
    pub rows_failed: AtomicU64,
    failures_by_kind: RwLock<HashMap<ErrorKind, u64>>,
    /// Scoring latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Predicted label counts (classifiers only)
    labels: RwLock<HashMap<String, u64>>,
    start_time: Instant,
}

impl ScoringMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            rows_scored: AtomicU64::new(0),
            rows_failed: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            labels: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a successfully scored row
    pub fn record_success(&self, latency: Duration, label: Option<&str>) {
        self.rows_scored.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        if let Some(label) = label {
            if let Ok(mut labels) = self.labels.write() {
                *labels.entry(label.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Record a row that failed to score
    pub fn record_failure(&self, error: &ScoringError) {
        self.rows_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(error.kind()).or_insert(0) += 1;
        }
    }

    /// Latency statistics over the retained samples
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) => times.clone(),
            Err(_) => return LatencyStats::default(),
        };
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    pub fn failures_by_kind(&self) -> HashMap<ErrorKind, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn label_counts(&self) -> HashMap<String, u64> {
        self.labels.read().map(|m| m.clone()).unwrap_or_default()
    }

    /// Rows per second since creation
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.rows_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Log summary statistics
    pub fn log_summary(&self) {
        let scored = self.rows_scored.load(Ordering::Relaxed);
        let failed = self.rows_failed.load(Ordering::Relaxed);
        let latency = self.latency_stats();

        info!(
            rows_scored = scored,
            rows_failed = failed,
            throughput = self.throughput(),
            "Scoring summary"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Scoring latency"
        );
        for (kind, count) in self.failures_by_kind() {
            info!(kind = %kind, count, "Failures");
        }
        let mut labels: Vec<_> = self.label_counts().into_iter().collect();
        labels.sort();
        for (label, count) in labels {
            let pct = if scored > 0 {
                count as f64 / scored as f64 * 100.0
            } else {
                0.0
            };
            info!(label = %label, count, "Predicted {:.1}%", pct);
        }
    }
}

impl Default for ScoringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}
