//! Per-operation latency/throughput tracking shared by the verification
//! tests and `DequeLatencyTest`. Adapted from the historical allocator's
//! latency tracker — same ring-buffer-plus-sorted-cache percentile scheme,
//! retargeted at deque operation counts instead of allocation byte counts.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const HISTORY_SIZE: usize = 1000;
const PERCENTILES: &[f64] = &[0.5, 0.9, 0.95, 0.99, 0.999];

#[derive(Debug, Clone, Copy)]
pub struct LatencyStats {
    pub mean_ns: f64,
    pub median_ns: f64,
    pub p90_ns: f64,
    pub p95_ns: f64,
    pub p99_ns: f64,
    pub p999_ns: f64,
    pub min_ns: u64,
    pub max_ns: u64,
}

#[derive(Debug)]
struct LatencyTracker {
    samples: VecDeque<u64>,
    sorted_cache: Vec<u64>,
    cache_valid: bool,
}

impl LatencyTracker {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_SIZE),
            sorted_cache: Vec::with_capacity(HISTORY_SIZE),
            cache_valid: false,
        }
    }

    fn record(&mut self, latency_ns: u64) {
        if self.samples.len() >= HISTORY_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ns);
        self.cache_valid = false;
    }

    fn get_percentile(&mut self, percentile: f64) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        if !self.cache_valid {
            self.sorted_cache.clear();
            self.sorted_cache.extend(self.samples.iter());
            self.sorted_cache.sort_unstable();
            self.cache_valid = true;
        }
        let index = ((self.sorted_cache.len() as f64 - 1.0) * percentile) as usize;
        self.sorted_cache[index]
    }

    fn get_stats(&mut self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats {
                mean_ns: 0.0,
                median_ns: 0.0,
                p90_ns: 0.0,
                p95_ns: 0.0,
                p99_ns: 0.0,
                p999_ns: 0.0,
                min_ns: 0,
                max_ns: 0,
            };
        }
        let sum: u64 = self.samples.iter().sum();
        let mean = sum as f64 / self.samples.len() as f64;
        LatencyStats {
            mean_ns: mean,
            median_ns: self.get_percentile(PERCENTILES[0]) as f64,
            p90_ns: self.get_percentile(PERCENTILES[1]) as f64,
            p95_ns: self.get_percentile(PERCENTILES[2]) as f64,
            p99_ns: self.get_percentile(PERCENTILES[3]) as f64,
            p999_ns: self.get_percentile(PERCENTILES[4]) as f64,
            min_ns: *self.samples.iter().min().unwrap_or(&0),
            max_ns: *self.samples.iter().max().unwrap_or(&0),
        }
    }
}

/// Accumulates a single thread's operation counts and latencies for one
/// phase of a test run (e.g. one `insOps`/`remOps` counter pair).
#[derive(Debug)]
pub struct OpStats {
    ops: AtomicU64,
    empty_ops: AtomicU64,
    latency: RwLock<LatencyTracker>,
    start: Instant,
}

impl OpStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: AtomicU64::new(0),
            empty_ops: AtomicU64::new(0),
            latency: RwLock::new(LatencyTracker::new()),
            start: Instant::now(),
        }
    }

    pub fn record(&self, latency_ns: u64, was_empty: bool) {
        self.ops.fetch_add(1, Ordering::Relaxed);
        if was_empty {
            self.empty_ops.fetch_add(1, Ordering::Relaxed);
        }
        self.latency.write().record(latency_ns);
    }

    #[must_use]
    pub fn ops(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn empty_ops(&self) -> u64 {
        self.empty_ops.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn ops_per_sec(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.ops() as f64 / elapsed
        }
    }

    #[must_use]
    pub fn latency_stats(&self) -> LatencyStats {
        self.latency.write().get_stats()
    }
}

impl Default for OpStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple wall-clock span, used to time a single operation before handing
/// its nanosecond count to [`OpStats::record`].
#[derive(Debug, Clone, Copy)]
pub struct OpTimer {
    start: Instant,
}

impl OpTimer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// Standard deviation helper used when aggregating per-thread `OpStats`
/// into a `TestReport`'s `*_stddev` fields.
#[must_use]
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ops_and_empty_ops() {
        let stats = OpStats::new();
        stats.record(100, false);
        stats.record(200, true);
        assert_eq!(stats.ops(), 2);
        assert_eq!(stats.empty_ops(), 1);
    }

    #[test]
    fn stddev_of_identical_values_is_zero() {
        assert_eq!(stddev(&[5.0, 5.0, 5.0]), 0.0);
    }
}
