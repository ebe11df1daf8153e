//! Concurrent correctness tests: FIFO/LIFO linearization-order checks and a
//! liveness probe, each driven by the [`crate::core::uid::UidGenerator`].
//!
//! Every test produces a [`TestReport`] carrying the historical field
//! vocabulary (`insOps`, `remOps`, `phase1_*`, `notes`, ...) so that a
//! downstream recorder built against the original harness's CSV shape could
//! still consume it (see SPEC_FULL.md §4.6); the recorder itself is out of
//! scope here.

pub mod potato;
pub mod queue;
pub mod stack;

use serde::Serialize;

use crate::core::memory::stddev;

/// Outcome of one verification/throughput test run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TestReport {
    #[serde(rename = "insOps")]
    pub ins_ops: u64,
    #[serde(rename = "insOps_stddev")]
    pub ins_ops_stddev: f64,
    #[serde(rename = "insOps_each")]
    pub ins_ops_each: Vec<u64>,
    #[serde(rename = "remOps")]
    pub rem_ops: u64,
    #[serde(rename = "remOps_stddev")]
    pub rem_ops_stddev: f64,
    #[serde(rename = "remOps_each")]
    pub rem_ops_each: Vec<u64>,
    #[serde(rename = "remOpsEmpty")]
    pub rem_ops_empty: u64,
    #[serde(rename = "remOpsEmpty_stddev")]
    pub rem_ops_empty_stddev: f64,
    #[serde(rename = "remOpsEmpty_each")]
    pub rem_ops_empty_each: Vec<u64>,
    /// Total pushes completed in the last even-indexed (push) phase of
    /// [`stack::StackVerificationTest`]; `0` for tests that aren't phased.
    #[serde(rename = "phase1_ops")]
    pub phase1_ops: u64,
    /// Total pops completed in the last odd-indexed (drain) phase.
    #[serde(rename = "phase2_ops")]
    pub phase2_ops: u64,
    /// `"verify pass"` / `"verify fail (<n> violations)"` for verification
    /// tests; a short free-form note otherwise.
    pub notes: String,
}

impl TestReport {
    /// Builds the common `ins*`/`rem*`/`remEmpty*` fields from per-thread
    /// counters; callers fill in `phase1_ops`/`phase2_ops`/`notes`
    /// themselves.
    #[must_use]
    pub fn from_counts(ins_each: Vec<u64>, rem_each: Vec<u64>, rem_empty_each: Vec<u64>) -> Self {
        let to_f64 = |v: &[u64]| v.iter().map(|x| *x as f64).collect::<Vec<_>>();
        Self {
            ins_ops: ins_each.iter().sum(),
            ins_ops_stddev: stddev(&to_f64(&ins_each)),
            ins_ops_each: ins_each,
            rem_ops: rem_each.iter().sum(),
            rem_ops_stddev: stddev(&to_f64(&rem_each)),
            rem_ops_each: rem_each,
            rem_ops_empty: rem_empty_each.iter().sum(),
            rem_ops_empty_stddev: stddev(&to_f64(&rem_empty_each)),
            rem_ops_empty_each: rem_empty_each,
            phase1_ops: 0,
            phase2_ops: 0,
            notes: String::new(),
        }
    }
}
