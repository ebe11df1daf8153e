//! The harness's own low-quality linear congruential generator.
//!
//! This is deliberately not the `rand` crate. `ElimTable`'s peer-scan offset
//! and the verification tests' delay/selection logic were built against this
//! exact generator's period and distribution; swapping in a better PRNG would
//! silently change scan coverage and is one of the "do not guess intent"
//! carry-overs from the original harness.

/// Per-thread PRNG state seeded from a thread id and reseedable for
/// deterministic test runs.
#[derive(Debug, Clone, Copy)]
pub struct HarnessRng {
    state: u64,
}

impl HarnessRng {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// `next = next * 1103515245 + 12345; (next / 65536) % 32768`
    pub fn next(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(1_103_515_245)
            .wrapping_add(12_345);
        ((self.state / 65_536) % 32_768) as u32
    }

    /// Returns a value in `[0, bound)`. `bound` must be nonzero.
    pub fn next_bounded(&mut self, bound: u32) -> u32 {
        debug_assert!(bound > 0);
        self.next() % bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_sequence() {
        let mut rng = HarnessRng::new(1);
        let first_five: Vec<u32> = (0..5).map(|_| rng.next()).collect();
        // Recomputed by hand from the LCG definition for seed=1.
        let mut expect_state: u64 = 1;
        let expected: Vec<u32> = (0..5)
            .map(|_| {
                expect_state = expect_state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                ((expect_state / 65_536) % 32_768) as u32
            })
            .collect();
        assert_eq!(first_five, expected);
    }

    #[test]
    fn bounded_stays_in_range() {
        let mut rng = HarnessRng::new(42);
        for _ in 0..1000 {
            assert!(rng.next_bounded(7) < 7);
        }
    }
}
