//! xorshift64* random number generator
//!
//! xorshift64* passes TestU01's BigCrush statistical tests with a 64-bit
//! state and 64-bit output.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers → same target assignment and
//! same planner matching order. Together with a replayed sequence of oracle
//! responses this makes a run exactly reproducible.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use agentic_economy_core_rs::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let index = rng.range(0, 10); // [0, 10)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// A zero seed is mapped to 1 (xorshift cannot leave the all-zero state).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate random value in range [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Uniform index in [0, len)
    ///
    /// # Panics
    /// Panics if `len == 0`
    pub fn index(&mut self, len: usize) -> usize {
        self.range(0, len as i64) as usize
    }

    /// Shuffle a slice in place (Fisher–Yates, back to front)
    ///
    /// # Example
    /// ```
    /// use agentic_economy_core_rs::RngManager;
    ///
    /// let mut rng = RngManager::new(7);
    /// let mut names = vec!["A0", "A1", "A2", "A3"];
    /// rng.shuffle(&mut names);
    /// assert_eq!(names.len(), 4);
    /// ```
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }

    /// Get current RNG state (for checkpointing/replay)
    pub fn get_state(&self) -> u64 {
        self.state
    }
}
