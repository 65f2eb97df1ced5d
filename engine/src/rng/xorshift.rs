//! xorshift64* random number generator
//!
//! This is a fast, high-quality PRNG that is deterministic and suitable
//! for simulation purposes.
//!
//! # Algorithm
//!
//! xorshift64* is a variant of xorshift that passes TestU01's BigCrush
//! statistical tests. It uses 64-bit state and produces 64-bit output.
//!
//! # Determinism
//!
//! Same seed → same sequence of random numbers. Every stochastic update rule
//! and timestep function owns one `RngManager` seeded from its partition's
//! seed, so a simulation is reproducible from its `Settings` alone.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use lockstep_engine::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let uniform = rng.next_f64(); // [0.0, 1.0)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Internal state (64-bit)
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// # Example
    /// ```
    /// use lockstep_engine::RngManager;
    ///
    /// let rng = RngManager::new(12345);
    /// ```
    pub fn new(seed: u64) -> Self {
        // Ensure seed is never zero (xorshift requirement)
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        // xorshift64* algorithm
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Get current RNG state (for replay)
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    ///
    /// # Example
    /// ```
    /// use lockstep_engine::RngManager;
    ///
    /// let mut rng = RngManager::new(12345);
    /// let probability = rng.next_f64();
    /// assert!(probability >= 0.0 && probability < 1.0);
    /// ```
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // Convert to [0.0, 1.0) by dividing by 2^53
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Sample a standard normal variate (Box-Muller)
    pub fn next_normal(&mut self) -> f64 {
        // 1 - u lies in (0, 1], keeping ln finite
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Sample an exponential variate with the given mean
    ///
    /// # Panics
    /// Panics if mean is not positive
    pub fn next_exponential(&mut self, mean: f64) -> f64 {
        assert!(mean > 0.0, "mean must be positive");
        -mean * (1.0 - self.next_f64()).ln()
    }
}
