//! Timestep functions
//!
//! Consulted once per step, before any update rule runs, with the step
//! counter already advanced to the step being computed.

use super::TimestepFunction;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::{SimulationError, SimulationResult};
use crate::rng::RngManager;

/// Fixed step size
#[derive(Debug, Clone, Copy)]
pub struct ConstantTimestepFunction {
    pub stepsize: f64,
}

impl TimestepFunction for ConstantTimestepFunction {
    fn next_increment(&mut self, _: &CumulativeTimestepsHistory) -> SimulationResult<f64> {
        Ok(self.stepsize)
    }
}

/// Exponentially distributed step sizes drawn from a seeded RNG
#[derive(Debug, Clone)]
pub struct ExponentialDistributionTimestepFunction {
    mean: f64,
    seed: u64,
    rng: RngManager,
}

impl ExponentialDistributionTimestepFunction {
    pub fn new(mean: f64, seed: u64) -> SimulationResult<Self> {
        if !(mean > 0.0 && mean.is_finite()) {
            return Err(SimulationError::InvalidConfig(format!(
                "exponential timestep mean must be positive and finite, got {}",
                mean
            )));
        }
        Ok(Self {
            mean,
            seed,
            rng: RngManager::new(seed),
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl TimestepFunction for ExponentialDistributionTimestepFunction {
    fn next_increment(&mut self, _: &CumulativeTimestepsHistory) -> SimulationResult<f64> {
        Ok(self.rng.next_exponential(self.mean))
    }
}

/// Replays the increments recorded in another simulation's time history
///
/// The run is meant to start from the oldest time in `data`. On step `s` the
/// increment is `data.at(depth - s - 1) - data.at(depth - s)`, exactly the
/// difference between consecutive recorded times; one step past the end of
/// the window it applies `data.next_increment()`, and beyond that the data is
/// exhausted.
#[derive(Debug, Clone)]
pub struct FromHistoryTimestepFunction {
    pub data: CumulativeTimestepsHistory,
}

impl FromHistoryTimestepFunction {
    pub fn new(data: CumulativeTimestepsHistory) -> Self {
        Self { data }
    }
}

impl TimestepFunction for FromHistoryTimestepFunction {
    fn next_increment(
        &mut self,
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> SimulationResult<f64> {
        let depth = self.data.depth();
        let step = timesteps_history.current_step_number();
        match step.cmp(&depth) {
            std::cmp::Ordering::Less if step > 0 => {
                Ok(self.data.at(depth - step - 1) - self.data.at(depth - step))
            }
            std::cmp::Ordering::Less => Err(SimulationError::InvalidConfig(
                "timestep requested before the first step".to_string(),
            )),
            std::cmp::Ordering::Equal => Ok(self.data.next_increment()),
            std::cmp::Ordering::Greater => Err(SimulationError::MemoryExhausted { step, depth }),
        }
    }
}
