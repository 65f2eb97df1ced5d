//! Cumulative time management for the simulation
//!
//! The simulation advances in discrete steps of variable length. The time
//! axis is kept as a windowed history of cumulative elapsed time that obeys
//! the same shift-then-insert rule as state histories.

use crate::error::{SimulationError, SimulationResult};
use serde::{Deserialize, Serialize};

/// Windowed history of cumulative elapsed time
///
/// # Example
/// ```
/// use lockstep_engine::CumulativeTimestepsHistory;
///
/// let mut time = CumulativeTimestepsHistory::new(3, 0.0).unwrap();
/// assert_eq!(time.current_step_number(), 0);
///
/// time.begin_step();
/// time.set_next_increment(0.5);
/// assert_eq!(time.current_step_number(), 1);
/// assert_eq!(time.next_time(), 0.5);
///
/// time.shift_and_insert(time.next_time());
/// assert_eq!(time.current_time(), 0.5);
/// assert_eq!(time.at(1), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimestepsHistoryData")]
pub struct CumulativeTimestepsHistory {
    /// Increment that will be applied at the end of the current step
    next_increment: f64,
    /// Cumulative times, most recent first
    values: Vec<f64>,
    /// Steps started since the simulation began
    current_step_number: usize,
}

/// Unchecked serialized form of a [`CumulativeTimestepsHistory`]
#[derive(Deserialize)]
struct TimestepsHistoryData {
    next_increment: f64,
    values: Vec<f64>,
    current_step_number: usize,
}

impl TryFrom<TimestepsHistoryData> for CumulativeTimestepsHistory {
    type Error = SimulationError;

    fn try_from(data: TimestepsHistoryData) -> SimulationResult<Self> {
        Self::from_values(data.values, data.next_increment, data.current_step_number)
    }
}

impl CumulativeTimestepsHistory {
    /// Create a history of the given depth starting at `init_time`
    pub fn new(depth: usize, init_time: f64) -> SimulationResult<Self> {
        if depth == 0 {
            return Err(SimulationError::InvalidConfig(
                "timesteps history depth must be > 0".to_string(),
            ));
        }
        let mut values = vec![0.0; depth];
        values[0] = init_time;
        Ok(Self {
            next_increment: 0.0,
            values,
            current_step_number: 0,
        })
    }

    /// Build a history from cumulative times ordered most recent first
    pub fn from_values(
        values: Vec<f64>,
        next_increment: f64,
        current_step_number: usize,
    ) -> SimulationResult<Self> {
        if values.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "timesteps history depth must be > 0".to_string(),
            ));
        }
        Ok(Self {
            next_increment,
            values,
            current_step_number,
        })
    }

    /// Current cumulative time (row 0)
    pub fn current_time(&self) -> f64 {
        self.values[0]
    }

    /// Cumulative time `index` steps ago
    pub fn at(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn depth(&self) -> usize {
        self.values.len()
    }

    pub fn next_increment(&self) -> f64 {
        self.next_increment
    }

    pub fn current_step_number(&self) -> usize {
        self.current_step_number
    }

    /// Cumulative time once the pending increment is applied
    pub fn next_time(&self) -> f64 {
        self.values[0] + self.next_increment
    }

    /// Count a new step; its increment is set separately
    pub fn begin_step(&mut self) {
        self.current_step_number += 1;
    }

    /// Undo `begin_step` for a step that failed before committing anything,
    /// restoring the increment the previous step applied
    pub fn abandon_step(&mut self, previous_increment: f64) {
        self.current_step_number = self.current_step_number.saturating_sub(1);
        self.next_increment = previous_increment;
    }

    pub fn set_next_increment(&mut self, increment: f64) {
        self.next_increment = increment;
    }

    /// Shift every entry back by one and write `time` to row 0
    pub fn shift_and_insert(&mut self, time: f64) {
        self.values.rotate_right(1);
        self.values[0] = time;
    }
}
