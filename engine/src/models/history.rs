//! Windowed state history
//!
//! A `StateHistory` is a dense `depth x width` matrix of a partition's past
//! states, most recent first: row 0 is the current state and row `d` is the
//! state `d` steps ago.
//!
//! # Critical Invariants
//!
//! 1. `width` and `depth` never change after construction.
//! 2. `shift_and_insert` is the only mutation: every row moves to index + 1,
//!    the oldest row is discarded and the new state lands in row 0.
//! 3. With `depth == 1` the shift is a no-op and the insert overwrites row 0.

use crate::error::{SimulationError, SimulationResult};
use serde::{Deserialize, Serialize};

/// Fixed-depth, most-recent-first record of a partition's state vector
///
/// # Example
/// ```
/// use lockstep_engine::StateHistory;
///
/// let mut history = StateHistory::new(2, 3, &[1.0, 2.0]).unwrap();
/// history.shift_and_insert(&[3.0, 4.0]).unwrap();
///
/// assert_eq!(history.row(0), &[3.0, 4.0]);
/// assert_eq!(history.row(1), &[1.0, 2.0]);
/// assert_eq!(history.row(2), &[0.0, 0.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StateHistoryData")]
pub struct StateHistory {
    /// Row-major values, row 0 first
    values: Vec<f64>,
    width: usize,
    depth: usize,
}

/// Unchecked serialized form of a [`StateHistory`]
#[derive(Deserialize)]
struct StateHistoryData {
    values: Vec<f64>,
    width: usize,
    depth: usize,
}

impl TryFrom<StateHistoryData> for StateHistory {
    type Error = SimulationError;

    fn try_from(data: StateHistoryData) -> SimulationResult<Self> {
        if data.depth == 0 || data.values.len() != data.width * data.depth {
            return Err(SimulationError::InvalidConfig(format!(
                "state history of {} values cannot have depth {} and width {}",
                data.values.len(),
                data.depth,
                data.width
            )));
        }
        Ok(Self {
            values: data.values,
            width: data.width,
            depth: data.depth,
        })
    }
}

impl StateHistory {
    /// Create a history whose row 0 holds `init_row` and all older rows are zero
    pub fn new(width: usize, depth: usize, init_row: &[f64]) -> SimulationResult<Self> {
        if depth == 0 {
            return Err(SimulationError::InvalidConfig(
                "state history depth must be > 0".to_string(),
            ));
        }
        if init_row.len() != width {
            return Err(SimulationError::InvalidConfig(format!(
                "initial state has width {} but history width is {}",
                init_row.len(),
                width
            )));
        }
        let mut values = vec![0.0; width * depth];
        values[..width].copy_from_slice(init_row);
        Ok(Self {
            values,
            width,
            depth,
        })
    }

    /// Build a history from rows ordered most recent first
    pub fn from_rows(rows: &[Vec<f64>]) -> SimulationResult<Self> {
        let width = rows.first().map(Vec::len).ok_or_else(|| {
            SimulationError::InvalidConfig("state history needs at least one row".to_string())
        })?;
        let mut values = Vec::with_capacity(width * rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(SimulationError::InvalidConfig(format!(
                    "row {} has width {} but expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            values,
            width,
            depth: rows.len(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Borrow row `index` (0 = current state)
    ///
    /// # Panics
    /// Panics if `index >= depth`
    pub fn row(&self, index: usize) -> &[f64] {
        assert!(
            index < self.depth,
            "history row {} out of range for depth {}",
            index,
            self.depth
        );
        let start = index * self.width;
        &self.values[start..start + self.width]
    }

    /// The current (most recent) state
    pub fn latest(&self) -> &[f64] {
        self.row(0)
    }

    /// Element `column` of row `index`
    pub fn at(&self, index: usize, column: usize) -> f64 {
        self.row(index)[column]
    }

    /// Defensive copy of row `index`
    pub fn copy_row(&self, index: usize) -> Vec<f64> {
        self.row(index).to_vec()
    }

    /// Shift every row back by one step and write `new_row` to row 0
    pub fn shift_and_insert(&mut self, new_row: &[f64]) -> SimulationResult<()> {
        if new_row.len() != self.width {
            return Err(SimulationError::InvalidConfig(format!(
                "cannot insert row of width {} into history of width {}",
                new_row.len(),
                self.width
            )));
        }
        let retained = self.width * (self.depth - 1);
        self.values.copy_within(0..retained, self.width);
        self.values[..self.width].copy_from_slice(new_row);
        Ok(())
    }
}
