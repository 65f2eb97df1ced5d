//! Replay of a stored state history
//!
//! The replay starts one step into the window so that the oldest stored row
//! can serve as the initial state: on step `s` the rule returns row
//! `depth - s - 1`. One step past the newest row it returns the
//! `latest_data_values` param, and after that the data is exhausted.

use crate::config::settings::Settings;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::{SimulationError, SimulationResult};
use crate::models::history::StateHistory;
use crate::models::params::Params;
use crate::strategy::Iteration;

/// Param returned once the stored window has been fully replayed
pub const LATEST_DATA_VALUES: &str = "latest_data_values";

/// Provides a stream of states already known from a separate source
#[derive(Debug, Clone, Default)]
pub struct FromHistoryIteration {
    data: Option<StateHistory>,
}

impl FromHistoryIteration {
    pub fn new(data: StateHistory) -> Self {
        Self { data: Some(data) }
    }

    /// Replace the replayed data
    pub fn set_data(&mut self, data: StateHistory) {
        self.data = Some(data);
    }

    pub fn data(&self) -> Option<&StateHistory> {
        self.data.as_ref()
    }
}

impl Iteration for FromHistoryIteration {
    fn configure(&mut self, _: usize, _: &Settings) -> SimulationResult<()> {
        Ok(())
    }

    fn iterate(
        &mut self,
        params: &Params,
        _: usize,
        _: &[StateHistory],
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>> {
        let data = self.data.as_ref().ok_or_else(|| {
            SimulationError::InvalidConfig(format!(
                "partition: {} has no history data to replay",
                params.partition_name()
            ))
        })?;
        let depth = data.depth();
        let step = timesteps_history.current_step_number();
        match step.cmp(&depth) {
            std::cmp::Ordering::Less => Ok(data.copy_row(depth - step - 1)),
            std::cmp::Ordering::Equal => params.get_copy(LATEST_DATA_VALUES),
            std::cmp::Ordering::Greater => Err(SimulationError::MemoryExhausted { step, depth }),
        }
    }

    fn from_history_mut(&mut self) -> Option<&mut FromHistoryIteration> {
        Some(self)
    }
}
