use crate::config::settings::Settings;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::SimulationResult;
use crate::models::history::StateHistory;
use crate::models::params::Params;
use crate::strategy::Iteration;

/// Leaves the partition's initial state unchanged over time
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantValuesIteration;

impl Iteration for ConstantValuesIteration {
    fn configure(&mut self, _: usize, _: &Settings) -> SimulationResult<()> {
        Ok(())
    }

    fn iterate(
        &mut self,
        _: &Params,
        partition_index: usize,
        state_histories: &[StateHistory],
        _: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>> {
        Ok(state_histories[partition_index].copy_row(0))
    }
}
