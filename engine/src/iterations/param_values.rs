use crate::config::settings::Settings;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::SimulationResult;
use crate::models::history::StateHistory;
use crate::models::params::Params;
use crate::strategy::Iteration;

/// Param read by [`ParamValuesIteration`]
pub const PARAM_VALUES: &str = "param_values";

/// Writes the `param_values` param directly to the state
///
/// Paired with an upstream reference this copies another partition's state
/// (or a selection of its elements) as computed in the same step.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamValuesIteration;

impl Iteration for ParamValuesIteration {
    fn configure(&mut self, _: usize, _: &Settings) -> SimulationResult<()> {
        Ok(())
    }

    fn iterate(
        &mut self,
        params: &Params,
        _: usize,
        _: &[StateHistory],
        _: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>> {
        params.get_copy(PARAM_VALUES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;

    #[test]
    fn test_missing_param_values_is_reported() {
        let mut params = Params::default();
        params.set_partition_name("copy");
        let history = StateHistory::new(1, 1, &[0.0]).unwrap();
        let time = CumulativeTimestepsHistory::new(1, 0.0).unwrap();

        let err = ParamValuesIteration
            .iterate(&params, 0, &[history], &time)
            .unwrap_err();
        assert_eq!(
            err,
            SimulationError::MissingParam {
                partition: "copy".to_string(),
                name: PARAM_VALUES.to_string(),
            }
        );
    }
}
