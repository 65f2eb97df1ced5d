//! Termination conditions

use super::TerminationCondition;
use crate::core::time::CumulativeTimestepsHistory;
use crate::models::history::StateHistory;

/// Terminates once `max_number_of_steps` steps have run
#[derive(Debug, Clone, Copy)]
pub struct NumberOfStepsTerminationCondition {
    pub max_number_of_steps: usize,
}

impl TerminationCondition for NumberOfStepsTerminationCondition {
    fn terminate(&self, _: &[StateHistory], timesteps_history: &CumulativeTimestepsHistory) -> bool {
        timesteps_history.current_step_number() >= self.max_number_of_steps
    }
}

/// Terminates once cumulative time reaches `max_time_elapsed`
#[derive(Debug, Clone, Copy)]
pub struct TimeElapsedTerminationCondition {
    pub max_time_elapsed: f64,
}

impl TerminationCondition for TimeElapsedTerminationCondition {
    fn terminate(&self, _: &[StateHistory], timesteps_history: &CumulativeTimestepsHistory) -> bool {
        timesteps_history.current_time() >= self.max_time_elapsed
    }
}
