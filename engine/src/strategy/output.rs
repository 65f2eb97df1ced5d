//! Output conditions and output functions

use super::{OutputCondition, OutputFunction};
use crate::error::SimulationResult;
use crate::models::storage::StateTimeStorage;
use std::sync::Arc;

// ============================================================================
// Output Conditions
// ============================================================================

/// Never emits
#[derive(Debug, Clone, Copy, Default)]
pub struct NilOutputCondition;

impl OutputCondition for NilOutputCondition {
    fn is_output_step(&self, _: &str, _: &[f64], _: f64, _: usize) -> bool {
        false
    }
}

/// Emits every committed state, including the initial one
#[derive(Debug, Clone, Copy, Default)]
pub struct EveryStepOutputCondition;

impl OutputCondition for EveryStepOutputCondition {
    fn is_output_step(&self, _: &str, _: &[f64], _: f64, _: usize) -> bool {
        true
    }
}

/// Emits on steps whose number is a multiple of `n` (step 0 included)
#[derive(Debug, Clone, Copy)]
pub struct EveryNStepsOutputCondition {
    pub n: usize,
}

impl OutputCondition for EveryNStepsOutputCondition {
    fn is_output_step(&self, _: &str, _: &[f64], _: f64, step_number: usize) -> bool {
        self.n > 0 && step_number % self.n == 0
    }
}

// ============================================================================
// Output Functions
// ============================================================================

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NilOutputFunction;

impl OutputFunction for NilOutputFunction {
    fn output(&self, _: &str, _: &[f64], _: f64) -> SimulationResult<()> {
        Ok(())
    }
}

/// Appends every output to a shared [`StateTimeStorage`]
#[derive(Debug, Clone)]
pub struct StateTimeStorageOutputFunction {
    pub store: Arc<StateTimeStorage>,
}

impl StateTimeStorageOutputFunction {
    pub fn new(store: Arc<StateTimeStorage>) -> Self {
        Self { store }
    }
}

impl OutputFunction for StateTimeStorageOutputFunction {
    fn output(&self, partition_name: &str, state: &[f64], cumulative_time: f64) -> SimulationResult<()> {
        self.store.append(partition_name, cumulative_time, state.to_vec());
        Ok(())
    }
}

/// Emits every output as a structured `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOutputFunction;

impl OutputFunction for TracingOutputFunction {
    fn output(&self, partition_name: &str, state: &[f64], cumulative_time: f64) -> SimulationResult<()> {
        tracing::info!(
            target: "lockstep_engine::output",
            partition = partition_name,
            time = cumulative_time,
            ?state,
            "state output"
        );
        Ok(())
    }
}
