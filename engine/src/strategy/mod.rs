//! Strategy interfaces
//!
//! The engine consumes, but does not implement, a handful of small
//! interfaces. Every piece of plugin behaviour attaches at one of them:
//!
//! - [`Iteration`]: a partition's update rule
//! - [`OutputCondition`] / [`OutputFunction`]: when and where committed
//!   states are emitted
//! - [`TerminationCondition`]: when a run stops
//! - [`TimestepFunction`]: how far time advances each step
//!
//! # Iteration Interface
//!
//! ```rust
//! use lockstep_engine::strategy::Iteration;
//! use lockstep_engine::{
//!     CumulativeTimestepsHistory, Params, Settings, SimulationResult, StateHistory,
//! };
//!
//! /// Doubles every element of the previous state
//! struct DoublingIteration;
//!
//! impl Iteration for DoublingIteration {
//!     fn configure(&mut self, _partition_index: usize, _settings: &Settings) -> SimulationResult<()> {
//!         Ok(())
//!     }
//!
//!     fn iterate(
//!         &mut self,
//!         _params: &Params,
//!         partition_index: usize,
//!         state_histories: &[StateHistory],
//!         _timesteps_history: &CumulativeTimestepsHistory,
//!     ) -> SimulationResult<Vec<f64>> {
//!         Ok(state_histories[partition_index]
//!             .latest()
//!             .iter()
//!             .map(|v| v * 2.0)
//!             .collect())
//!     }
//! }
//! ```
//!
//! Update rules receive `&Params` and `&[StateHistory]`: they cannot mutate
//! the parameters they were handed or any history. Private, step-scoped state
//! (such as an RNG) lives in `self`.

use crate::config::settings::Settings;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::SimulationResult;
use crate::iterations::FromHistoryIteration;
use crate::models::history::StateHistory;
use crate::models::params::Params;

pub mod output;
pub mod termination;
pub mod timestep;

pub use output::{
    EveryNStepsOutputCondition, EveryStepOutputCondition, NilOutputCondition, NilOutputFunction,
    StateTimeStorageOutputFunction, TracingOutputFunction,
};
pub use termination::{NumberOfStepsTerminationCondition, TimeElapsedTerminationCondition};
pub use timestep::{
    ConstantTimestepFunction, ExponentialDistributionTimestepFunction,
    FromHistoryTimestepFunction,
};

/// Per-partition state update rule
pub trait Iteration: Send {
    /// One-time hook called with the partition's resolved index
    fn configure(&mut self, partition_index: usize, settings: &Settings) -> SimulationResult<()>;

    /// Compute the next state of the partition at `partition_index`
    ///
    /// `state_histories` is the snapshot taken at the start of the step; the
    /// returned vector must have the partition's state width.
    fn iterate(
        &mut self,
        params: &Params,
        partition_index: usize,
        state_histories: &[StateHistory],
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>>;

    /// Access to a history-replaying update rule, for memory-replay wiring
    fn from_history_mut(&mut self) -> Option<&mut FromHistoryIteration> {
        None
    }
}

/// Decides whether a committed state should be emitted
pub trait OutputCondition: Send + Sync {
    fn is_output_step(
        &self,
        partition_name: &str,
        state: &[f64],
        cumulative_time: f64,
        step_number: usize,
    ) -> bool;
}

/// Sink for committed states
pub trait OutputFunction: Send + Sync {
    fn output(&self, partition_name: &str, state: &[f64], cumulative_time: f64)
        -> SimulationResult<()>;
}

/// Decides when a run is complete
pub trait TerminationCondition: Send {
    fn terminate(
        &self,
        state_histories: &[StateHistory],
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> bool;
}

/// Computes the time increment of the next step
pub trait TimestepFunction: Send {
    fn next_increment(
        &mut self,
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> SimulationResult<f64>;
}
