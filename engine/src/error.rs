//! Error taxonomy for the simulation engine
//!
//! Three families of failure are distinguished:
//!
//! - **Configuration errors** (duplicate or unknown partitions, missing params,
//!   bad indices). These surface from the config generator or from the first
//!   parameter access and are never silently defaulted.
//! - **Runtime invariant violations** reported by the iteration test harness
//!   (wrong widths, non-finite values, corrupted histories).
//! - **Runtime failures** raised while stepping (failed update rules, output
//!   sinks, exhausted replay windows, worker panics).
//!
//! Nothing in the engine retries: an error aborts the current step and is
//! returned to the caller.

use thiserror::Error;

/// Result alias used throughout the engine
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Simulation error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    // ------------------------------------------------------------------
    // Configuration errors
    // ------------------------------------------------------------------
    #[error("partition with name {0} already exists")]
    DuplicatePartition(String),

    #[error("partition: {referenced_by} references unknown partition: {name}")]
    UnknownPartition { referenced_by: String, name: String },

    #[error("partition index {index} is out of range for {num_partitions} partitions")]
    UnknownPartitionIndex { index: usize, num_partitions: usize },

    #[error(
        "partition: {partition}, param: {param} selects index {index} from upstream \
         {upstream} of width {width}"
    )]
    UpstreamIndexOutOfRange {
        partition: String,
        param: String,
        upstream: String,
        index: usize,
        width: usize,
    },

    #[error("partition: {partition} does not have params set for: {name}")]
    MissingParam { partition: String, name: String },

    #[error(
        "partition: {partition}, param: {name}, index out of range: {index}, valid range: {}",
        valid_range(.len)
    )]
    ParamIndexOutOfRange {
        partition: String,
        name: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("no simulation config has been set in the generator")]
    MissingSimulationConfig,

    #[error("internal state partition {0} is not a from-history iteration")]
    NotMemoryIteration(usize),

    #[error(
        "partition: {partition} reads an upstream state that cannot be computed before it \
         in the same step"
    )]
    UpstreamOrderCycle { partition: String },

    // ------------------------------------------------------------------
    // Runtime invariant violations (harness)
    // ------------------------------------------------------------------
    #[error("partition: {partition}, time: {time} output state is wrong width... {got} should be: {expected}")]
    WrongStateWidth {
        partition: String,
        time: f64,
        got: usize,
        expected: usize,
    },

    #[error("partition: {partition}, time: {time} output state has non-finite values: {values:?}")]
    NonFiniteState {
        partition: String,
        time: f64,
        values: Vec<f64>,
    },

    #[error("partition: {partition}, time: {time} state history has wrong shape: {detail}")]
    HistoryShape {
        partition: String,
        time: f64,
        detail: String,
    },

    #[error(
        "partition: {partition}, time: {time}, history depth: {depth} past state in history \
         isn't retained properly... {found:?} should be: {expected:?}"
    )]
    HistoryNotRetained {
        partition: String,
        time: f64,
        depth: usize,
        found: Vec<f64>,
        expected: Vec<f64>,
    },

    #[error("outputs pre- and post-reset don't match for partition: {partition}")]
    StatefulnessResidue { partition: String },

    // ------------------------------------------------------------------
    // Runtime failures
    // ------------------------------------------------------------------
    #[error("partition: {partition}, time: {time} iteration failed: {source}")]
    IterationFailed {
        partition: String,
        time: f64,
        #[source]
        source: Box<SimulationError>,
    },

    #[error("partition: {partition}, time: {time} output failed: {message}")]
    OutputFailed {
        partition: String,
        time: f64,
        message: String,
    },

    #[error("timesteps have gone beyond the available data: step {step}, window depth {depth}")]
    MemoryExhausted { step: usize, depth: usize },

    #[error("worker for partition group starting at {partition} panicked")]
    WorkerPanicked { partition: String },

    #[error("worker for partition group starting at {partition} disconnected before handoff")]
    WorkerDisconnected { partition: String },

    #[error("partition: {partition}, param: {param} upstream state was never sent")]
    UpstreamUnavailable { partition: String, param: String },

    #[error("partition: {partition} has no pending state to commit")]
    NoPendingState { partition: String },
}

fn valid_range(len: &usize) -> String {
    if *len == 0 {
        "empty".to_string()
    } else {
        format!("0-{}", len - 1)
    }
}

impl SimulationError {
    /// Strip any `IterationFailed` wrappers and return the underlying cause
    pub fn root_cause(&self) -> &SimulationError {
        match self {
            SimulationError::IterationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this error is a configuration error (raised before any step)
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.root_cause(),
            SimulationError::DuplicatePartition(_)
                | SimulationError::UnknownPartition { .. }
                | SimulationError::UnknownPartitionIndex { .. }
                | SimulationError::UpstreamIndexOutOfRange { .. }
                | SimulationError::MissingParam { .. }
                | SimulationError::ParamIndexOutOfRange { .. }
                | SimulationError::InvalidConfig(_)
                | SimulationError::MissingSimulationConfig
                | SimulationError::NotMemoryIteration(_)
                | SimulationError::UpstreamOrderCycle { .. }
        )
    }
}
