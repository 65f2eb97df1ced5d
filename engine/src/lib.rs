//! Lockstep Engine - Partitioned Simulation Core
//!
//! Discrete-step simulation of stochastic and deterministic processes built
//! from independent partitions of state, stepped in lockstep.
//!
//! # Architecture
//!
//! - **models**: Parameter stores, state histories and output storage
//! - **core**: Cumulative time history
//! - **strategy**: Pluggable interfaces (update rules, output, termination, timesteps)
//! - **iterations**: Stock update rules, including nested simulation runs
//! - **config**: Name-based builder and the resolved settings it produces
//! - **coordinator**: Two-phase lockstep execution and the iteration test harness
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Every update rule in a step reads the same snapshot of all histories
//! 2. Histories change only by shift-then-insert, once per committed step
//! 3. All randomness is deterministic (seeded RNG per partition)
//! 4. Configuration errors surface before the first step

// Module declarations
pub mod config;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod iterations;
pub mod models;
pub mod rng;
pub mod strategy;

// Re-exports for convenience
pub use config::{
    ConfigGenerator, Implementations, IterationSettings, NamedUpstreamConfig, PartitionConfig,
    Settings, SimulationConfig, UpstreamConfig,
};
pub use core::time::CumulativeTimestepsHistory;
pub use coordinator::{
    run_with_harnesses, CoordinatorSnapshot, IterationTestHarness, PartitionCoordinator,
    StepResult,
};
pub use error::{SimulationError, SimulationResult};
pub use models::{Params, StateHistory, StateTimeStorage};
pub use rng::RngManager;
