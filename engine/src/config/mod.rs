//! Simulation configuration
//!
//! - [`settings`]: the resolved, index-addressed configuration a coordinator runs
//! - [`generator`]: the name-based builder that produces it

pub mod generator;
pub mod settings;

pub use generator::{
    derive_seed, ConfigGenerator, NamedUpstreamConfig, PartitionConfig, SimulationConfig,
};
pub use settings::{Implementations, IterationSettings, Settings, UpstreamConfig};
