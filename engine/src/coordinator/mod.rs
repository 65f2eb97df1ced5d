//! Lockstep execution of partitions
//!
//! - [`engine`]: the [`PartitionCoordinator`] and its two-phase step
//! - [`iterator`]: per-partition drivers used by the coordinator's workers
//! - [`snapshot`]: serializable view of a running coordinator
//! - [`harness`]: runtime checks for update rules

pub mod engine;
pub mod harness;
pub mod iterator;
pub mod snapshot;

pub use engine::{PartitionCoordinator, StepResult};
pub use harness::{run_with_harnesses, IterationTestHarness};
pub use iterator::{
    CommitMessage, IteratorInputMessage, NamedPartitionIndex, StateIterator, StateValueChannels,
};
pub use snapshot::{CoordinatorSnapshot, PartitionSnapshot};
