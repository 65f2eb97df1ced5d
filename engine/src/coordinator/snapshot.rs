//! Serializable view of a running simulation
//!
//! A snapshot captures the current state of every partition together with
//! the step counter and cumulative time. It is taken between steps and is
//! intended for inspection (dashboards, logs, debugging), not for resuming
//! a run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of a single partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub name: String,
    pub index: usize,
    pub state: Vec<f64>,
}

/// Current state of a whole coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub run_id: Uuid,
    pub step_number: usize,
    pub time: f64,
    pub partitions: Vec<PartitionSnapshot>,
}

impl CoordinatorSnapshot {
    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Look up a partition's state by name
    pub fn state(&self, name: &str) -> Option<&[f64]> {
        self.partitions
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.state.as_slice())
    }
}
