//! Core data types shared by every partition

pub mod history;
pub mod params;
pub mod storage;

// Re-exports
pub use history::StateHistory;
pub use params::Params;
pub use storage::StateTimeStorage;
