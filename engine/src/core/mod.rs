//! Core time management

pub mod time;

pub use time::CumulativeTimestepsHistory;
