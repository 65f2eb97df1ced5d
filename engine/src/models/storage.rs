//! Output storage
//!
//! `StateTimeStorage` collects the time series produced by output functions.
//! Workers of the same step append concurrently, so the store synchronises
//! internally and can be shared through an `Arc`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct StorageInner {
    index_by_name: HashMap<String, usize>,
    names: Vec<String>,
    store: Vec<Vec<Vec<f64>>>,
    times: Vec<f64>,
}

/// Thread-safe, name-keyed store of output time series
///
/// # Example
/// ```
/// use lockstep_engine::StateTimeStorage;
///
/// let storage = StateTimeStorage::new();
/// storage.append("a", 0.0, vec![1.0]);
/// storage.append("b", 0.0, vec![2.0]);
/// storage.append("a", 1.0, vec![3.0]);
///
/// assert_eq!(storage.values("a").unwrap(), vec![vec![1.0], vec![3.0]]);
/// assert_eq!(storage.times(), vec![0.0, 1.0]);
/// ```
#[derive(Debug, Default)]
pub struct StateTimeStorage {
    inner: Mutex<StorageInner>,
}

impl StateTimeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StorageInner> {
        // rows are pushed whole, so a poisoned lock still guards consistent data
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `values` to the series keyed by `name`
    ///
    /// `time` is recorded once per new, strictly increasing time value.
    pub fn append(&self, name: &str, time: f64, values: Vec<f64>) {
        let mut inner = self.lock();
        let index = match inner.index_by_name.get(name) {
            Some(index) => *index,
            None => {
                let index = inner.store.len();
                inner.index_by_name.insert(name.to_string(), index);
                inner.names.push(name.to_string());
                inner.store.push(Vec::new());
                index
            }
        };
        inner.store[index].push(values);
        if inner.times.last().map_or(true, |last| time > *last) {
            inner.times.push(time);
        }
    }

    /// Series names in first-seen order
    pub fn names(&self) -> Vec<String> {
        self.lock().names.clone()
    }

    /// All stored rows for `name`, oldest first
    pub fn values(&self, name: &str) -> Option<Vec<Vec<f64>>> {
        let inner = self.lock();
        inner
            .index_by_name
            .get(name)
            .map(|index| inner.store[*index].clone())
    }

    /// Distinct output times, oldest first
    pub fn times(&self) -> Vec<f64> {
        self.lock().times.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_unknown_name_returns_none() {
        let storage = StateTimeStorage::new();
        assert!(storage.values("missing").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_concurrent_appends_keep_every_row() {
        let storage = Arc::new(StateTimeStorage::new());
        std::thread::scope(|scope| {
            for worker in 0..4 {
                let storage = Arc::clone(&storage);
                scope.spawn(move || {
                    let name = format!("p{}", worker);
                    for step in 0..50 {
                        storage.append(&name, step as f64, vec![step as f64]);
                    }
                });
            }
        });
        for worker in 0..4 {
            let rows = storage.values(&format!("p{}", worker)).unwrap();
            assert_eq!(rows.len(), 50);
        }
    }
}
