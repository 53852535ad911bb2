use crate::frontier::entry::DedupKey;
use std::collections::HashSet;
use std::sync::Mutex;

/// Set of every key admitted during a run
///
/// There is no removal: a key admitted once stays admitted for
/// the lifetime of the run, including across checkpoint and resume.
#[derive(Debug, Default)]
pub struct DedupStore {
    keys: Mutex<HashSet<DedupKey>>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from checkpointed keys
    pub fn from_keys<I: IntoIterator<Item = DedupKey>>(keys: I) -> Self {
        Self {
            keys: Mutex::new(keys.into_iter().collect()),
        }
    }

    /// Atomically admits a key; returns false if it was already present
    pub fn try_admit(&self, key: &DedupKey) -> bool {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if keys.contains(key) {
            return false;
        }
        keys.insert(key.clone())
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of every key, for checkpoints
    pub fn snapshot(&self) -> Vec<DedupKey> {
        let mut keys: Vec<DedupKey> = self
            .keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}
