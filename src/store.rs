use mockall::automock;
use std::collections::HashMap;
use thiserror::Error;

/// Failure reported by a store backend. The in-memory `Store` never fails,
/// but the dispatcher treats every write as fallible.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Exact-key storage touched only from the dispatcher task, hence `&mut self`
/// for writes and no interior locking.
#[automock]
pub trait StoreBase: Send {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The in-memory key-value map. No eviction, no size bound, no persistence.
#[derive(Debug, Default)]
pub struct Store {
    data: HashMap<Vec<u8>, Vec<u8>>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }
}

impl StoreBase for Store {
    /// Get the value associated with a key
    ///
    /// Will return `None` if no value is found for the corresponding key.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    /// Set the `value` associated with the `key`
    ///
    /// Values are overridden, if the key already exists
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.data.insert(key, value);
        Ok(())
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
