use crate::cmd::ParseError;
use crate::{RESPType, StoreBase};
use tracing::debug;

/// The classic GET operation in Redis
#[derive(Debug, Clone, PartialEq)]
pub struct Get {
    // The key to search for
    key: Vec<u8>,
}

impl Get {
    /// Create a new `Get` command
    pub fn new(key: impl Into<Vec<u8>>) -> Get {
        Get { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Parsing the necessary arguments for the `Get` command
    ///
    /// Syntax:
    /// GET key
    pub fn parse(mut parts: Vec<Vec<u8>>) -> Result<Get, ParseError> {
        if parts.len() != 2 {
            return Err(ParseError::WrongArity("get"));
        }

        let key: Vec<u8> = parts.swap_remove(1);
        Ok(Get::new(key))
    }

    /// Execute the `Get` command
    ///
    /// Replies with the stored value, or a null bulk string if the key
    /// was never written.
    pub fn execute(self, store: &dyn StoreBase) -> RESPType {
        match store.get(&self.key) {
            Some(value) => RESPType::BulkString(Some(value)),
            None => {
                debug!(key = %String::from_utf8_lossy(&self.key), "key not found");
                RESPType::BulkString(None)
            }
        }
    }
}
