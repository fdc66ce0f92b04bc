use crate::cmd::ParseError;
use crate::{RESPType, StoreBase};
use tracing::error;

/// The classic SET operation in Redis, without any of its options
#[derive(Debug, Clone, PartialEq)]
pub struct Set {
    // The key to store at
    key: Vec<u8>,

    // The value to be stored
    value: Vec<u8>,
}

impl Set {
    /// Create a new `Set` command
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Set {
        Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Parsing the necessary arguments for the `Set` command
    ///
    /// Syntax:
    /// SET key value
    pub fn parse(parts: Vec<Vec<u8>>) -> Result<Set, ParseError> {
        let Ok([_, key, value]) = <[Vec<u8>; 3]>::try_from(parts) else {
            return Err(ParseError::WrongArity("set"));
        };

        Ok(Set::new(key, value))
    }

    /// Execute the `Set` command
    ///
    /// Values are overridden if the key already exists. A store failure is
    /// logged and reported to the issuing peer only.
    pub fn execute(self, store: &mut dyn StoreBase) -> RESPType {
        let key_len = self.key.len();

        match store.set(self.key, self.value) {
            Ok(()) => RESPType::SimpleString("OK".to_string()),
            Err(err) => {
                error!(key_len, error = %err, "store rejected write");
                RESPType::Error(format!("ERR {}", err))
            }
        }
    }
}
