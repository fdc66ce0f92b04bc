mod set;
pub use set::Set;

mod get;
pub use get::Get;

use crate::{RESPType, StoreBase};
use thiserror::Error;

/// The closed set of commands the dispatcher applies to the store.
/// Methods called on `Command` are delegated to the command implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set(Set),
    Get(Get),
}

/// A frame that decoded cleanly but does not name a valid command.
///
/// These are per-request failures: the connection keeps reading.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    #[error("ERR unknown command '{0}'")]
    UnrecognizedCmd(String),

    #[error("ERR empty command")]
    EmptyCmd,

    #[error("ERR expected array, got {0}")]
    ExpectedArrayType(&'static str),

    #[error("ERR expected string argument, got {0}")]
    ExpectedStringType(&'static str),
}

fn type_name(frame: &RESPType) -> &'static str {
    match frame {
        RESPType::SimpleString(_) => "simple string",
        RESPType::Error(_) => "error",
        RESPType::Integer(_) => "integer",
        RESPType::BulkString(Some(_)) => "bulk string",
        RESPType::BulkString(None) => "null bulk string",
        RESPType::Array(_) => "array",
    }
}

impl Command {
    /// Parse a command from a deserialized RESPType, which
    /// must be an array RESPType, with String types
    pub fn infer_command(frame: RESPType) -> Result<Command, ParseError> {
        let array: Vec<RESPType> = match frame {
            RESPType::Array(array) => array,
            frame => return Err(ParseError::ExpectedArrayType(type_name(&frame))),
        };

        let parts: Vec<Vec<u8>> = array
            .into_iter()
            .map(Command::extract_bytes)
            .collect::<Result<_, _>>()?;

        let Some(cmd_name) = parts.first() else {
            return Err(ParseError::EmptyCmd);
        };

        let cmd: Command = if cmd_name.eq_ignore_ascii_case(b"set") {
            Command::Set(Set::parse(parts)?)
        } else if cmd_name.eq_ignore_ascii_case(b"get") {
            Command::Get(Get::parse(parts)?)
        } else {
            return Err(ParseError::UnrecognizedCmd(
                String::from_utf8_lossy(cmd_name).to_string(),
            ));
        };

        Ok(cmd)
    }

    pub fn extract_bytes(frame: RESPType) -> Result<Vec<u8>, ParseError> {
        match frame {
            RESPType::BulkString(Some(data)) => Ok(data),
            RESPType::SimpleString(text) => Ok(text.into_bytes()),
            frame => Err(ParseError::ExpectedStringType(type_name(&frame))),
        }
    }

    /// Apply the command to the store and build the reply for the issuing peer
    pub fn execute(self, store: &mut dyn StoreBase) -> RESPType {
        match self {
            Command::Set(cmd) => cmd.execute(store),
            Command::Get(cmd) => cmd.execute(store),
        }
    }
}
