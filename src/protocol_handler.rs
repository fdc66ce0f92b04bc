// Handles the REdis Serialization Protocol framing for the types the server speaks.
use std::fmt;
use thiserror::Error;

const MSG_SEPERATOR: &[u8; 2] = b"\r\n";
const MSG_SEPERATOR_SIZE: usize = MSG_SEPERATOR.len();

/// Largest bulk string or array length accepted from a peer (512 MiB, as Redis).
pub const MAX_FRAME_LENGTH: usize = 512 * 1024 * 1024;

/// Deepest array nesting accepted from a peer.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Most array elements, counted across every nesting level, in one frame.
/// A partial frame is re-parsed on every read, so this bounds that work.
pub const MAX_FRAME_ELEMENTS: usize = 1024;

/// Longest type-prefixed line (simple string, error, integer or length header).
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum RESPType {
    SimpleString(String),
    Error(String),
    Integer(i64),
    /// Binary-safe payload. `None` is the null bulk string (`$-1`).
    BulkString(Option<Vec<u8>>),
    Array(Vec<RESPType>),
}

/// Malformed input. Unlike an incomplete buffer, this can never become a
/// valid frame by reading more bytes.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("invalid frame type byte {0:#04x}")]
    UnknownPrefix(u8),

    #[error("invalid length prefix")]
    InvalidLength,

    #[error("length {0} exceeds the maximum frame length")]
    TooLarge(usize),

    #[error("invalid integer payload")]
    InvalidInteger,

    #[error("bulk string payload is not terminated by CRLF")]
    MissingTerminator,

    #[error("arrays nested deeper than {} levels", MAX_NESTING_DEPTH)]
    TooDeep,

    #[error("array of {0} elements exceeds the per-frame element limit")]
    TooManyElements(usize),

    #[error("line exceeds {} bytes without CRLF", MAX_LINE_LENGTH)]
    LineTooLong,
}

/// A decoded frame and the number of bytes it occupied, or `None` when the
/// buffer does not yet hold a complete frame.
pub type Decoded = Option<(RESPType, usize)>;

impl fmt::Display for RESPType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RESPType::SimpleString(response) => response.fmt(fmt),
            RESPType::Error(msg) => msg.fmt(fmt),
            RESPType::Integer(num) => num.fmt(fmt),
            RESPType::BulkString(Some(data)) => String::from_utf8_lossy(data).fmt(fmt),
            RESPType::BulkString(None) => "(nil)".fmt(fmt),
            RESPType::Array(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        // use space as the array element display separator
                        write!(fmt, " ")?;
                    }

                    part.fmt(fmt)?;
                }

                Ok(())
            }
        }
    }
}

/// Position of the CRLF ending the line that starts at `buffer[0]`.
///
/// Only the first `MAX_LINE_LENGTH` bytes after the type byte are searched.
fn find_crlf(buffer: &[u8]) -> Result<Option<usize>, FrameError> {
    let limit: usize = 1 + MAX_LINE_LENGTH + MSG_SEPERATOR_SIZE;
    let scanned: &[u8] = &buffer[..buffer.len().min(limit)];

    match scanned
        .windows(MSG_SEPERATOR_SIZE)
        .position(|window: &[u8]| window == MSG_SEPERATOR)
    {
        Some(crlf_pos) => Ok(Some(crlf_pos)),
        None if buffer.len() >= limit => Err(FrameError::LineTooLong),
        None => Ok(None),
    }
}

/// Limits tracked while decoding a single frame.
struct Budget {
    // Arrays entered so far on the current path
    depth: usize,

    // Array elements still allowed in this frame
    elements: usize,
}

impl Budget {
    fn new() -> Budget {
        Budget {
            depth: 0,
            elements: MAX_FRAME_ELEMENTS,
        }
    }
}

/// Simple strings and errors are line based, so a stray CR or LF would end
/// the frame early on the other side.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

trait BaseSerializer {
    const SYMBOL: u8;

    fn serialize(&self, frame: &RESPType, buffer: &mut Vec<u8>);

    fn deserialize(&self, buffer: &[u8], budget: &mut Budget) -> Result<Decoded, FrameError>;

    /// The line following the type byte, and the position of its CRLF
    fn extract_line<'a>(
        &self,
        buffer: &'a [u8],
    ) -> Result<Option<(&'a [u8], usize)>, FrameError> {
        Ok(find_crlf(buffer)?.map(|crlf_pos| (&buffer[1..crlf_pos], crlf_pos)))
    }

    /// To extract the length prefix for Bulk Strings and Arrays
    fn extract_length(&self, buffer: &[u8]) -> Result<Option<(i64, usize)>, FrameError> {
        let Some((line, crlf_pos)) = self.extract_line(buffer)? else {
            return Ok(None);
        };

        let length: i64 = std::str::from_utf8(line)
            .ok()
            .and_then(|length_str| length_str.parse::<i64>().ok())
            .ok_or(FrameError::InvalidLength)?;

        if length < -1 {
            return Err(FrameError::InvalidLength);
        }
        if length > MAX_FRAME_LENGTH as i64 {
            return Err(FrameError::TooLarge(length as usize));
        }

        Ok(Some((length, crlf_pos)))
    }
}

struct SimpleStringSerializer;

impl BaseSerializer for SimpleStringSerializer {
    const SYMBOL: u8 = b'+';

    fn serialize(&self, frame: &RESPType, buffer: &mut Vec<u8>) {
        if let RESPType::SimpleString(text) = frame {
            buffer.push(Self::SYMBOL);
            buffer.extend(single_line(text).as_bytes());
            buffer.extend(MSG_SEPERATOR);
        }
    }

    fn deserialize(&self, buffer: &[u8], _: &mut Budget) -> Result<Decoded, FrameError> {
        Ok(self.extract_line(buffer)?.map(|(line, crlf_pos)| {
            let payload: String = String::from_utf8_lossy(line).to_string();
            (RESPType::SimpleString(payload), crlf_pos + MSG_SEPERATOR_SIZE)
        }))
    }
}

struct ErrorSerializer;

impl BaseSerializer for ErrorSerializer {
    const SYMBOL: u8 = b'-';

    fn serialize(&self, frame: &RESPType, buffer: &mut Vec<u8>) {
        if let RESPType::Error(msg) = frame {
            buffer.push(Self::SYMBOL);
            buffer.extend(single_line(msg).as_bytes());
            buffer.extend(MSG_SEPERATOR);
        }
    }

    fn deserialize(&self, buffer: &[u8], _: &mut Budget) -> Result<Decoded, FrameError> {
        Ok(self.extract_line(buffer)?.map(|(line, crlf_pos)| {
            let payload: String = String::from_utf8_lossy(line).to_string();
            (RESPType::Error(payload), crlf_pos + MSG_SEPERATOR_SIZE)
        }))
    }
}

struct IntegerSerializer;

impl BaseSerializer for IntegerSerializer {
    const SYMBOL: u8 = b':';

    fn serialize(&self, frame: &RESPType, buffer: &mut Vec<u8>) {
        if let RESPType::Integer(num) = frame {
            buffer.push(Self::SYMBOL);
            buffer.extend(num.to_string().as_bytes());
            buffer.extend(MSG_SEPERATOR);
        }
    }

    fn deserialize(&self, buffer: &[u8], _: &mut Budget) -> Result<Decoded, FrameError> {
        let Some((line, crlf_pos)) = self.extract_line(buffer)? else {
            return Ok(None);
        };

        let integer: i64 = std::str::from_utf8(line)
            .ok()
            .and_then(|text| text.parse().ok())
            .ok_or(FrameError::InvalidInteger)?;

        Ok(Some((
            RESPType::Integer(integer),
            crlf_pos + MSG_SEPERATOR_SIZE,
        )))
    }
}

struct BulkStringSerializer;

impl BaseSerializer for BulkStringSerializer {
    const SYMBOL: u8 = b'$';

    fn serialize(&self, frame: &RESPType, buffer: &mut Vec<u8>) {
        match frame {
            RESPType::BulkString(Some(data)) => {
                buffer.push(Self::SYMBOL);
                buffer.extend(data.len().to_string().as_bytes());
                buffer.extend(MSG_SEPERATOR);
                buffer.extend(data);
                buffer.extend(MSG_SEPERATOR);
            }
            RESPType::BulkString(None) => {
                buffer.push(Self::SYMBOL);
                buffer.extend(b"-1");
                buffer.extend(MSG_SEPERATOR);
            }
            _ => {}
        }
    }

    fn deserialize(&self, buffer: &[u8], _: &mut Budget) -> Result<Decoded, FrameError> {
        // Found a prefix length, with the start_pos of the 1st CRLF
        let Some((prefix_length, crlf_pos)) = self.extract_length(buffer)? else {
            return Ok(None);
        };

        let start_index: usize = crlf_pos + MSG_SEPERATOR_SIZE;
        if prefix_length == -1 {
            return Ok(Some((RESPType::BulkString(None), start_index)));
        }

        let end_index: usize = start_index + prefix_length as usize;

        // The payload and its trailing CRLF may not have arrived yet
        if end_index + MSG_SEPERATOR_SIZE > buffer.len() {
            return Ok(None);
        }

        if buffer[end_index..end_index + MSG_SEPERATOR_SIZE] != *MSG_SEPERATOR {
            return Err(FrameError::MissingTerminator);
        }

        let payload: Vec<u8> = buffer[start_index..end_index].to_vec();
        Ok(Some((
            RESPType::BulkString(Some(payload)),
            end_index + MSG_SEPERATOR_SIZE,
        )))
    }
}

struct ArraySerializer;

impl BaseSerializer for ArraySerializer {
    const SYMBOL: u8 = b'*';

    fn serialize(&self, frame: &RESPType, buffer: &mut Vec<u8>) {
        if let RESPType::Array(vec) = frame {
            buffer.push(Self::SYMBOL);
            buffer.extend(vec.len().to_string().as_bytes());
            buffer.extend(MSG_SEPERATOR);

            // Serialize the children items, within the Array.
            for item in vec {
                serialize_into(item, buffer);
            }
        }
    }

    fn deserialize(&self, buffer: &[u8], budget: &mut Budget) -> Result<Decoded, FrameError> {
        let Some((array_length, crlf_pos)) = self.extract_length(buffer)? else {
            return Ok(None);
        };

        // Null arrays are a reply-only form
        if array_length < 0 {
            return Err(FrameError::InvalidLength);
        }
        if budget.depth == MAX_NESTING_DEPTH {
            return Err(FrameError::TooDeep);
        }

        let array_length: usize = array_length as usize;
        if array_length > budget.elements {
            return Err(FrameError::TooManyElements(array_length));
        }
        budget.elements -= array_length;
        budget.depth += 1;

        let mut next_index: usize = crlf_pos + MSG_SEPERATOR_SIZE;
        let mut vec: Vec<RESPType> = Vec::with_capacity(array_length);

        for _ in 0..array_length {
            match decode(&buffer[next_index..], budget)? {
                Some((child_payload, length)) => {
                    vec.push(child_payload);
                    next_index += length;
                }
                None => return Ok(None),
            }
        }

        budget.depth -= 1;
        Ok(Some((RESPType::Array(vec), next_index)))
    }
}

/// Attempt to decode one frame from the front of `input_buf`.
///
/// Returns `Ok(None)` when more bytes are needed and `Err` when the bytes can
/// never form a valid frame.
pub fn deserialize_buffer(input_buf: &[u8]) -> Result<Decoded, FrameError> {
    decode(input_buf, &mut Budget::new())
}

fn decode(input_buf: &[u8], budget: &mut Budget) -> Result<Decoded, FrameError> {
    let Some(&first_byte) = input_buf.first() else {
        return Ok(None);
    };

    match first_byte {
        b'+' => SimpleStringSerializer.deserialize(input_buf, budget),
        b'-' => ErrorSerializer.deserialize(input_buf, budget),
        b':' => IntegerSerializer.deserialize(input_buf, budget),
        b'$' => BulkStringSerializer.deserialize(input_buf, budget),
        b'*' => ArraySerializer.deserialize(input_buf, budget),
        other => Err(FrameError::UnknownPrefix(other)),
    }
}

fn serialize_into(input_data: &RESPType, buffer: &mut Vec<u8>) {
    match input_data {
        RESPType::SimpleString(_) => SimpleStringSerializer.serialize(input_data, buffer),
        RESPType::Error(_) => ErrorSerializer.serialize(input_data, buffer),
        RESPType::Integer(_) => IntegerSerializer.serialize(input_data, buffer),
        RESPType::BulkString(_) => BulkStringSerializer.serialize(input_data, buffer),
        RESPType::Array(_) => ArraySerializer.serialize(input_data, buffer),
    }
}

pub fn serialize_data(input_data: &RESPType) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::new();
    serialize_into(input_data, &mut buffer);
    buffer
}
