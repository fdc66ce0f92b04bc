use crate::protocol_handler::FrameError;
use crate::{deserialize_buffer, serialize_data, RESPType};
use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("connection reset by peer")]
    ResetByPeer,
}

/// Cannot have `mockall` as a dev-dependency
/// and also import the Mocked attr in the tests/ dir
///
/// "those in a tests directory, behave like independent crates that use your main library.
/// As a consequence the library itself is not compiled in test mode for integration tests,
/// and your cfg_attr disables automock"
///
/// Refer to:
/// https://stackoverflow.com/q/76831451
/// https://github.com/rust-lang/cargo/issues/2911
///
#[automock]
#[async_trait]
pub trait ConnectionBase: Send + Sync {
    /// Next frame from the peer. `Ok(None)` is a clean end of stream.
    async fn read_frame(&mut self) -> Result<Option<RESPType>, ConnectionError>;

    async fn write_frame(&mut self, frame: &RESPType) -> io::Result<()>;
}

/// The purpose of `Connection` is to read and write frames on the
/// underlying stream, normally the `TcpStream` established between
/// the client and the server.
///
/// When reading frames, the `Connection` uses an internal buffer,
/// of type Vec<u8> which is filled up until we get a valid frame
/// the `Connection` calls the protocol handler to deserialize the
/// bytes, and if a valid frame is found, it is returned to the caller.
///
/// When writing frames, the data is first serialized into the RESP format
/// and then all of it is written into the stream
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    // The stream for reading and writing to the client
    stream: S,

    // The buffer for reading frames.
    buffer: Vec<u8>,
}

impl<S> Connection<S> {
    pub fn new(socket: S) -> Connection<S> {
        Connection {
            stream: socket,
            // 4KB to start with, grown as needed for large frames
            buffer: Vec::with_capacity(4 * 1024),
        }
    }
}

#[async_trait]
impl<S> ConnectionBase for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    /// Cancellation safe: a partially received frame stays in `buffer`,
    /// and `read_buf` does not lose data when its future is dropped.
    async fn read_frame(&mut self) -> Result<Option<RESPType>, ConnectionError> {
        loop {
            // Attempt to deserialize a frame from the data in the buffer.
            // If a partial frame is in the buffer, this returns `None` and
            // we keep reading more data.
            if let Some((frame, frame_size)) = deserialize_buffer(&self.buffer)? {
                self.buffer.drain(0..frame_size);
                return Ok(Some(frame));
            }

            // `0` indicates the end of the stream
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                // Remote peer closed the connection, check if buffer has any existing data
                // Since this would not be a clean shutdown
                if self.buffer.is_empty() {
                    return Ok(None);
                } else {
                    return Err(ConnectionError::ResetByPeer);
                }
            }
        }
    }

    /// Serializes the frame and attempt to
    /// write the whole buffer to the stream
    async fn write_frame(&mut self, frame: &RESPType) -> io::Result<()> {
        let data = serialize_data(frame);

        self.stream.write_all(&data).await?;

        // Make sure that any buffered contents are written.
        self.stream.flush().await
    }
}
