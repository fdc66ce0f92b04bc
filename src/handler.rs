use crate::cmd::Command;
use crate::connection::ConnectionError;
use crate::dispatcher::{DispatcherClosed, DispatcherSender, Envelope, Request};
use crate::peer::{Peer, PeerId};
use crate::{ConnectionBase, RESPType};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("read failed: {0}")]
    Read(#[from] ConnectionError),

    #[error("write failed: {0}")]
    Write(#[from] io::Error),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherClosed),
}

/// Whichever happened first on a connection.
enum Activity {
    Inbound(Option<RESPType>),
    Reply(RESPType),
}

/// Per-connection handler. Reads requests from `Connection`,
/// forwards them to the dispatcher, and writes back the replies
/// the dispatcher queues on this connection's `Peer`.
#[derive(Debug)]
pub struct ConnectionHandler<C> {
    connection: C,

    // Registry entry handed to the dispatcher; holds the reply sender
    peer: Peer,

    // Replies queued by the dispatcher, drained in order
    replies: mpsc::UnboundedReceiver<RESPType>,

    dispatcher: DispatcherSender,
}

impl<C: ConnectionBase> ConnectionHandler<C> {
    pub fn new(
        connection: C,
        id: PeerId,
        addr: SocketAddr,
        dispatcher: DispatcherSender,
    ) -> ConnectionHandler<C> {
        let (outbound, replies) = mpsc::unbounded_channel();

        ConnectionHandler {
            connection,
            peer: Peer::new(id, addr, outbound),
            replies,
            dispatcher,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer.id()
    }

    /// Process a single connection.
    ///
    /// Registers the peer before the first read and always deregisters it
    /// once reading stops, whether the stream ended cleanly or not.
    pub async fn run(mut self) -> Result<(), HandlerError> {
        self.dispatcher.add_peer(self.peer.clone()).await?;

        let result = self.serve().await;

        if self.dispatcher.remove_peer(self.peer.id()).await.is_err() {
            debug!(peer = %self.peer.id(), "dispatcher gone before peer removal");
        }

        match &result {
            Ok(()) => info!(peer = %self.peer.id(), "connection closed"),
            Err(err) => debug!(peer = %self.peer.id(), error = %err, "connection failed"),
        }

        result
    }

    async fn serve(&mut self) -> Result<(), HandlerError> {
        loop {
            // `read_frame` is cancellation safe, so losing the race to a
            // queued reply drops no input.
            let activity = tokio::select! {
                frame = self.connection.read_frame() => Activity::Inbound(frame?),
                Some(reply) = self.replies.recv() => Activity::Reply(reply),
            };

            match activity {
                Activity::Inbound(Some(frame)) => self.forward(frame).await?,
                Activity::Inbound(None) => return Ok(()),
                Activity::Reply(reply) => self.connection.write_frame(&reply).await?,
            }
        }
    }

    /// Convert the frame into a command and hand it to the dispatcher.
    /// A frame that is not a valid command is forwarded as `Invalid` so the
    /// client gets an error reply and the connection keeps reading.
    async fn forward(&mut self, frame: RESPType) -> Result<(), HandlerError> {
        let request = match Command::infer_command(frame) {
            Ok(cmd) => Request::Command(cmd),
            Err(err) => {
                debug!(peer = %self.peer.id(), error = %err, "rejecting request");
                Request::Invalid(err)
            }
        };

        self.dispatcher
            .dispatch(Envelope::new(self.peer.id(), request))
            .await?;

        Ok(())
    }
}
