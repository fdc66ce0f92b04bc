use crate::RESPType;
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;

/// Identity of one accepted connection, assigned by the acceptor in accept order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl From<u64> for PeerId {
    fn from(id: u64) -> PeerId {
        PeerId(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "peer-{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("{0} is no longer accepting replies")]
pub struct PeerClosed(pub PeerId);

/// The dispatcher's registry entry for a live connection.
///
/// Holds the sending half of the connection's reply queue. The queue is
/// unbounded so that `send` never waits on a slow socket; the connection
/// handler drains it and is the only task that writes to the socket.
#[derive(Debug, Clone)]
pub struct Peer {
    id: PeerId,
    addr: SocketAddr,
    connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<RESPType>,
}

impl Peer {
    pub fn new(id: PeerId, addr: SocketAddr, outbound: mpsc::UnboundedSender<RESPType>) -> Peer {
        Peer {
            id,
            addr,
            connected_at: Utc::now(),
            outbound,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a reply for this peer's connection
    pub fn send(&self, frame: RESPType) -> Result<(), PeerClosed> {
        self.outbound.send(frame).map_err(|_| PeerClosed(self.id))
    }
}
