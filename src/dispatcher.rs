use crate::cmd::{Command, ParseError};
use crate::peer::{Peer, PeerId};
use crate::{RESPType, StoreBase};
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a connection asks the dispatcher to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Command(Command),
    /// A frame that failed to map to a command. It travels the same channel
    /// as valid commands so the error reply keeps its place in the peer's
    /// reply order.
    Invalid(ParseError),
}

/// A request bundled with the identity of the peer that issued it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub peer: PeerId,
    pub request: Request,
}

impl Envelope {
    pub fn new(peer: PeerId, request: Request) -> Envelope {
        Envelope { peer, request }
    }

    pub fn command(peer: PeerId, cmd: Command) -> Envelope {
        Envelope::new(peer, Request::Command(cmd))
    }
}

#[derive(Debug, Error)]
#[error("dispatcher has stopped")]
pub struct DispatcherClosed;

/// What a connection queues after registering. Removals share the envelope
/// queue so they are applied strictly after the peer's earlier requests and
/// are never overtaken by later traffic.
#[derive(Debug)]
enum Queued {
    Envelope(Envelope),
    RemovePeer(PeerId),
}

/// Cloneable handle used by the acceptor and every connection handler to
/// reach the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherSender {
    add_peer_tx: mpsc::Sender<Peer>,
    queue_tx: mpsc::Sender<Queued>,
}

impl DispatcherSender {
    pub async fn add_peer(&self, peer: Peer) -> Result<(), DispatcherClosed> {
        self.add_peer_tx.send(peer).await.map_err(|_| DispatcherClosed)
    }

    pub async fn remove_peer(&self, id: PeerId) -> Result<(), DispatcherClosed> {
        self.queue_tx
            .send(Queued::RemovePeer(id))
            .await
            .map_err(|_| DispatcherClosed)
    }

    /// Waits while the dispatcher's queue is full. This throttles only the
    /// connection that is sending.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), DispatcherClosed> {
        self.queue_tx
            .send(Queued::Envelope(envelope))
            .await
            .map_err(|_| DispatcherClosed)
    }
}

enum Event {
    Shutdown,
    AddPeer(Peer),
    RemovePeer(PeerId),
    Dispatch(Envelope),
}

/// Sole owner of the peer registry and the store.
///
/// Events are applied one at a time from a single task, which is what makes
/// mutating both without locks safe. The dispatcher never touches a socket:
/// replies are queued on the issuing peer.
#[derive(Debug)]
pub struct Dispatcher<S> {
    store: S,
    peers: HashMap<PeerId, Peer>,
    add_peer_rx: mpsc::Receiver<Peer>,
    queue_rx: mpsc::Receiver<Queued>,
    peer_count: watch::Sender<usize>,
    shutdown: CancellationToken,
}

/// Create a dispatcher over `store` and the sender used to feed it.
///
/// `queue_depth` bounds the request queue and must be non-zero.
pub fn channel<S: StoreBase>(
    store: S,
    queue_depth: usize,
    shutdown: CancellationToken,
) -> (DispatcherSender, Dispatcher<S>) {
    let (add_peer_tx, add_peer_rx) = mpsc::channel(queue_depth);
    let (queue_tx, queue_rx) = mpsc::channel(queue_depth);
    let (peer_count, _) = watch::channel(0);

    let sender = DispatcherSender {
        add_peer_tx,
        queue_tx,
    };
    let dispatcher = Dispatcher {
        store,
        peers: HashMap::new(),
        add_peer_rx,
        queue_rx,
        peer_count,
        shutdown,
    };

    (sender, dispatcher)
}

impl<S: StoreBase> Dispatcher<S> {
    /// Observe the number of registered peers
    pub fn subscribe_peer_count(&self) -> watch::Receiver<usize> {
        self.peer_count.subscribe()
    }

    /// Run until shutdown is signalled or every sender is dropped, then hand
    /// back the store.
    pub async fn run(mut self) -> S {
        info!("dispatcher running");

        loop {
            match self.next_event().await {
                Event::Shutdown => break,
                Event::AddPeer(peer) => self.add_peer(peer),
                Event::RemovePeer(id) => self.remove_peer(id),
                Event::Dispatch(envelope) => self.apply(envelope),
            }
        }

        info!(peers = self.peers.len(), "dispatcher stopped");
        self.store
    }

    /// A handler finishes sending its add-peer before it queues anything,
    /// so polling adds first registers a peer before its requests. Requests
    /// and removals come off one queue in the order they were sent.
    async fn next_event(&mut self) -> Event {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Event::Shutdown,
            Some(peer) = self.add_peer_rx.recv() => Event::AddPeer(peer),
            Some(queued) = self.queue_rx.recv() => match queued {
                Queued::Envelope(envelope) => Event::Dispatch(envelope),
                Queued::RemovePeer(id) => Event::RemovePeer(id),
            },
            else => Event::Shutdown,
        }
    }

    fn add_peer(&mut self, peer: Peer) {
        info!(peer = %peer.id(), remote_addr = %peer.addr(), "peer added");
        self.peers.insert(peer.id(), peer);
        self.peer_count.send_replace(self.peers.len());
    }

    fn remove_peer(&mut self, id: PeerId) {
        match self.peers.remove(&id) {
            Some(peer) => {
                let connected_for = Utc::now() - peer.connected_at();
                info!(
                    peer = %id,
                    remote_addr = %peer.addr(),
                    connected_ms = connected_for.num_milliseconds(),
                    "peer removed"
                );
                self.peer_count.send_replace(self.peers.len());
            }
            None => debug!(peer = %id, "remove for unknown peer ignored"),
        }
    }

    fn apply(&mut self, envelope: Envelope) {
        let Envelope { peer, request } = envelope;

        let reply: RESPType = match request {
            Request::Command(cmd) => cmd.execute(&mut self.store),
            Request::Invalid(err) => RESPType::Error(err.to_string()),
        };

        match self.peers.get(&peer) {
            Some(target) => {
                if let Err(err) = target.send(reply) {
                    debug!(error = %err, "dropping reply");
                }
            }
            None => debug!(peer = %peer, "dropping reply for unregistered peer"),
        }
    }
}
