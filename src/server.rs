use crate::config::ConfigError;
use crate::dispatcher::{self, DispatcherSender};
use crate::handler::ConnectionHandler;
use crate::peer::PeerId;
use crate::{Config, Connection, Store};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pause after a failed accept so a persistent failure, e.g. running out of
/// file descriptors, does not spin the accept loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("server task failed: {0}")]
    Task(#[from] JoinError),
}

/// A bound, not yet serving, server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: Config,
}

/// Server listener state. Created in `Server::start`. Its `run` method
/// accepts connections and spawns a `ConnectionHandler` for each.
#[derive(Debug)]
struct Listener {
    listener: TcpListener,

    /// Cloned into each `ConnectionHandler`
    dispatcher: DispatcherSender,

    next_peer_id: u64,

    shutdown: CancellationToken,
}

/// Handle to a running server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    peer_count: watch::Receiver<usize>,
    shutdown: CancellationToken,
    acceptor: JoinHandle<()>,
    dispatcher: JoinHandle<Store>,
}

impl Server {
    /// Validate the configuration and bind the listening socket
    pub async fn bind(config: Config) -> Result<Server, ServerError> {
        config.validate()?;

        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Server { listener, config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Launch the dispatcher, then the accept loop, each on its own task
    pub fn start(self) -> Result<ServerHandle, ServerError> {
        let local_addr = self.listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let (sender, dispatcher) =
            dispatcher::channel(Store::new(), self.config.queue_depth, shutdown.clone());
        let peer_count = dispatcher.subscribe_peer_count();
        let dispatcher = tokio::spawn(dispatcher.run());

        let listener = Listener {
            listener: self.listener,
            dispatcher: sender,
            next_peer_id: 0,
            shutdown: shutdown.clone(),
        };
        let acceptor = tokio::spawn(listener.run());

        info!(listen_addr = %local_addr, "server running");

        Ok(ServerHandle {
            local_addr,
            peer_count,
            shutdown,
            acceptor,
            dispatcher,
        })
    }

    /// Serve until `signal` completes, then shut down
    pub async fn run_until<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let handle = self.start()?;
        signal.await;
        handle.shutdown().await?;
        Ok(())
    }
}

impl Listener {
    /// Listen for inbound connections. For each inbound connection, spawn a
    /// tokio task to process that connection.
    ///
    /// A failed accept is logged and the loop carries on; only shutdown
    /// ends it.
    async fn run(mut self) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, addr)) => self.spawn_handler(socket, addr),
                Err(err) => {
                    error!(error = %err, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        info!("acceptor stopped");
    }

    fn spawn_handler(&mut self, socket: TcpStream, addr: SocketAddr) {
        let id = PeerId::from(self.next_peer_id);
        self.next_peer_id += 1;

        info!(peer = %id, remote_addr = %addr, "new connection");

        let handler = ConnectionHandler::new(
            Connection::new(socket),
            id,
            addr,
            self.dispatcher.clone(),
        );

        // Process the connection. Errors end this connection only.
        tokio::spawn(async move {
            if let Err(err) = handler.run().await {
                warn!(peer = %id, remote_addr = %addr, error = %err, "connection closed with error");
            }
        });
    }
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Peers currently in the dispatcher's registry
    pub fn peer_count(&self) -> usize {
        *self.peer_count.borrow()
    }

    pub fn watch_peer_count(&self) -> watch::Receiver<usize> {
        self.peer_count.clone()
    }

    /// Stop accepting and stop the dispatcher. Open connections are not
    /// cancelled; they end when their socket closes or their next request
    /// finds the dispatcher gone.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        self.acceptor.await?;
        self.dispatcher.await?;
        info!("server stopped");
        Ok(())
    }
}
