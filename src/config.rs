use clap::Parser;
use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Envelopes the dispatcher buffers before connections start waiting on it
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

pub fn default_listen_addr() -> String {
    format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT)
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("queue depth must be greater than zero")]
    ZeroQueueDepth,
}

/// Server configuration, passed by value to `Server::bind`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// TCP address to listen on, `host:port`
    pub listen_addr: String,

    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listen_addr: default_listen_addr(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl Config {
    pub fn new(listen_addr: impl Into<String>) -> Config {
        Config {
            listen_addr: listen_addr.into(),
            ..Config::default()
        }
    }

    pub fn with_queue_depth(mut self, queue_depth: usize) -> Config {
        self.queue_depth = queue_depth;
        self
    }

    /// The address to bind. An empty address falls back to the default and
    /// a bare `:port` listens on every interface.
    pub fn listen_addr(&self) -> String {
        let addr = self.listen_addr.trim();
        if addr.is_empty() {
            default_listen_addr()
        } else if addr.starts_with(':') {
            format!("{}{}", DEFAULT_HOST, addr)
        } else {
            addr.to_string()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        Ok(())
    }
}

/// A minimal single-node key-value server speaking RESP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on. A bare `:port` listens on every interface.
    #[arg(short, long, default_value_t = default_listen_addr())]
    pub listen: String,

    /// Requests the dispatcher queues before connections have to wait.
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    pub queue_depth: usize,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Config {
        Config::new(cli.listen).with_queue_depth(cli.queue_depth)
    }
}
