pub mod cmd;
pub mod config;
pub use config::Config;
pub mod connection;
pub use connection::Connection;
pub use connection::ConnectionBase;
pub use connection::MockConnectionBase;
pub mod dispatcher;
pub mod handler;
pub mod peer;
pub mod protocol_handler;
pub use protocol_handler::deserialize_buffer;
pub use protocol_handler::serialize_data;
pub use protocol_handler::RESPType;
pub mod server;
pub use server::{Server, ServerHandle};
pub mod store;
pub use store::MockStoreBase;
pub use store::Store;
pub use store::StoreBase;

pub use config::{DEFAULT_HOST, DEFAULT_PORT};
