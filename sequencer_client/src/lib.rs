pub mod reconnect;
pub mod sync_engine;
pub mod transport;

pub use sync_engine::{ConnectionState, SyncEngine};
pub use transport::{ConnectionStatus, RestClient, WsTransport};
