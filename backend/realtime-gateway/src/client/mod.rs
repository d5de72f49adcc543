/// Consumer side of the gateway
///
/// A thin reconnecting client: bounded reconnect attempts, room joins replayed
/// after every reconnect, connection state observable by the UI layer.
use thiserror::Error;

pub mod policy;
pub mod rooms;
pub mod session;

pub use policy::ReconnectPolicy;
pub use rooms::JoinedRooms;
pub use session::{ClientSession, ConnectionState};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("client session is closed")]
    Closed,
}
