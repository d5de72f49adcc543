/// WebSocket connection layer shared by both transport planes
///
/// Architecture:
/// 1. Connection: per-socket handle with an outbox channel and liveness flag
/// 2. ConnectionRegistry: user_id -> live connections
/// 3. HeartbeatMonitor: two-sweep ping/pong eviction
/// 4. WsSession: actix actor bridging a socket to its `Connection`
use async_trait::async_trait;

pub mod connection;
pub mod heartbeat;
pub mod messages;
pub mod registry;
pub mod session;

pub use connection::{Connection, ConnectionId, FrameReceiver, OutboundFrame, UserId};
pub use heartbeat::{HeartbeatMonitor, SweepReport};
pub use messages::PushMessage;
pub use registry::ConnectionRegistry;
pub use session::WsSession;

/// Which transport endpoint a connection arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// `/ws`: server push only
    Notification,
    /// `/socket.io/`: room relay
    Relay,
}

impl Plane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plane::Notification => "notification",
            Plane::Relay => "relay",
        }
    }
}

/// Plane-specific state that must not outlive a connection
#[async_trait]
pub trait ConnectionCleanup: Send + Sync {
    /// Called after the connection is unregistered. Must be idempotent.
    async fn on_disconnect(&self, connection: &Connection);
}
