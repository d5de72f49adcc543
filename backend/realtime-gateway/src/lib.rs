pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod relay;
pub mod services;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ChatMessage, Notification, NotificationKind};
pub use relay::{ClientEvent, RelayHandler, RoomId, RoomRelay, ServerEvent};
pub use services::NotificationDispatcher;
pub use state::AppState;
pub use websocket::{Connection, ConnectionRegistry, HeartbeatMonitor, PushMessage, UserId};
