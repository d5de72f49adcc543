/// Room-based relay plane
///
/// Chat threads, forum post live updates and live-class signaling all run on the
/// same primitive: connections join named rooms and events fan out to the other
/// members. Rooms hold no data and carry no delivery guarantee beyond
/// "currently connected".
use thiserror::Error;

pub mod events;
pub mod handlers;
pub mod rooms;
pub mod store;

pub use events::{ClientEvent, RoomId, ServerEvent};
pub use handlers::RelayHandler;
pub use rooms::RoomRelay;
pub use store::{ChatStore, InMemoryChatStore};

use crate::websocket::UserId;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid room id: {0:?}")]
    InvalidRoom(String),

    #[error("invalid event name: {0:?}")]
    InvalidEvent(String),

    #[error("user {target} is not in room {room}")]
    TargetNotInRoom { room: RoomId, target: UserId },

    #[error("not a member of room {0}")]
    NotAMember(RoomId),

    #[error("message text is empty")]
    EmptyMessage,

    #[error("failed to persist message: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RelayError> for crate::error::AppError {
    fn from(e: RelayError) -> Self {
        use crate::error::AppError;
        match e {
            RelayError::Store(msg) => AppError::Store(msg),
            RelayError::Serialization(err) => AppError::Serialization(err.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}
