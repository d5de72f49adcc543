/// Typed relay events, decoded once at the transport boundary
///
/// Wire format: `{ "event": "<name>", "data": { ... } }`.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::RelayError;
use crate::models::ChatMessage;
use crate::websocket::UserId;

/// Opaque room name; existence is implied by membership
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(raw: impl Into<String>) -> Result<Self, RelayError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(RelayError::InvalidRoom(raw));
        }
        Ok(Self(raw))
    }

    /// Course chat thread
    pub fn chat(course_id: &str) -> Result<Self, RelayError> {
        Self::scoped("chat", course_id)
    }

    /// Forum post live updates
    pub fn post(post_id: &str) -> Result<Self, RelayError> {
        Self::scoped("post", post_id)
    }

    /// Live class signaling
    pub fn live_class(class_id: &str) -> Result<Self, RelayError> {
        Self::scoped("live", class_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Forum post rooms are silent subscriptions with no presence roster
    pub fn announces_presence(&self) -> bool {
        !self.0.starts_with("post:")
    }

    fn scoped(prefix: &str, id: &str) -> Result<Self, RelayError> {
        if id.trim().is_empty() {
            return Err(RelayError::InvalidRoom(format!("{prefix}:{id}")));
        }
        Ok(Self(format!("{prefix}:{}", id.trim())))
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client -> server events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: String },

    #[serde(rename_all = "camelCase")]
    JoinChat { course_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveChat { course_id: String },
    #[serde(rename_all = "camelCase")]
    SendMessage { course_id: String, text: String },

    #[serde(rename_all = "camelCase")]
    JoinPost { post_id: String },
    #[serde(rename_all = "camelCase")]
    LeavePost { post_id: String },

    #[serde(rename_all = "camelCase")]
    JoinLiveClass { class_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveLiveClass { class_id: String },
    #[serde(rename_all = "camelCase")]
    SendLiveMessage { class_id: String, text: String },

    // WebRTC signaling, addressed to one member of the live class room
    #[serde(rename_all = "camelCase")]
    Offer {
        class_id: String,
        target_user_id: UserId,
        sdp: Value,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        class_id: String,
        target_user_id: UserId,
        sdp: Value,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        class_id: String,
        target_user_id: UserId,
        candidate: Value,
    },
}

impl ClientEvent {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Event name used for logging and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "joinRoom",
            ClientEvent::LeaveRoom { .. } => "leaveRoom",
            ClientEvent::JoinChat { .. } => "joinChat",
            ClientEvent::LeaveChat { .. } => "leaveChat",
            ClientEvent::SendMessage { .. } => "sendMessage",
            ClientEvent::JoinPost { .. } => "joinPost",
            ClientEvent::LeavePost { .. } => "leavePost",
            ClientEvent::JoinLiveClass { .. } => "joinLiveClass",
            ClientEvent::LeaveLiveClass { .. } => "leaveLiveClass",
            ClientEvent::SendLiveMessage { .. } => "sendLiveMessage",
            ClientEvent::Offer { .. } => "offer",
            ClientEvent::Answer { .. } => "answer",
            ClientEvent::IceCandidate { .. } => "iceCandidate",
        }
    }

    /// Room this event is scoped to
    pub fn room(&self) -> Result<RoomId, RelayError> {
        match self {
            ClientEvent::JoinRoom { room_id } | ClientEvent::LeaveRoom { room_id } => {
                RoomId::new(room_id.clone())
            }
            ClientEvent::JoinChat { course_id }
            | ClientEvent::LeaveChat { course_id }
            | ClientEvent::SendMessage { course_id, .. } => RoomId::chat(course_id),
            ClientEvent::JoinPost { post_id } | ClientEvent::LeavePost { post_id } => {
                RoomId::post(post_id)
            }
            ClientEvent::JoinLiveClass { class_id }
            | ClientEvent::LeaveLiveClass { class_id }
            | ClientEvent::SendLiveMessage { class_id, .. }
            | ClientEvent::Offer { class_id, .. }
            | ClientEvent::Answer { class_id, .. }
            | ClientEvent::IceCandidate { class_id, .. } => RoomId::live_class(class_id),
        }
    }
}

/// Server -> client events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Roster snapshot after a join, sent to the whole room including the joiner
    #[serde(rename_all = "camelCase")]
    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        members: Vec<UserId>,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        room_id: RoomId,
        user_id: UserId,
        members: Vec<UserId>,
    },
    NewMessage(ChatMessage),
    #[serde(rename_all = "camelCase")]
    NewReply { post_id: String, reply: Value },
    #[serde(rename_all = "camelCase")]
    Offer {
        class_id: String,
        from_user_id: UserId,
        sdp: Value,
    },
    #[serde(rename_all = "camelCase")]
    Answer {
        class_id: String,
        from_user_id: UserId,
        sdp: Value,
    },
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        class_id: String,
        from_user_id: UserId,
        candidate: Value,
    },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserJoined { .. } => "userJoined",
            ServerEvent::UserLeft { .. } => "userLeft",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::NewReply { .. } => "newReply",
            ServerEvent::Offer { .. } => "offer",
            ServerEvent::Answer { .. } => "answer",
            ServerEvent::IceCandidate { .. } => "iceCandidate",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Frame for an application event the gateway does not interpret
pub fn custom_frame(event: &str, payload: &Value) -> Result<Arc<str>, serde_json::Error> {
    serde_json::to_string(&serde_json::json!({ "event": event, "data": payload })).map(Arc::from)
}
